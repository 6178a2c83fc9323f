//! The runtime: heap, interns, function registries and the dispatch engine.
//!
//! `Runtime` owns all mutable state and exposes the entry points the
//! embedding interpreter's opcodes hit: attribute access (`attr`), unary
//! and binary operators (`unary`, `binary`), comparisons (`compare`),
//! subscription (`subscript`), calls and construction (`call`), and class
//! creation (`class_build`). Representation-level protocols (`repr`,
//! hashing, truth testing) live here too.
//!
//! Every call into user-registered code is a suspension point: the runtime
//! is borrowed reentrantly by the body, so no lookup state is cached across
//! the callout except the per-class dunder caches, which are invalidated by
//! namespace mutation.

mod attr;
mod binary;
mod call;
mod class_build;
mod compare;
mod repr;
mod subscript;
mod unary;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub use binary::BinaryOp;
pub use compare::CompareOp;
pub use unary::UnaryOp;

use crate::{
    builtins::Builtins,
    exception_private::{ExcType, RunResult},
    function::{Function, FunctionBody, HostFn, HostFunction},
    heap::{Heap, HeapData, HeapId},
    intern::{FunctionId, HostFunctionId, Interns, StaticStrings, StringId},
    resource::{NoLimitTracker, ResourceTracker},
    signature::Signature,
    types::{Dict, DictCursor, List, Module, Str, Tuple, Type},
    value::Value,
};

/// A stateful dict iterator that detects size changes between steps.
///
/// Obtained from [`Runtime::dict_iter`]; stepping it after the dict grew
/// or shrank raises `RuntimeError("dictionary changed size during
/// iteration")`.
#[derive(Debug, Clone, Copy)]
pub struct DictIter {
    dict_id: HeapId,
    cursor: DictCursor,
}

/// Shared flag for delivering cancellation from other threads.
///
/// Setting the flag makes the runtime raise `KeyboardInterrupt` at the next
/// user-code callout boundary.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Requests cancellation.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The object-model runtime.
#[derive(Debug)]
pub struct Runtime<T: ResourceTracker = NoLimitTracker> {
    pub(crate) heap: Heap<T>,
    pub(crate) interns: Interns,
    pub(crate) functions: Vec<Function<T>>,
    pub(crate) host_functions: Vec<HostFunction<T>>,
    /// Current call depth, for the recursion limit.
    depth: usize,
    interrupt: Arc<AtomicBool>,
}

impl Default for Runtime<NoLimitTracker> {
    fn default() -> Self {
        Self::new(NoLimitTracker)
    }
}

impl<T: ResourceTracker> Runtime<T> {
    /// Creates a runtime with the given resource tracker.
    #[must_use]
    pub fn new(tracker: T) -> Self {
        Self {
            heap: Heap::new(tracker),
            interns: Interns::new(),
            functions: Vec::new(),
            host_functions: Vec::new(),
            depth: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The heap, for collector integration (`traverse`, `free`, stats).
    pub fn heap(&self) -> &Heap<T> {
        &self.heap
    }

    /// Mutable heap access for the collector.
    pub fn heap_mut(&mut self) -> &mut Heap<T> {
        &mut self.heap
    }

    /// Interns a string, returning its id.
    pub fn intern(&mut self, s: &str) -> StringId {
        self.interns.intern(s)
    }

    /// The string content of an interned id.
    #[must_use]
    pub fn str_of(&self, id: StringId) -> &str {
        self.interns.get_str(id)
    }

    /// A handle other threads can use to deliver cancellation.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Raises `KeyboardInterrupt` if cancellation was requested.
    ///
    /// The flag is consumed on delivery. Checked at every user-code
    /// callout boundary.
    pub(crate) fn check_interrupt(&mut self) -> RunResult<()> {
        if self.interrupt.swap(false, Ordering::SeqCst) {
            return Err(ExcType::keyboard_interrupt());
        }
        Ok(())
    }

    /// Enters a call: bumps depth, charges the tracker, checks cancellation.
    pub(crate) fn enter_call(&mut self) -> RunResult<()> {
        self.depth += 1;
        if let Err(err) = self.heap.tracker_mut().on_call(self.depth) {
            self.depth -= 1;
            return Err(err.into());
        }
        if let Err(err) = self.check_interrupt() {
            self.depth -= 1;
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // registration
    // ------------------------------------------------------------------

    /// Registers a function. The returned value is callable; calling it
    /// binds arguments per `signature` and invokes `body`.
    pub fn register_function(
        &mut self,
        name: &str,
        signature: Signature,
        defaults: Vec<Value>,
        body: FunctionBody<T>,
    ) -> Value {
        let name = self.interns.intern(name);
        let id = FunctionId(u32::try_from(self.functions.len()).expect("function registry overflow"));
        self.functions.push(Function {
            name,
            signature,
            defaults,
            globals: None,
            body,
        });
        Value::DefFunction(id)
    }

    /// Registers a function whose frame carries the given module's globals.
    pub fn register_function_in_module(
        &mut self,
        module: Value,
        name: &str,
        signature: Signature,
        defaults: Vec<Value>,
        body: FunctionBody<T>,
    ) -> RunResult<Value> {
        let Value::Ref(module_id) = module else {
            return Err(ExcType::type_error("expected a module"));
        };
        if !matches!(self.heap.get(module_id), HeapData::Module(_)) {
            return Err(ExcType::type_error("expected a module"));
        }
        let func = self.register_function(name, signature, defaults, body);
        let name_id = match func {
            Value::DefFunction(fid) => {
                let record = &mut self.functions[fid.index()];
                record.globals = Some(module_id);
                record.name
            }
            _ => unreachable!("register_function returns a DefFunction"),
        };
        self.heap.with_entry_mut(module_id, |_heap, data| {
            if let HeapData::Module(module) = data {
                module.dict_mut().insert_id(name_id, func, &self.interns);
            }
        });
        Ok(func)
    }

    /// Registers a raw host thunk (interop bridge, builtin-shaped helpers).
    pub fn register_host_function(&mut self, name: &str, body: HostFn<T>) -> Value {
        let name = self.interns.intern(name);
        let id = HostFunctionId(u32::try_from(self.host_functions.len()).expect("host registry overflow"));
        self.host_functions.push(HostFunction { name, body });
        Value::HostFunction(id)
    }

    // ------------------------------------------------------------------
    // constructors for host-provided data
    // ------------------------------------------------------------------

    /// Allocates a heap string.
    pub fn alloc_str(&mut self, s: &str) -> RunResult<Value> {
        let id = self.heap.allocate(HeapData::Str(Str::new(s)))?;
        Ok(Value::Ref(id))
    }

    /// Allocates a list.
    pub fn alloc_list(&mut self, values: Vec<Value>) -> RunResult<Value> {
        let id = self.heap.allocate(HeapData::List(List::new(values)))?;
        Ok(Value::Ref(id))
    }

    /// Allocates a tuple.
    pub fn alloc_tuple(&mut self, values: Vec<Value>) -> RunResult<Value> {
        let id = self.heap.allocate(HeapData::Tuple(Tuple::new(values)))?;
        Ok(Value::Ref(id))
    }

    /// Allocates an empty dict.
    pub fn dict_new(&mut self) -> RunResult<Value> {
        let id = self.heap.allocate(HeapData::Dict(Dict::new()))?;
        Ok(Value::Ref(id))
    }

    /// Sets a key in a heap dict.
    pub fn dict_set(&mut self, dict: Value, key: Value, value: Value) -> RunResult<()> {
        let Value::Ref(dict_id) = dict else {
            return Err(ExcType::type_error("expected a dict"));
        };
        self.heap.with_entry_mut(dict_id, |heap, data| match data {
            HeapData::Dict(d) => {
                d.set(key, value, heap, &self.interns)?;
                Ok(())
            }
            _ => Err(ExcType::type_error("expected a dict")),
        })
    }

    /// Sets a string key in a heap dict.
    pub fn dict_set_str(&mut self, dict: Value, key: &str, value: Value) -> RunResult<()> {
        let key_id = self.interns.intern(key);
        self.dict_set(dict, Value::InternString(key_id), value)
    }

    /// Looks up a key in a heap dict.
    pub fn dict_get(&mut self, dict: Value, key: Value) -> RunResult<Option<Value>> {
        let Value::Ref(dict_id) = dict else {
            return Err(ExcType::type_error("expected a dict"));
        };
        match self.heap.get(dict_id) {
            HeapData::Dict(d) => d.get(&key, &self.heap, &self.interns),
            _ => Err(ExcType::type_error("expected a dict")),
        }
    }

    /// Looks up a string key in a heap dict.
    pub fn dict_get_str(&mut self, dict: Value, key: &str) -> RunResult<Option<Value>> {
        let Value::Ref(dict_id) = dict else {
            return Err(ExcType::type_error("expected a dict"));
        };
        match self.heap.get(dict_id) {
            HeapData::Dict(d) => Ok(d.get_by_str(key, &self.heap, &self.interns)),
            _ => Err(ExcType::type_error("expected a dict")),
        }
    }

    /// Starts a guarded iteration over a heap dict.
    pub fn dict_iter(&self, dict: Value) -> RunResult<DictIter> {
        let Value::Ref(dict_id) = dict else {
            return Err(ExcType::type_error("expected a dict"));
        };
        match self.heap.get(dict_id) {
            HeapData::Dict(d) => Ok(DictIter {
                dict_id,
                cursor: DictCursor::new(d),
            }),
            _ => Err(ExcType::type_error("expected a dict")),
        }
    }

    /// Advances a guarded dict iterator.
    ///
    /// Raises `RuntimeError` if the dict changed size since the iterator
    /// was created.
    pub fn dict_iter_next(&self, iter: &mut DictIter) -> RunResult<Option<(Value, Value)>> {
        match self.heap.get(iter.dict_id) {
            HeapData::Dict(d) => iter.cursor.next(d),
            _ => Err(ExcType::type_error("expected a dict")),
        }
    }

    /// Creates a module with an empty namespace.
    pub fn module_new(&mut self, name: &str) -> RunResult<Value> {
        let name_id = self.interns.intern(name);
        let id = self.heap.allocate(HeapData::Module(Module::new(name_id)))?;
        Ok(Value::Ref(id))
    }

    // ------------------------------------------------------------------
    // type queries
    // ------------------------------------------------------------------

    /// `type(v)`: the class value of `v`.
    pub fn type_of(&mut self, v: Value) -> RunResult<Value> {
        if let Value::Ref(id) = v
            && let HeapData::ClassObject(cls) = self.heap.get(id)
        {
            return Ok(cls.metaclass());
        }
        let class_id = self.class_id_of(&v)?;
        // builtin wrappers read back as the builtin value they wrap
        if let Some(t) = self.heap.wrapper_builtin(class_id) {
            return Ok(Value::Builtin(Builtins::Type(t)));
        }
        Ok(Value::Ref(class_id))
    }

    /// The class (as a heap id) every lookup against `v` starts from.
    ///
    /// For class objects this is the metaclass; for everything else the
    /// value's own class, materializing builtin wrappers on demand.
    pub(crate) fn class_id_of(&mut self, v: &Value) -> RunResult<HeapId> {
        if let Value::Ref(id) = v {
            match self.heap.get(*id) {
                HeapData::Instance(inst) => return Ok(inst.class_id()),
                HeapData::ClassObject(cls) => {
                    let metaclass = cls.metaclass();
                    return match self.as_class_id(&metaclass)? {
                        Some(meta_id) => Ok(meta_id),
                        None => Ok(self.heap.builtin_class_id(Type::Type, &mut self.interns)?),
                    };
                }
                _ => {}
            }
        }
        let t = v.py_type(&self.heap);
        Ok(self.heap.builtin_class_id(t, &mut self.interns)?)
    }

    /// Resolves a value used *as* a class to its heap class id.
    ///
    /// Heap classes resolve directly; builtin type values resolve to their
    /// wrapper. Non-class values resolve to `None`.
    pub(crate) fn as_class_id(&mut self, v: &Value) -> RunResult<Option<HeapId>> {
        match v {
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::ClassObject(_) => Ok(Some(*id)),
                _ => Ok(None),
            },
            Value::Builtin(Builtins::Type(t)) => Ok(Some(self.heap.builtin_class_id(*t, &mut self.interns)?)),
            Value::Builtin(Builtins::ExcType(e)) => Ok(Some(
                self.heap.builtin_class_id(Type::Exception(*e), &mut self.interns)?,
            )),
            _ => Ok(None),
        }
    }

    /// The canonical class value for a heap class id.
    ///
    /// Builtin wrappers read back as the builtin value they wrap.
    pub(crate) fn class_value(&self, class_id: HeapId) -> Value {
        match self.heap.wrapper_builtin(class_id) {
            Some(Type::Exception(e)) => Value::Builtin(Builtins::ExcType(e)),
            Some(t) => Value::Builtin(Builtins::Type(t)),
            None => Value::Ref(class_id),
        }
    }

    /// The `(uid, version)` cache key for a class value.
    ///
    /// Monomorphic call sites in the embedding interpreter key inline
    /// caches on this pair: the uid pins the class across heap slot reuse,
    /// and any namespace mutation of the class or one of its bases bumps
    /// the version. `None` for non-class values.
    pub fn class_cache_key(&mut self, cls: Value) -> RunResult<Option<(u64, u64)>> {
        let Some(class_id) = self.as_class_id(&cls)? else {
            return Ok(None);
        };
        Ok(match self.heap.get(class_id) {
            HeapData::ClassObject(c) => Some((c.class_uid(), c.version())),
            _ => None,
        })
    }

    /// Whether `sub_id` is a proper subclass of `sup_id`.
    pub(crate) fn is_proper_subclass(&self, sub_id: HeapId, sup_id: HeapId) -> bool {
        if sub_id == sup_id {
            return false;
        }
        match self.heap.get(sub_id) {
            HeapData::ClassObject(cls) => cls.is_subclass_of(sub_id, sup_id),
            _ => false,
        }
    }

    /// `isinstance(v, cls)`, accepting a class or tuple of classes.
    pub fn isinstance(&mut self, v: Value, cls: Value) -> RunResult<bool> {
        if let Value::Ref(id) = cls
            && let HeapData::Tuple(tuple) = self.heap.get(id)
        {
            let options = tuple.as_vec().to_vec();
            for option in options {
                if self.isinstance(v, option)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        let Some(cls_id) = self.as_class_id(&cls)? else {
            return Err(ExcType::type_error(
                "isinstance() arg 2 must be a class, type, or tuple of classes and types",
            ));
        };
        let value_cls = self.class_id_of(&v)?;
        if value_cls == cls_id {
            return Ok(true);
        }
        match self.heap.get(value_cls) {
            HeapData::ClassObject(c) => Ok(c.is_subclass_of(value_cls, cls_id)),
            _ => Ok(false),
        }
    }

    /// `issubclass(sub, sup)`, accepting a tuple for `sup`.
    pub fn issubclass(&mut self, sub: Value, sup: Value) -> RunResult<bool> {
        let Some(sub_id) = self.as_class_id(&sub)? else {
            return Err(ExcType::type_error("issubclass() arg 1 must be a class"));
        };
        if let Value::Ref(id) = sup
            && let HeapData::Tuple(tuple) = self.heap.get(id)
        {
            let options = tuple.as_vec().to_vec();
            for option in options {
                if self.issubclass(sub, option)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        let Some(sup_id) = self.as_class_id(&sup)? else {
            return Err(ExcType::type_error(
                "issubclass() arg 2 must be a class, type, or tuple of classes and types",
            ));
        };
        match self.heap.get(sub_id) {
            HeapData::ClassObject(c) => Ok(c.is_subclass_of(sub_id, sup_id)),
            _ => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // dunder slot cache
    // ------------------------------------------------------------------

    /// Resolves which MRO entry defines `name` for `class_id`, consulting
    /// and filling the class's dunder slot cache.
    pub(crate) fn dunder_origin(&mut self, class_id: HeapId, name: StaticStrings) -> RunResult<Option<HeapId>> {
        let name_id: StringId = name.into();
        if let HeapData::ClassObject(cls) = self.heap.get(class_id)
            && let Some(cached) = cls.dunder_cache_get(name_id)
        {
            return Ok(cached);
        }
        let origin = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls
                .mro_lookup(name.as_str(), &self.heap, &self.interns)
                .map(|(_, owner)| owner),
            _ => return Ok(None),
        };
        if let HeapData::ClassObject(cls) = self.heap.get_mut(class_id) {
            cls.dunder_cache_insert(name_id, origin);
        }
        Ok(origin)
    }

    /// Reads the value of a dunder resolved through the slot cache.
    pub(crate) fn dunder_value(&mut self, class_id: HeapId, name: StaticStrings) -> RunResult<Option<(Value, HeapId)>> {
        let Some(origin) = self.dunder_origin(class_id, name)? else {
            return Ok(None);
        };
        let value = match self.heap.get(origin) {
            HeapData::ClassObject(owner) => owner.namespace().get_by_str(name.as_str(), &self.heap, &self.interns),
            _ => None,
        };
        Ok(value.map(|v| (v, origin)))
    }

    /// Like `dunder_value`, but only when the dunder is defined by a heap
    /// class, not by a builtin wrapper's seeded namespace.
    ///
    /// Used for override detection: `__getattribute__` and friends are only
    /// honored when user code actually defined them.
    pub(crate) fn heap_dunder_value(&mut self, class_id: HeapId, name: StaticStrings) -> RunResult<Option<Value>> {
        let Some((value, origin)) = self.dunder_value(class_id, name)? else {
            return Ok(None);
        };
        if self.heap.wrapper_builtin(origin).is_some() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Evicts a name from the dunder cache of `class_id` and every live
    /// subclass, bumping their versions.
    pub(crate) fn invalidate_class_attr(&mut self, class_id: HeapId, name_id: StringId) {
        let mut stack = vec![class_id];
        while let Some(id) = stack.pop() {
            let subclasses = match self.heap.get_mut(id) {
                HeapData::ClassObject(cls) => {
                    cls.dunder_cache_evict(name_id);
                    cls.bump_version();
                    cls.subclasses().to_vec()
                }
                _ => continue,
            };
            for entry in subclasses {
                if self.heap.is_live(entry.class_id())
                    && let HeapData::ClassObject(sub) = self.heap.get(entry.class_id())
                    && sub.class_uid() == entry.class_uid()
                {
                    stack.push(entry.class_id());
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // value-level protocols
    // ------------------------------------------------------------------

    /// `hash(v)`.
    ///
    /// Builtin payloads hash structurally. Instances dispatch `__hash__`;
    /// a nulled `__hash__` slot (a class defining `__eq__` without
    /// `__hash__`) raises `TypeError`.
    pub fn py_hash(&mut self, v: Value) -> RunResult<i64> {
        if let Value::Ref(id) = v
            && matches!(self.heap.get(id), HeapData::Instance(_))
        {
            let class_id = self.class_id_of(&v)?;
            if let Some((hash_fn, _)) = self.dunder_value(class_id, StaticStrings::DunderHash)? {
                if hash_fn.is_none() {
                    let name = v.type_name(&self.heap, &self.interns).into_owned();
                    return Err(ExcType::unhashable(name));
                }
                let result = self.call_dunder_bound(v, hash_fn, crate::args::ArgValues::Empty)?;
                return match result {
                    Value::Int(i) => Ok(crate::py_hash::hash_int(i)),
                    Value::Bool(b) => Ok(crate::py_hash::hash_int(i64::from(b))),
                    _ => Err(ExcType::type_error("__hash__ method should return an integer")),
                };
            }
            // default: identity hash
            return Ok(crate::py_hash::hash_int(id.index() as i64));
        }
        Dict::key_hash(&v, &self.heap, &self.interns).map(|h| h as i64)
    }

    /// `len(v)`.
    pub fn py_len(&mut self, v: Value) -> RunResult<usize> {
        if let Some(len) = v.len_builtin(&self.heap, &self.interns) {
            return Ok(len);
        }
        match self.call_type_dunder(v, StaticStrings::DunderLen, crate::args::ArgValues::Empty)? {
            Some(Value::Int(len)) if len >= 0 => Ok(len as usize),
            Some(Value::Int(_)) => Err(ExcType::value_error("__len__() should return >= 0")),
            Some(_) => Err(ExcType::type_error("an integer is required")),
            None => {
                let name = v.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::type_error(format!("object of type '{name}' has no len()")))
            }
        }
    }

    /// Runs the finalizer of an object about to be reclaimed.
    ///
    /// Called by the embedding collector before `Heap::free`. The collector
    /// owns resurrection: if the finalizer made the object reachable again,
    /// reclamation is deferred by simply not freeing it.
    pub fn finalize(&mut self, id: HeapId) -> RunResult<()> {
        let obj = Value::Ref(id);
        if !matches!(self.heap.get(id), HeapData::Instance(_)) {
            return Ok(());
        }
        let class_id = self.class_id_of(&obj)?;
        if let Some(del) = self.heap_dunder_value(class_id, StaticStrings::DunderDel)? {
            self.call_dunder_bound(obj, del, crate::args::ArgValues::Empty)?;
        }
        Ok(())
    }
}
