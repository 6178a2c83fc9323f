//! Call dispatch and the construction protocol.
//!
//! `call` routes over the callee: registered functions bind arguments into
//! a frame and run their host body, bound methods prepend their receiver,
//! classes run the `__call__`/`__new__`/`__init__` construction protocol,
//! instances dispatch `__call__` on their type, and builtins dispatch by
//! enum. Every function entry is a suspension point guarded by the
//! recursion limit and the interrupt flag.

use crate::{
    args::ArgValues,
    builtins::{BuiltinFunction, Builtins},
    exception_private::{ExcType, RunResult, SimpleException},
    frame::Frame,
    heap::{HeapData, HeapId},
    intern::{FunctionId, StaticStrings},
    resource::ResourceTracker,
    runtime::Runtime,
    types::{ClassMethod, Dict, Instance, Property, Slice, StaticMethod, Type},
    value::Value,
};

impl<T: ResourceTracker> Runtime<T> {
    /// Calls a value with the given arguments.
    pub fn call(&mut self, callee: Value, args: ArgValues) -> RunResult<Value> {
        match callee {
            Value::DefFunction(fid) => self.call_def(fid, args),
            Value::HostFunction(hid) => {
                let body = self.host_functions[hid.index()].body;
                self.enter_call()?;
                let result = body(self, args);
                self.leave_call();
                result
            }
            Value::Builtin(Builtins::Function(f)) => self.call_builtin_function(f, args),
            Value::Builtin(Builtins::Type(t)) => self.call_builtin_type(t, args),
            Value::Builtin(Builtins::ExcType(e)) => self.call_exc_type(e, args),
            Value::Ref(id) => {
                enum Kind {
                    Bound(Value, Value),
                    Class,
                    InstanceCall(HeapId),
                    NotCallable,
                }
                let kind = match self.heap.get(id) {
                    HeapData::BoundMethod(bm) => Kind::Bound(bm.func(), bm.instance()),
                    HeapData::ClassObject(_) => Kind::Class,
                    HeapData::Instance(inst) => Kind::InstanceCall(inst.class_id()),
                    _ => Kind::NotCallable,
                };
                match kind {
                    Kind::Bound(func, instance) => self.call(func, args.prepend(instance)),
                    Kind::Class => self.call_class(id, args),
                    Kind::InstanceCall(class_id) => {
                        if let Some((call_fn, _)) = self.dunder_value(class_id, StaticStrings::DunderCall)? {
                            self.call_dunder_bound(callee, call_fn, args)
                        } else {
                            let type_name = callee.type_name(&self.heap, &self.interns).into_owned();
                            Err(ExcType::not_callable(type_name))
                        }
                    }
                    Kind::NotCallable => {
                        let type_name = callee.type_name(&self.heap, &self.interns).into_owned();
                        Err(ExcType::not_callable(type_name))
                    }
                }
            }
            _ => {
                let type_name = callee.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::not_callable(type_name))
            }
        }
    }

    /// Whether calling the value could succeed at all.
    pub fn is_callable(&mut self, v: Value) -> RunResult<bool> {
        match v {
            Value::DefFunction(_) | Value::HostFunction(_) | Value::Builtin(_) => Ok(true),
            Value::Ref(id) => {
                let class_id = match self.heap.get(id) {
                    HeapData::BoundMethod(_) | HeapData::ClassObject(_) => return Ok(true),
                    HeapData::Instance(inst) => inst.class_id(),
                    _ => return Ok(false),
                };
                Ok(self.dunder_origin(class_id, StaticStrings::DunderCall)?.is_some())
            }
            _ => Ok(false),
        }
    }

    /// Calls a registered function: binds arguments, builds the frame,
    /// invokes the body, and stamps a traceback frame on the way out.
    fn call_def(&mut self, fid: FunctionId, args: ArgValues) -> RunResult<Value> {
        let record = &self.functions[fid.index()];
        let (name_id, signature, defaults, globals, body) = (
            record.name,
            record.signature.clone(),
            record.defaults.clone(),
            record.globals,
            record.body,
        );
        let func_name = self.interns.get_str(name_id).to_owned();

        let mut namespace = Vec::new();
        signature.bind(args, &defaults, &mut self.heap, &self.interns, &func_name, &mut namespace)?;
        let mut frame = Frame::new(fid, namespace, globals);

        self.enter_call()?;
        let result = body(self, &mut frame);
        self.leave_call();
        result.map_err(|mut err| {
            err.push_frame(Some(func_name), frame.lineno());
            err
        })
    }

    /// Calls a dunder found on a type, binding the receiver.
    ///
    /// Functions are called with the receiver prepended (no bound-method
    /// allocation); wrapper descriptors unwrap; callable user descriptors
    /// go through the full descriptor binding.
    pub(crate) fn call_dunder_bound(&mut self, receiver: Value, func: Value, args: ArgValues) -> RunResult<Value> {
        match func {
            Value::DefFunction(_) | Value::HostFunction(_) | Value::Builtin(Builtins::Function(_)) => {
                self.call(func, args.prepend(receiver))
            }
            Value::Ref(id) => {
                enum Kind {
                    Static(Value),
                    Class(Value),
                    Other,
                }
                let kind = match self.heap.get(id) {
                    HeapData::StaticMethod(sm) => Kind::Static(sm.func()),
                    HeapData::ClassMethod(cm) => Kind::Class(cm.func()),
                    _ => Kind::Other,
                };
                match kind {
                    Kind::Static(f) => self.call(f, args),
                    Kind::Class(f) => {
                        let cls = self.type_of(receiver)?;
                        self.call(f, args.prepend(cls))
                    }
                    Kind::Other => {
                        let objtype_id = self.class_id_of(&receiver)?;
                        let objtype = self.class_value(objtype_id);
                        let bound = self.descr_get(func, Some(receiver), objtype)?;
                        self.call(bound, args)
                    }
                }
            }
            _ => self.call(func, args.prepend(receiver)),
        }
    }

    /// Looks up a dunder on `type(obj)` (never the instance dict) and calls
    /// it bound to `obj`. `None` when the type does not define the dunder.
    pub(crate) fn call_type_dunder(
        &mut self,
        obj: Value,
        name: StaticStrings,
        args: ArgValues,
    ) -> RunResult<Option<Value>> {
        let class_id = self.class_id_of(&obj)?;
        let Some((func, _origin)) = self.dunder_value(class_id, name)? else {
            return Ok(None);
        };
        self.call_dunder_bound(obj, func, args).map(Some)
    }

    // ------------------------------------------------------------------
    // class calls: construction protocol
    // ------------------------------------------------------------------

    /// Whether the class is a metaclass (inherits from `type`).
    pub(crate) fn is_metaclass(&mut self, class_id: HeapId) -> RunResult<bool> {
        let type_wrapper = self.heap.builtin_class_id(Type::Type, &mut self.interns)?;
        Ok(match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.is_subclass_of(class_id, type_wrapper),
            _ => false,
        })
    }

    pub(crate) fn call_class(&mut self, class_id: HeapId, args: ArgValues) -> RunResult<Value> {
        // builtin wrappers delegate to their enum constructors
        if let Some(t) = self.heap.wrapper_builtin(class_id) {
            return match t {
                Type::Exception(e) => self.call_exc_type(e, args),
                _ => self.call_builtin_type(t, args),
            };
        }

        let cls_val = Value::Ref(class_id);

        // a user metaclass __call__ intercepts instantiation outright
        let meta_id = self.class_id_of(&cls_val)?;
        if let Some(call_fn) = self.heap_dunder_value(meta_id, StaticStrings::DunderCall)? {
            return self.call_dunder_bound(cls_val, call_fn, args);
        }

        // calling a metaclass with (name, bases, namespace) creates a class
        if args.count() == 3 && self.is_metaclass(class_id)? {
            return self.create_class_via(class_id, args);
        }

        self.type_call(class_id, args)
    }

    /// Default `type.__call__`: `__new__`, then `__init__` when the result
    /// is an instance of the requested class.
    fn type_call(&mut self, class_id: HeapId, args: ArgValues) -> RunResult<Value> {
        let cls_val = Value::Ref(class_id);

        let new_fn = match self.dunder_value(class_id, StaticStrings::DunderNew)? {
            Some((f, _)) => self.unwrap_staticmethod(f),
            None => Value::Builtin(Builtins::Function(BuiltinFunction::ObjectNew)),
        };

        let obj = if matches!(new_fn, Value::Builtin(Builtins::Function(BuiltinFunction::ObjectNew))) {
            self.instantiate_bare(class_id)?
        } else {
            // __new__ is an implicit staticmethod: the class is passed explicitly
            self.call(new_fn, args.clone().prepend(cls_val))?
        };

        // a foreign instance from __new__ skips __init__ entirely
        if self.isinstance(obj, cls_val)? {
            if let Some((init_fn, _)) = self.dunder_value(class_id, StaticStrings::DunderInit)? {
                if !matches!(init_fn, Value::Builtin(Builtins::Function(BuiltinFunction::ObjectInit))) {
                    let init_fn = self.unwrap_staticmethod(init_fn);
                    let result = self.call_dunder_bound(obj, init_fn, args)?;
                    if !result.is_none() {
                        let type_name = result.type_name(&self.heap, &self.interns).into_owned();
                        return Err(ExcType::type_error(format!(
                            "__init__() should return None, not '{type_name}'"
                        )));
                    }
                }
            }
        }
        Ok(obj)
    }

    /// Class creation through a metaclass call: user `__new__`/`__init__`
    /// on the metaclass participate, bottoming out in `type.__new__`.
    fn create_class_via(&mut self, mcls_id: HeapId, args: ArgValues) -> RunResult<Value> {
        let mcls_val = Value::Ref(mcls_id);
        let (name_v, bases_v, ns_v) = args.get_three_args("type")?;

        let new_fn = match self.dunder_value(mcls_id, StaticStrings::DunderNew)? {
            Some((f, _)) => self.unwrap_staticmethod(f),
            None => Value::Builtin(Builtins::Function(BuiltinFunction::TypeNew)),
        };

        let cls = if matches!(new_fn, Value::Builtin(Builtins::Function(BuiltinFunction::TypeNew))) {
            self.build_class_from_values(mcls_val, name_v, bases_v, ns_v)?
        } else {
            self.call(
                new_fn,
                ArgValues::new(vec![mcls_val, name_v, bases_v, ns_v], crate::args::KwargsValues::Empty),
            )?
        };

        if let Some((init_fn, init_origin)) = self.dunder_value(mcls_id, StaticStrings::DunderInit)? {
            if self.heap.wrapper_builtin(init_origin).is_none() {
                let init_fn = self.unwrap_staticmethod(init_fn);
                let result = self.call_dunder_bound(
                    cls,
                    init_fn,
                    ArgValues::new(vec![name_v, bases_v, ns_v], crate::args::KwargsValues::Empty),
                )?;
                if !result.is_none() {
                    let type_name = result.type_name(&self.heap, &self.interns).into_owned();
                    return Err(ExcType::type_error(format!(
                        "__init__() should return None, not '{type_name}'"
                    )));
                }
            }
        }
        Ok(cls)
    }

    fn unwrap_staticmethod(&self, v: Value) -> Value {
        if let Value::Ref(id) = v
            && let HeapData::StaticMethod(sm) = self.heap.get(id)
        {
            return sm.func();
        }
        v
    }

    /// Allocates a bare instance of a heap class (`object.__new__`).
    pub(crate) fn instantiate_bare(&mut self, class_id: HeapId) -> RunResult<Value> {
        let (builtin, slot_count, class_name) = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => (
                cls.builtin(),
                cls.slot_layout().len(),
                cls.name(&self.interns).to_owned(),
            ),
            _ => return Err(ExcType::type_error("__new__ requires a class")),
        };
        if builtin.is_some() && builtin != Some(Type::Object) {
            return Err(ExcType::type_error(format!("cannot create '{class_name}' instances")));
        }
        let id = self.heap.allocate(HeapData::Instance(Instance::new(class_id, None, slot_count)))?;
        Ok(Value::Ref(id))
    }

    // ------------------------------------------------------------------
    // builtin dispatch
    // ------------------------------------------------------------------

    fn call_builtin_function(&mut self, f: BuiltinFunction, args: ArgValues) -> RunResult<Value> {
        match f {
            BuiltinFunction::Len => {
                let v = args.get_one_arg("len")?;
                let len = self.py_len(v)?;
                Ok(Value::Int(len as i64))
            }
            BuiltinFunction::Hash => {
                let v = args.get_one_arg("hash")?;
                self.py_hash(v).map(Value::Int)
            }
            BuiltinFunction::Repr => {
                let v = args.get_one_arg("repr")?;
                let repr = self.py_repr(v)?;
                self.alloc_str(&repr)
            }
            BuiltinFunction::Id => {
                let v = args.get_one_arg("id")?;
                match v {
                    Value::Ref(id) => Ok(Value::Int(id.index() as i64)),
                    other => {
                        let hash = Dict::key_hash(&other, &self.heap, &self.interns)?;
                        Ok(Value::Int(hash as i64))
                    }
                }
            }
            BuiltinFunction::IsInstance => {
                let (v, cls) = args.get_two_args("isinstance")?;
                self.isinstance(v, cls).map(Value::Bool)
            }
            BuiltinFunction::IsSubclass => {
                let (sub, sup) = args.get_two_args("issubclass")?;
                self.issubclass(sub, sup).map(Value::Bool)
            }
            BuiltinFunction::GetAttr => {
                let (obj, name_v, default) = args.get_one_to_three_args("getattr")?;
                let Some(name_v) = name_v else {
                    return Err(ExcType::type_error_at_least("getattr", 2, 1));
                };
                let Some(name) = name_v.as_str(&self.heap, &self.interns).map(str::to_owned) else {
                    return Err(ExcType::type_error("getattr(): attribute name must be string"));
                };
                match default {
                    Some(default) => self.getattr_with_default(obj, &name, default),
                    None => self.getattr(obj, &name),
                }
            }
            BuiltinFunction::SetAttr => {
                let (obj, name_v, value) = args.get_three_args("setattr")?;
                let Some(name) = name_v.as_str(&self.heap, &self.interns).map(str::to_owned) else {
                    return Err(ExcType::type_error("setattr(): attribute name must be string"));
                };
                self.setattr(obj, &name, value)?;
                Ok(Value::None)
            }
            BuiltinFunction::DelAttr => {
                let (obj, name_v) = args.get_two_args("delattr")?;
                let Some(name) = name_v.as_str(&self.heap, &self.interns).map(str::to_owned) else {
                    return Err(ExcType::type_error("delattr(): attribute name must be string"));
                };
                self.delattr(obj, &name)?;
                Ok(Value::None)
            }
            BuiltinFunction::HasAttr => {
                let (obj, name_v) = args.get_two_args("hasattr")?;
                let Some(name) = name_v.as_str(&self.heap, &self.interns).map(str::to_owned) else {
                    return Err(ExcType::type_error("hasattr(): attribute name must be string"));
                };
                self.hasattr(obj, &name).map(Value::Bool)
            }
            BuiltinFunction::Callable => {
                let v = args.get_one_arg("callable")?;
                self.is_callable(v).map(Value::Bool)
            }
            BuiltinFunction::ObjectNew => {
                let (mut pos, _kwargs) = args.into_parts();
                let Some(cls) = pos.next() else {
                    return Err(ExcType::type_error_at_least("object.__new__", 1, 0));
                };
                let Some(class_id) = self.as_class_id(&cls)? else {
                    return Err(ExcType::type_error("object.__new__(X): X is not a type object"));
                };
                self.instantiate_bare(class_id)
            }
            BuiltinFunction::ObjectInit => Ok(Value::None),
            BuiltinFunction::TypeNew => {
                let (mut pos, _kwargs) = args.into_parts();
                let (Some(mcls), Some(name_v), Some(bases_v), Some(ns_v)) =
                    (pos.next(), pos.next(), pos.next(), pos.next())
                else {
                    return Err(ExcType::type_error_arg_count("type.__new__", 4, 0));
                };
                self.build_class_from_values(mcls, name_v, bases_v, ns_v)
            }
        }
    }

    fn call_builtin_type(&mut self, t: Type, args: ArgValues) -> RunResult<Value> {
        match t {
            Type::Type => match args.count() {
                1 => {
                    let v = args.get_one_arg("type")?;
                    self.type_of(v)
                }
                3 => {
                    let (name_v, bases_v, ns_v) = args.get_three_args("type")?;
                    let type_wrapper = self.heap.builtin_class_id(Type::Type, &mut self.interns)?;
                    let mcls = self.class_value(type_wrapper);
                    self.build_class_from_values(mcls, name_v, bases_v, ns_v)
                }
                n => Err(ExcType::type_error(format!("type() takes 1 or 3 arguments ({n} given)"))),
            },
            Type::Object => {
                args.check_zero_args("object")?;
                let object_id = self.heap.builtin_class_id(Type::Object, &mut self.interns)?;
                let id = self.heap.allocate(HeapData::Instance(Instance::new(object_id, None, 0)))?;
                Ok(Value::Ref(id))
            }
            Type::Bool => match args {
                ArgValues::Empty => Ok(Value::Bool(false)),
                other => {
                    let v = other.get_one_arg("bool")?;
                    self.py_bool(v).map(Value::Bool)
                }
            },
            Type::Str => match args {
                ArgValues::Empty => self.alloc_str(""),
                other => {
                    let v = other.get_one_arg("str")?;
                    let s = self.py_str(v)?;
                    self.alloc_str(&s)
                }
            },
            Type::Int => match args {
                ArgValues::Empty => Ok(Value::Int(0)),
                other => {
                    let v = other.get_one_arg("int")?;
                    self.convert_to_int(v)
                }
            },
            Type::Float => match args {
                ArgValues::Empty => Ok(Value::Float(0.0)),
                other => {
                    let v = other.get_one_arg("float")?;
                    self.convert_to_float(v)
                }
            },
            Type::List => match args {
                ArgValues::Empty => self.alloc_list(vec![]),
                other => {
                    let v = other.get_one_arg("list")?;
                    let items = self.sequence_items(v, "list")?;
                    self.alloc_list(items)
                }
            },
            Type::Tuple => match args {
                ArgValues::Empty => self.alloc_tuple(vec![]),
                other => {
                    let v = other.get_one_arg("tuple")?;
                    let items = self.sequence_items(v, "tuple")?;
                    self.alloc_tuple(items)
                }
            },
            Type::Dict => match args {
                ArgValues::Empty => self.dict_new(),
                other => {
                    let v = other.get_one_arg("dict")?;
                    let Value::Ref(id) = v else {
                        return Err(ExcType::type_error("dict() argument must be a dict"));
                    };
                    let copy = match self.heap.get(id) {
                        HeapData::Dict(d) => d.copied(),
                        _ => return Err(ExcType::type_error("dict() argument must be a dict")),
                    };
                    let new_id = self.heap.allocate(HeapData::Dict(copy))?;
                    Ok(Value::Ref(new_id))
                }
            },
            Type::Slice => {
                let (a, b, c) = args.get_one_to_three_args("slice")?;
                let slice = match (b, c) {
                    (None, _) => Slice::new(Value::None, a, Value::None),
                    (Some(b), None) => Slice::new(a, b, Value::None),
                    (Some(b), Some(c)) => Slice::new(a, b, c),
                };
                let id = self.heap.allocate(HeapData::Slice(slice))?;
                Ok(Value::Ref(id))
            }
            Type::Property => {
                let (fget, fset, fdel) = match args {
                    ArgValues::Empty => (None, None, None),
                    ArgValues::One(g) => (Some(g), None, None),
                    ArgValues::Two(g, s) => (Some(g), Some(s), None),
                    other => {
                        let (g, s, d) = other.get_three_args("property")?;
                        (Some(g), Some(s), Some(d))
                    }
                };
                let none_filter = |v: Option<Value>| v.filter(|v| !v.is_none());
                let prop = Property::new(none_filter(fget), none_filter(fset), none_filter(fdel));
                let id = self.heap.allocate(HeapData::Property(prop))?;
                Ok(Value::Ref(id))
            }
            Type::StaticMethod => {
                let func = args.get_one_arg("staticmethod")?;
                let id = self.heap.allocate(HeapData::StaticMethod(StaticMethod::new(func)))?;
                Ok(Value::Ref(id))
            }
            Type::ClassMethod => {
                let func = args.get_one_arg("classmethod")?;
                let id = self.heap.allocate(HeapData::ClassMethod(ClassMethod::new(func)))?;
                Ok(Value::Ref(id))
            }
            other => Err(ExcType::type_error(format!("cannot create '{other}' instances"))),
        }
    }

    fn call_exc_type(&mut self, e: crate::exception_private::ExcType, args: ArgValues) -> RunResult<Value> {
        let arg = match args {
            ArgValues::Empty => None,
            other => {
                let v = other.get_one_arg(e.into())?;
                Some(self.py_str(v)?)
            }
        };
        let id = self.heap.allocate(HeapData::Exception(SimpleException::new(e, arg)))?;
        Ok(Value::Ref(id))
    }

    fn convert_to_int(&mut self, v: Value) -> RunResult<Value> {
        match v {
            Value::Int(_) => Ok(v),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            _ => {
                if let Value::Ref(id) = v
                    && matches!(self.heap.get(id), HeapData::LongInt(_))
                {
                    return Ok(v);
                }
                if let Some(s) = v.as_str(&self.heap, &self.interns) {
                    let trimmed = s.trim().to_owned();
                    return match trimmed.parse::<i64>() {
                        Ok(i) => Ok(Value::Int(i)),
                        Err(_) => Err(ExcType::value_error(format!(
                            "invalid literal for int() with base 10: '{trimmed}'"
                        ))),
                    };
                }
                let type_name = v.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::type_error(format!(
                    "int() argument must be a string or a number, not '{type_name}'"
                )))
            }
        }
    }

    fn convert_to_float(&mut self, v: Value) -> RunResult<Value> {
        match v {
            Value::Float(_) => Ok(v),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Bool(b) => Ok(Value::Float(f64::from(i8::from(b)))),
            _ => {
                if let Some(s) = v.as_str(&self.heap, &self.interns) {
                    let trimmed = s.trim().to_owned();
                    return match trimmed.parse::<f64>() {
                        Ok(f) => Ok(Value::Float(f)),
                        Err(_) => Err(ExcType::value_error(format!(
                            "could not convert string to float: {trimmed}"
                        ))),
                    };
                }
                let type_name = v.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::type_error(format!(
                    "float() argument must be a string or a number, not '{type_name}'"
                )))
            }
        }
    }

    fn sequence_items(&mut self, v: Value, func: &str) -> RunResult<Vec<Value>> {
        if let Value::Ref(id) = v {
            match self.heap.get(id) {
                HeapData::List(l) => return Ok(l.as_vec().to_vec()),
                HeapData::Tuple(t) => return Ok(t.as_vec().to_vec()),
                _ => {}
            }
        }
        let type_name = v.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::type_error(format!("'{type_name}' object is not iterable ({func})")))
    }
}
