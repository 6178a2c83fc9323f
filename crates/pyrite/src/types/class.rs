//! User-defined classes and their instances.
//!
//! `ClassObject` is the heap-allocated type descriptor: name, metaclass,
//! namespace, bases, C3 MRO, `__slots__` layout, instance flags, the weak
//! subclass registry and the per-type dunder slot cache. Builtin types are
//! materialized as immutable `ClassObject` wrappers so that MRO walks never
//! special-case them.
//!
//! # Attribute access
//!
//! Class namespaces are consulted in MRO order; the first hit wins. The
//! data/non-data descriptor arbitration against instance dicts lives in
//! `runtime::attr`, not here.
//!
//! # Invalidation
//!
//! Mutating a class namespace bumps the class version and evicts the
//! touched name from the dunder cache of the class and all live subclasses,
//! found through the weak registry.

use ahash::AHashMap;

use crate::{
    exception_private::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StringId},
    proxy::ProxyId,
    resource::{MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH, ResourceTracker},
    types::{Dict, Type},
    value::Value,
};

/// Weakly tracked subclass entry.
///
/// Stores the heap id plus the class uid captured at registration so stale
/// entries (heap slot reused after collection) are detected on read without
/// keeping the subclass alive.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct SubclassEntry {
    class_id: HeapId,
    class_uid: u64,
}

impl SubclassEntry {
    #[must_use]
    pub fn new(class_id: HeapId, class_uid: u64) -> Self {
        Self { class_id, class_uid }
    }

    #[must_use]
    pub fn class_id(self) -> HeapId {
        self.class_id
    }

    #[must_use]
    pub fn class_uid(self) -> u64 {
        self.class_uid
    }
}

/// A class: the per-type metadata every lookup consults.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct ClassObject {
    /// The class name.
    name: StringId,
    /// Unique id validating weak registry entries across slot reuse.
    class_uid: u64,
    /// The metaclass: `type` or a heap metaclass value.
    metaclass: Value,
    /// Class namespace in declaration order.
    namespace: Dict,
    /// Direct bases.
    bases: Vec<HeapId>,
    /// C3 linearization, starting with this class and ending at `object`.
    mro: Vec<HeapId>,
    /// `__slots__` declared directly on this class, if any.
    slots: Option<Vec<String>>,
    /// Full slot layout including inherited slots.
    slot_layout: Vec<String>,
    /// Slot name -> index in `slot_layout`.
    slot_indices: AHashMap<String, usize>,
    /// Whether instances carry a `__dict__`.
    instance_has_dict: bool,
    /// Whether instances carry a `__weakref__` slot.
    instance_has_weakref: bool,
    /// Set for builtin wrappers; implies immutability.
    builtin: Option<Type>,
    /// Foreign types registered through the interop bridge are immutable
    /// without being builtin.
    immutable: bool,
    /// Direct subclasses, weakly referenced.
    subclasses: Vec<SubclassEntry>,
    /// Bumped on every namespace mutation; external call-site caches key
    /// off `(class_uid, version)`.
    version: u64,
    /// Dunder name -> defining MRO entry (`None` caches absence).
    dunder_cache: AHashMap<StringId, Option<HeapId>>,
}

impl ClassObject {
    /// Creates a heap class. The MRO is set after allocation, once the
    /// class's own id is known.
    #[must_use]
    pub fn new(name: StringId, class_uid: u64, metaclass: Value, namespace: Dict, bases: Vec<HeapId>) -> Self {
        Self {
            name,
            class_uid,
            metaclass,
            namespace,
            bases,
            mro: Vec::new(),
            slots: None,
            slot_layout: Vec::new(),
            slot_indices: AHashMap::new(),
            instance_has_dict: true,
            instance_has_weakref: true,
            builtin: None,
            immutable: false,
            subclasses: Vec::new(),
            version: 0,
            dunder_cache: AHashMap::new(),
        }
    }

    /// Creates an immutable wrapper for a builtin type.
    #[must_use]
    pub fn new_builtin(
        name: StringId,
        class_uid: u64,
        builtin: Type,
        namespace: Dict,
        bases: Vec<HeapId>,
        mro: Vec<HeapId>,
    ) -> Self {
        let mut cls = Self::new(name, class_uid, Value::Builtin(crate::builtins::Builtins::Type(Type::Type)), namespace, bases);
        cls.mro = mro;
        cls.builtin = Some(builtin);
        cls.immutable = true;
        cls.instance_has_dict = false;
        cls.instance_has_weakref = false;
        cls
    }

    #[must_use]
    pub fn name<'a>(&self, interns: &'a Interns) -> &'a str {
        interns.get_str(self.name)
    }

    #[must_use]
    pub fn name_id(&self) -> StringId {
        self.name
    }

    #[must_use]
    pub fn class_uid(&self) -> u64 {
        self.class_uid
    }

    #[must_use]
    pub fn metaclass(&self) -> Value {
        self.metaclass
    }

    #[must_use]
    pub fn namespace(&self) -> &Dict {
        &self.namespace
    }

    /// Direct namespace access for creation-time population. Runtime-level
    /// mutation goes through `Runtime::class_set_attr`, which also bumps
    /// the version and evicts slot caches.
    pub fn namespace_mut(&mut self) -> &mut Dict {
        &mut self.namespace
    }

    #[must_use]
    pub fn bases(&self) -> &[HeapId] {
        &self.bases
    }

    #[must_use]
    pub fn mro(&self) -> &[HeapId] {
        &self.mro
    }

    /// Sets the MRO after allocation, once the class id exists.
    pub fn set_mro(&mut self, mro: Vec<HeapId>) {
        self.mro = mro;
    }

    #[must_use]
    pub fn builtin(&self) -> Option<Type> {
        self.builtin
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Marks the class immutable (foreign types).
    pub fn set_immutable(&mut self) {
        self.immutable = true;
    }

    /// The `__slots__` declared directly on this class.
    ///
    /// Retained for introspection surfaces layered above the core.
    #[must_use]
    #[expect(dead_code)]
    pub fn slots(&self) -> Option<&[String]> {
        self.slots.as_deref()
    }

    pub fn set_slots(&mut self, slots: Vec<String>) {
        self.slots = Some(slots);
    }

    #[must_use]
    pub fn slot_layout(&self) -> &[String] {
        &self.slot_layout
    }

    #[must_use]
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slot_indices.get(name).copied()
    }

    /// Sets the finalized slot layout and instance flags.
    pub fn set_slot_layout(
        &mut self,
        slot_layout: Vec<String>,
        slot_indices: AHashMap<String, usize>,
        instance_has_dict: bool,
        instance_has_weakref: bool,
    ) {
        self.slot_layout = slot_layout;
        self.slot_indices = slot_indices;
        self.instance_has_dict = instance_has_dict;
        self.instance_has_weakref = instance_has_weakref;
    }

    #[must_use]
    pub fn instance_has_dict(&self) -> bool {
        self.instance_has_dict
    }

    #[must_use]
    pub fn instance_has_weakref(&self) -> bool {
        self.instance_has_weakref
    }

    /// Registers a direct subclass in the weak registry.
    pub fn register_subclass(&mut self, class_id: HeapId, class_uid: u64) {
        self.subclasses.push(SubclassEntry::new(class_id, class_uid));
    }

    #[must_use]
    pub fn subclasses(&self) -> &[SubclassEntry] {
        &self.subclasses
    }

    /// Current mutation version. `(class_uid, version)` keys monomorphic
    /// call-site caches in the embedding interpreter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Cached dunder resolution: `Some(origin)` is a hit, inner `None`
    /// caches absence, outer `None` means not yet derived.
    #[must_use]
    pub fn dunder_cache_get(&self, name: StringId) -> Option<Option<HeapId>> {
        self.dunder_cache.get(&name).copied()
    }

    pub fn dunder_cache_insert(&mut self, name: StringId, origin: Option<HeapId>) {
        self.dunder_cache.insert(name, origin);
    }

    pub fn dunder_cache_evict(&mut self, name: StringId) {
        self.dunder_cache.remove(&name);
    }

    /// Looks up a name along the MRO. Returns the value and the defining
    /// class. The first hit wins; this is the only tie-break.
    pub fn mro_lookup(
        &self,
        name: &str,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> Option<(Value, HeapId)> {
        if let Some(value) = self.namespace.get_by_str(name, heap, interns) {
            let self_id = self.mro.first().copied()?;
            return Some((value, self_id));
        }
        for &entry_id in self.mro.iter().skip(1) {
            if let HeapData::ClassObject(cls) = heap.get(entry_id)
                && let Some(value) = cls.namespace.get_by_str(name, heap, interns)
            {
                return Some((value, entry_id));
            }
        }
        None
    }

    /// Looks up a name along the MRO, starting after the given entry.
    ///
    /// This is the `super()` walk: resolution continues from the class
    /// following `after` in this class's linearization. The surface syntax
    /// lives in the compiler layer; the walk is provided here.
    #[expect(dead_code)]
    pub fn mro_lookup_from(
        &self,
        after: HeapId,
        name: &str,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> Option<(Value, HeapId)> {
        let start = self.mro.iter().position(|&id| id == after).map_or(0, |i| i + 1);
        for &entry_id in &self.mro[start..] {
            if let HeapData::ClassObject(cls) = heap.get(entry_id)
                && let Some(value) = cls.namespace.get_by_str(name, heap, interns)
            {
                return Some((value, entry_id));
            }
        }
        None
    }

    /// Whether this class (at `self_id`) is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, self_id: HeapId, other_id: HeapId) -> bool {
        self_id == other_id || self.mro.contains(&other_id)
    }
}

/// An instance of a user-defined class.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Instance {
    /// The class; `type(i) is T` holds modulo `__class__` assignment.
    class_id: HeapId,
    /// Instance `__dict__`, allocated lazily; absent for `__slots__`-only
    /// layouts. A heap object so it can be aliased explicitly.
    attrs_id: Option<HeapId>,
    /// Fixed `__slots__` storage; `Undefined` marks an unset slot.
    slot_values: Vec<Value>,
    /// Set when this instance adapts a foreign value.
    proxy: Option<ProxyId>,
}

impl Instance {
    #[must_use]
    pub fn new(class_id: HeapId, attrs_id: Option<HeapId>, slot_count: usize) -> Self {
        Self {
            class_id,
            attrs_id,
            slot_values: vec![Value::Undefined; slot_count],
            proxy: None,
        }
    }

    #[must_use]
    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    /// Rebinds the class; layout compatibility is checked by the caller.
    pub fn set_class_id(&mut self, class_id: HeapId) {
        self.class_id = class_id;
    }

    #[must_use]
    pub fn attrs_id(&self) -> Option<HeapId> {
        self.attrs_id
    }

    pub fn set_attrs_id(&mut self, attrs_id: Option<HeapId>) {
        self.attrs_id = attrs_id;
    }

    #[must_use]
    pub fn slot_value(&self, index: usize) -> Option<Value> {
        self.slot_values.get(index).copied()
    }

    pub fn set_slot_value(&mut self, index: usize, value: Value) {
        self.slot_values[index] = value;
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_values.len()
    }

    #[must_use]
    pub fn slot_values(&self) -> &[Value] {
        &self.slot_values
    }

    #[must_use]
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    pub fn set_proxy(&mut self, proxy: ProxyId) {
        self.proxy = Some(proxy);
    }
}

/// Computes the C3 linearization for a class with the given bases.
///
/// `L[T] = T + merge(L[B1], ..., L[Bn], [B1, ..., Bn])`, where `merge`
/// repeatedly takes the head of the first list whose head is not in the
/// tail of any other list. No good head means the hierarchy admits no
/// consistent ordering and the class is rejected.
pub(crate) fn compute_c3_mro(
    self_id: HeapId,
    bases: &[HeapId],
    object_id: HeapId,
    heap: &Heap<impl ResourceTracker>,
    interns: &Interns,
) -> RunResult<Vec<HeapId>> {
    if bases.is_empty() {
        return Ok(vec![self_id, object_id]);
    }

    if bases.contains(&self_id) {
        return Err(ExcType::type_error("a class cannot inherit from itself"));
    }

    let mut linearizations: Vec<Vec<HeapId>> = Vec::with_capacity(bases.len() + 1);
    for &base_id in bases {
        match heap.get(base_id) {
            HeapData::ClassObject(cls) => linearizations.push(cls.mro().to_vec()),
            _ => return Err(ExcType::type_error("bases must be classes")),
        }
    }
    for lin in &linearizations {
        if lin.len() > MAX_INHERITANCE_DEPTH {
            return Err(ExcType::type_error(format!(
                "inheritance chain too deep (maximum depth {MAX_INHERITANCE_DEPTH})"
            )));
        }
    }

    linearizations.push(bases.to_vec());

    let mut result = vec![self_id];
    loop {
        linearizations.retain(|l| !l.is_empty());
        if linearizations.is_empty() {
            break;
        }

        // a good head appears in no tail
        let mut found = None;
        for lin in &linearizations {
            let candidate = lin[0];
            let in_tail = linearizations.iter().any(|other| other[1..].contains(&candidate));
            if !in_tail {
                found = Some(candidate);
                break;
            }
        }

        if let Some(next) = found {
            result.push(next);
            for lin in &mut linearizations {
                if !lin.is_empty() && lin[0] == next {
                    lin.remove(0);
                }
            }
        } else {
            let base_names: Vec<&str> = bases
                .iter()
                .map(|&id| match heap.get(id) {
                    HeapData::ClassObject(cls) => cls.name(interns),
                    _ => "?",
                })
                .collect();
            return Err(ExcType::type_error(format!(
                "Cannot create a consistent method resolution order (MRO) for bases {}",
                base_names.join(", ")
            )));
        }

        if result.len() > MAX_MRO_LENGTH {
            return Err(ExcType::type_error("MRO exceeds maximum length"));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtins::Builtins, resource::NoLimitTracker};

    fn make_class(
        heap: &mut Heap<NoLimitTracker>,
        interns: &mut Interns,
        name: &str,
        bases: Vec<HeapId>,
        object_id: HeapId,
    ) -> HeapId {
        let name_id = interns.intern(name);
        let uid = heap.next_class_uid();
        let metaclass = Value::Builtin(Builtins::Type(Type::Type));
        let cls = ClassObject::new(name_id, uid, metaclass, Dict::new(), bases.clone());
        let id = heap.allocate(HeapData::ClassObject(cls)).unwrap();
        let mro = compute_c3_mro(id, &bases, object_id, heap, interns).unwrap();
        match heap.get_mut(id) {
            HeapData::ClassObject(cls) => cls.set_mro(mro),
            _ => unreachable!(),
        }
        id
    }

    fn object_wrapper(heap: &mut Heap<NoLimitTracker>, interns: &mut Interns) -> HeapId {
        heap.builtin_class_id(Type::Object, interns).unwrap()
    }

    #[test]
    fn diamond_linearizes_left_to_right() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut interns = Interns::new();
        let object_id = object_wrapper(&mut heap, &mut interns);
        let a = make_class(&mut heap, &mut interns, "A", vec![], object_id);
        let b = make_class(&mut heap, &mut interns, "B", vec![a], object_id);
        let c = make_class(&mut heap, &mut interns, "C", vec![a], object_id);
        let d = make_class(&mut heap, &mut interns, "D", vec![b, c], object_id);

        let HeapData::ClassObject(cls) = heap.get(d) else { unreachable!() };
        assert_eq!(cls.mro(), &[d, b, c, a, object_id]);
    }

    #[test]
    fn mro_is_deterministic() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut interns = Interns::new();
        let object_id = object_wrapper(&mut heap, &mut interns);
        let a = make_class(&mut heap, &mut interns, "A", vec![], object_id);
        let b = make_class(&mut heap, &mut interns, "B", vec![a], object_id);

        let first = compute_c3_mro(b, &[a], object_id, &heap, &interns).unwrap();
        let second = compute_c3_mro(b, &[a], object_id, &heap, &interns).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn inconsistent_hierarchy_is_rejected() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut interns = Interns::new();
        let object_id = object_wrapper(&mut heap, &mut interns);
        let a = make_class(&mut heap, &mut interns, "A", vec![], object_id);
        let b = make_class(&mut heap, &mut interns, "B", vec![a], object_id);

        // class C(A, B) puts A before its own subclass B: no valid order
        let name_id = interns.intern("C");
        let uid = heap.next_class_uid();
        let cls = ClassObject::new(
            name_id,
            uid,
            Value::Builtin(Builtins::Type(Type::Type)),
            Dict::new(),
            vec![a, b],
        );
        let id = heap.allocate(HeapData::ClassObject(cls)).unwrap();
        let err = compute_c3_mro(id, &[a, b], object_id, &heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::TypeError));
        assert!(err.to_string().contains("consistent method resolution order"));
    }

    #[test]
    fn self_inheritance_is_rejected() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut interns = Interns::new();
        let object_id = object_wrapper(&mut heap, &mut interns);
        let a = make_class(&mut heap, &mut interns, "A", vec![], object_id);
        let err = compute_c3_mro(a, &[a], object_id, &heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    }
}
