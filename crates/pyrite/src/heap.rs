//! Arena heap for all non-immediate values.
//!
//! Objects live in a slab of slots addressed by [`HeapId`]. Slots are
//! recycled through a free list when the embedding collector reclaims
//! them: the runtime itself never frees. The collector drives reclamation
//! through [`Heap::traverse`], which reports every outgoing strong
//! reference of an object (weak edges, like the subclass registry, are
//! deliberately not reported).

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::{
    builtins::{BuiltinFunction, Builtins},
    exception_private::SimpleException,
    intern::{Interns, StaticStrings},
    resource::{ResourceError, ResourceTracker},
    types::{
        BoundMethod, Bytes, ClassMethod, ClassObject, Dict, Instance, List, LongInt, MappingProxy, MemberDescriptor,
        Module, Property, Slice, StaticMethod, Str, Tuple, Type,
    },
    value::Value,
};

/// Index of a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a heap slot.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum HeapData {
    Str(Str),
    Bytes(Bytes),
    LongInt(LongInt),
    List(List),
    Tuple(Tuple),
    Dict(Dict),
    Slice(Slice),
    Module(Module),
    ClassObject(ClassObject),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Property(Property),
    StaticMethod(StaticMethod),
    ClassMethod(ClassMethod),
    MemberDescriptor(MemberDescriptor),
    MappingProxy(MappingProxy),
    Exception(SimpleException),
}

impl HeapData {
    /// The tag-level type of this payload.
    #[must_use]
    pub fn py_type(&self) -> Type {
        match self {
            Self::Str(_) => Type::Str,
            Self::Bytes(_) => Type::Bytes,
            Self::LongInt(_) => Type::Int,
            Self::List(_) => Type::List,
            Self::Tuple(_) => Type::Tuple,
            Self::Dict(_) => Type::Dict,
            Self::Slice(_) => Type::Slice,
            Self::Module(_) => Type::Module,
            Self::ClassObject(_) => Type::Type,
            Self::Instance(_) => Type::Instance,
            Self::BoundMethod(_) => Type::Method,
            Self::Property(_) => Type::Property,
            Self::StaticMethod(_) => Type::StaticMethod,
            Self::ClassMethod(_) => Type::ClassMethod,
            Self::MemberDescriptor(_) => Type::MemberDescriptor,
            Self::MappingProxy(_) => Type::DictProxy,
            Self::Exception(exc) => Type::Exception(exc.exc_type()),
        }
    }

    /// Static variant name, for heap statistics.
    #[must_use]
    fn variant_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "Str",
            Self::Bytes(_) => "Bytes",
            Self::LongInt(_) => "LongInt",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Dict(_) => "Dict",
            Self::Slice(_) => "Slice",
            Self::Module(_) => "Module",
            Self::ClassObject(_) => "ClassObject",
            Self::Instance(_) => "Instance",
            Self::BoundMethod(_) => "BoundMethod",
            Self::Property(_) => "Property",
            Self::StaticMethod(_) => "StaticMethod",
            Self::ClassMethod(_) => "ClassMethod",
            Self::MemberDescriptor(_) => "MemberDescriptor",
            Self::MappingProxy(_) => "MappingProxy",
            Self::Exception(_) => "Exception",
        }
    }

    /// Rough payload size in bytes, for resource accounting.
    #[must_use]
    fn estimate_size(&self) -> usize {
        let value_size = std::mem::size_of::<Value>();
        std::mem::size_of::<Self>()
            + match self {
                Self::Str(s) => s.byte_len(),
                Self::Bytes(b) => b.len(),
                Self::LongInt(_) => 32,
                Self::List(l) => l.len() * value_size,
                Self::Tuple(t) => t.len() * value_size,
                Self::Dict(d) => d.len() * (2 * value_size + 8),
                Self::ClassObject(cls) => cls.namespace().len() * (2 * value_size + 8) + cls.mro().len() * 8,
                Self::Instance(inst) => inst.slot_count() * value_size,
                Self::Module(m) => m.dict().len() * (2 * value_size + 8),
                _ => 0,
            }
    }

    /// Reports every outgoing strong reference.
    fn each_child(&self, visitor: &mut impl FnMut(HeapId)) {
        fn visit_value(v: &Value, visitor: &mut impl FnMut(HeapId)) {
            if let Value::Ref(id) = v {
                visitor(*id);
            }
        }
        match self {
            Self::Str(_) | Self::Bytes(_) | Self::LongInt(_) | Self::MemberDescriptor(_) | Self::Exception(_) => {}
            Self::List(l) => {
                for v in l.as_vec() {
                    visit_value(v, visitor);
                }
            }
            Self::Tuple(t) => {
                for v in t.as_vec() {
                    visit_value(v, visitor);
                }
            }
            Self::Dict(d) => {
                for (k, v) in d.iter() {
                    visit_value(k, visitor);
                    visit_value(v, visitor);
                }
            }
            Self::Slice(s) => {
                visit_value(&s.start, visitor);
                visit_value(&s.stop, visitor);
                visit_value(&s.step, visitor);
            }
            Self::Module(m) => {
                for (k, v) in m.dict().iter() {
                    visit_value(k, visitor);
                    visit_value(v, visitor);
                }
            }
            Self::ClassObject(cls) => {
                visit_value(&cls.metaclass(), visitor);
                for (k, v) in cls.namespace().iter() {
                    visit_value(k, visitor);
                    visit_value(v, visitor);
                }
                for &base in cls.bases() {
                    visitor(base);
                }
                for &entry in cls.mro() {
                    visitor(entry);
                }
                // subclass registry entries are weak by design
            }
            Self::Instance(inst) => {
                visitor(inst.class_id());
                if let Some(attrs) = inst.attrs_id() {
                    visitor(attrs);
                }
                for v in inst.slot_values() {
                    visit_value(v, visitor);
                }
            }
            Self::BoundMethod(bm) => {
                visit_value(&bm.func(), visitor);
                visit_value(&bm.instance(), visitor);
            }
            Self::Property(p) => {
                for accessor in [p.fget(), p.fset(), p.fdel()].into_iter().flatten() {
                    visit_value(&accessor, visitor);
                }
            }
            Self::StaticMethod(sm) => visit_value(&sm.func(), visitor),
            Self::ClassMethod(cm) => visit_value(&cm.func(), visitor),
            Self::MappingProxy(mp) => visitor(mp.class_id()),
        }
    }
}

#[derive(Debug)]
enum Slot {
    Free,
    /// Temporarily taken by `with_entry_mut`.
    Borrowed,
    Live(HeapData),
}

/// Snapshot of heap occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live objects.
    pub live_objects: usize,
    /// Number of recycled slots available for reuse.
    pub free_slots: usize,
    /// Total slots (live + free).
    pub total_slots: usize,
    /// Live objects by payload variant name, deterministically ordered.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// The arena heap.
#[derive(Debug)]
pub struct Heap<T: ResourceTracker> {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    tracker: T,
    /// Immutable `ClassObject` wrappers for builtin types, created on
    /// demand so inheritance and MRO walks are uniform.
    builtin_classes: AHashMap<Type, HeapId>,
    next_uid: u64,
}

impl<T: ResourceTracker> Heap<T> {
    /// Creates an empty heap using the given resource tracker.
    #[must_use]
    pub fn new(tracker: T) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            tracker,
            builtin_classes: AHashMap::new(),
            next_uid: 0,
        }
    }

    /// Allocates a new object, charging the resource tracker.
    pub(crate) fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;
        if let Some(index) = self.free_list.pop() {
            self.slots[index] = Slot::Live(data);
            Ok(HeapId(index))
        } else {
            self.slots.push(Slot::Live(data));
            Ok(HeapId(self.slots.len() - 1))
        }
    }

    /// Reclaims a slot. Called by the embedding collector once it has
    /// proven the object unreachable; the runtime never calls this itself.
    pub fn free(&mut self, id: HeapId) {
        let slot = std::mem::replace(&mut self.slots[id.0], Slot::Free);
        if let Slot::Live(data) = &slot {
            self.tracker.on_free(|| data.estimate_size());
            self.builtin_classes.retain(|_, &mut v| v != id);
            self.free_list.push(id.0);
        } else {
            self.slots[id.0] = slot;
        }
    }

    /// Whether the slot currently holds a live object.
    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        matches!(self.slots.get(id.0), Some(Slot::Live(_)))
    }

    /// Borrows the payload of a live slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free or currently taken by `with_entry_mut`.
    #[must_use]
    pub(crate) fn get(&self, id: HeapId) -> &HeapData {
        match &self.slots[id.0] {
            Slot::Live(data) => data,
            Slot::Free => panic!("use of freed heap slot {id:?}"),
            Slot::Borrowed => panic!("heap slot {id:?} accessed while mutably borrowed"),
        }
    }

    /// Mutably borrows the payload of a live slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free or currently taken by `with_entry_mut`.
    pub(crate) fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        match &mut self.slots[id.0] {
            Slot::Live(data) => data,
            Slot::Free => panic!("use of freed heap slot {id:?}"),
            Slot::Borrowed => panic!("heap slot {id:?} accessed while mutably borrowed"),
        }
    }

    /// Runs `f` with mutable access to both one payload and the rest of the
    /// heap. The slot reads as borrowed for the duration; the payload is
    /// restored before returning.
    pub(crate) fn with_entry_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut Self, &mut HeapData) -> R) -> R {
        let mut data = match std::mem::replace(&mut self.slots[id.0], Slot::Borrowed) {
            Slot::Live(data) => data,
            other => {
                self.slots[id.0] = other;
                panic!("with_entry_mut on non-live heap slot {id:?}");
            }
        };
        let result = f(self, &mut data);
        self.slots[id.0] = Slot::Live(data);
        result
    }

    /// Reports every outgoing strong reference of `id` to the visitor.
    ///
    /// This is the collector interface: mark phases start from the
    /// embedder's roots and traverse through here. Weak edges (the
    /// subclass registry) are not reported.
    pub fn traverse(&self, id: HeapId, visitor: &mut impl FnMut(HeapId)) {
        self.get(id).each_child(visitor);
    }

    /// Mutable access to the resource tracker (call accounting).
    pub(crate) fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Issues a unique class uid, validating weak subclass entries.
    pub(crate) fn next_class_uid(&mut self) -> u64 {
        self.next_uid += 1;
        self.next_uid
    }

    /// Returns the wrapper class for a builtin type, creating the wrapper
    /// (and its base chain) on first use.
    pub(crate) fn builtin_class_id(&mut self, t: Type, interns: &mut Interns) -> Result<HeapId, ResourceError> {
        if let Some(&id) = self.builtin_classes.get(&t) {
            return Ok(id);
        }

        let (bases, parent_mro) = match t.builtin_base() {
            Some(base) => {
                let base_id = self.builtin_class_id(base, interns)?;
                let parent_mro = match self.get(base_id) {
                    HeapData::ClassObject(cls) => cls.mro().to_vec(),
                    _ => Vec::new(),
                };
                (vec![base_id], parent_mro)
            }
            None => (Vec::new(), Vec::new()),
        };

        let mut namespace = Dict::new();
        match t {
            Type::Object => {
                namespace.insert_id(
                    StaticStrings::DunderNew.into(),
                    Value::Builtin(Builtins::Function(BuiltinFunction::ObjectNew)),
                    interns,
                );
                namespace.insert_id(
                    StaticStrings::DunderInit.into(),
                    Value::Builtin(Builtins::Function(BuiltinFunction::ObjectInit)),
                    interns,
                );
            }
            Type::Type => {
                namespace.insert_id(
                    StaticStrings::DunderNew.into(),
                    Value::Builtin(Builtins::Function(BuiltinFunction::TypeNew)),
                    interns,
                );
            }
            _ => {}
        }

        let name_id = interns.intern(t.name());
        let uid = self.next_class_uid();
        // reserve the slot first so the wrapper's MRO can include itself
        let id = self.allocate(HeapData::ClassObject(ClassObject::new_builtin(
            name_id,
            uid,
            t,
            namespace,
            bases,
            Vec::new(),
        )))?;
        let mut mro = vec![id];
        mro.extend(parent_mro);
        match self.get_mut(id) {
            HeapData::ClassObject(cls) => cls.set_mro(mro),
            _ => unreachable!("just allocated a class object"),
        }
        self.builtin_classes.insert(t, id);
        Ok(id)
    }

    /// Whether `id` is the wrapper class of a builtin type.
    #[must_use]
    pub(crate) fn wrapper_builtin(&self, id: HeapId) -> Option<Type> {
        match self.get(id) {
            HeapData::ClassObject(cls) => cls.builtin(),
            _ => None,
        }
    }

    /// Snapshot of current heap occupancy.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut live_objects = 0;
        for slot in &self.slots {
            match slot {
                Slot::Live(data) => {
                    live_objects += 1;
                    *objects_by_type.entry(data.variant_name()).or_insert(0) += 1;
                }
                Slot::Borrowed => live_objects += 1,
                Slot::Free => {}
            }
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.slots.len(),
            objects_by_type,
        }
    }

    /// Iterates the ids of every live slot.
    pub fn live_ids(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Live(_) => Some(HeapId(i)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn slots_are_recycled_after_free() {
        let mut heap = Heap::new(NoLimitTracker);
        let a = heap.allocate(HeapData::Str(Str::new("a"))).unwrap();
        heap.free(a);
        let b = heap.allocate(HeapData::Str(Str::new("b"))).unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.stats().live_objects, 1);
    }

    #[test]
    fn traverse_reports_strong_children() {
        let mut heap = Heap::new(NoLimitTracker);
        let s = heap.allocate(HeapData::Str(Str::new("x"))).unwrap();
        let list = heap
            .allocate(HeapData::List(List::new(vec![Value::Ref(s), Value::Int(1)])))
            .unwrap();
        let mut children = Vec::new();
        heap.traverse(list, &mut |id| children.push(id));
        assert_eq!(children, vec![s]);
    }

    #[test]
    fn builtin_wrappers_are_cached_and_linearized() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut interns = Interns::new();
        let bool_id = heap.builtin_class_id(Type::Bool, &mut interns).unwrap();
        let int_id = heap.builtin_class_id(Type::Int, &mut interns).unwrap();
        let object_id = heap.builtin_class_id(Type::Object, &mut interns).unwrap();
        assert_eq!(heap.builtin_class_id(Type::Bool, &mut interns).unwrap(), bool_id);

        let HeapData::ClassObject(cls) = heap.get(bool_id) else { unreachable!() };
        assert_eq!(cls.mro(), &[bool_id, int_id, object_id]);
        assert!(cls.is_immutable());
    }
}
