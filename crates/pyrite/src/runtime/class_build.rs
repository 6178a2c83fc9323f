//! Class creation.
//!
//! `build_class` is the entry point the compiler's `BUILD_CLASS` opcode
//! hits: it resolves the winning metaclass and calls it with
//! `(name, bases, namespace)`. The call bottoms out in `type.__new__`
//! (`publish_class` here), which validates bases, computes the C3 MRO,
//! resolves the `__slots__` layout and publishes the class atomically:
//! any failure before publication leaves no partially visible type.

use ahash::AHashMap;

use crate::{
    args::{ArgValues, KwargsValues},
    exception_private::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, StringId},
    resource::ResourceTracker,
    runtime::Runtime,
    types::{ClassObject, Dict, MemberDescriptor, Type, compute_c3_mro},
    value::Value,
};

impl<T: ResourceTracker> Runtime<T> {
    /// Creates a class the way a `class` statement does.
    ///
    /// `namespace` is a heap dict holding the class body in declaration
    /// order (or `None` for an empty body). The metaclass is the explicit
    /// argument, the namespace's `__metaclass__` entry, or the most derived
    /// metaclass among the bases; incompatible candidates raise the
    /// metaclass-conflict `TypeError` before anything is published.
    pub fn build_class(
        &mut self,
        name: &str,
        bases: &[Value],
        namespace: Value,
        metaclass: Option<Value>,
    ) -> RunResult<Value> {
        let ns_v = match namespace {
            Value::None => self.dict_new()?,
            v => v,
        };
        let ns_id = match ns_v {
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Dict(_)) => id,
            _ => return Err(ExcType::type_error("class namespace must be a dict")),
        };

        // explicit argument, then the Python 2 __metaclass__ spelling
        let ns_metaclass = match self.heap.get(ns_id) {
            HeapData::Dict(dict) => dict.get_by_str(StaticStrings::DunderMetaclass.as_str(), &self.heap, &self.interns),
            _ => None,
        };
        let explicit = metaclass.or(ns_metaclass);

        let type_wrapper = self.heap.builtin_class_id(Type::Type, &mut self.interns)?;
        let mut winner = match explicit {
            Some(m) => match self.as_class_id(&m)? {
                Some(id) => id,
                None => return Err(ExcType::type_error("metaclass must be a class")),
            },
            None => match bases.first() {
                Some(first) => self.class_id_of(first)?,
                None => type_wrapper,
            },
        };

        // most derived metaclass wins; unordered candidates conflict
        for base in bases {
            if self.as_class_id(base)?.is_none() {
                let type_name = base.type_name(&self.heap, &self.interns).into_owned();
                return Err(ExcType::type_error(format!("bases must be classes, not '{type_name}'")));
            }
            let base_meta = self.class_id_of(base)?;
            if self.class_is_subclass(winner, base_meta) {
                continue;
            }
            if self.class_is_subclass(base_meta, winner) {
                winner = base_meta;
                continue;
            }
            return Err(ExcType::type_error(
                "metaclass conflict: the metaclass of a derived class must be a (non-strict) subclass \
                 of the metaclasses of all its bases",
            ));
        }

        let name_value = Value::InternString(self.interns.intern(name));
        let bases_tuple = self.alloc_tuple(bases.to_vec())?;
        let winner_val = self.class_value(winner);
        self.call(
            winner_val,
            ArgValues::new(vec![name_value, bases_tuple, ns_v], KwargsValues::Empty),
        )
    }

    fn class_is_subclass(&self, sub: HeapId, sup: HeapId) -> bool {
        sub == sup
            || match self.heap.get(sub) {
                HeapData::ClassObject(cls) => cls.is_subclass_of(sub, sup),
                _ => false,
            }
    }

    /// `type.__new__(mcls, name, bases, namespace)`.
    pub(crate) fn build_class_from_values(
        &mut self,
        mcls: Value,
        name_v: Value,
        bases_v: Value,
        ns_v: Value,
    ) -> RunResult<Value> {
        let Some(mcls_id) = self.as_class_id(&mcls)? else {
            return Err(ExcType::type_error("type.__new__(X): X is not a type object"));
        };
        let Some(name) = name_v.as_str(&self.heap, &self.interns).map(str::to_owned) else {
            return Err(ExcType::type_error("type() argument 1 must be a string"));
        };
        let name_id = self.interns.intern(&name);

        let base_values: Vec<Value> = match bases_v {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Tuple(t) => t.as_vec().to_vec(),
                HeapData::List(l) => l.as_vec().to_vec(),
                _ => return Err(ExcType::type_error("type() argument 2 must be a tuple")),
            },
            _ => return Err(ExcType::type_error("type() argument 2 must be a tuple")),
        };
        let mut base_ids = Vec::with_capacity(base_values.len());
        for base in &base_values {
            let Some(base_id) = self.as_class_id(base)? else {
                let type_name = base.type_name(&self.heap, &self.interns).into_owned();
                return Err(ExcType::type_error(format!("bases must be classes, not '{type_name}'")));
            };
            if let Some(t) = self.heap.wrapper_builtin(base_id)
                && !t.is_acceptable_base()
            {
                return Err(ExcType::type_error(format!(
                    "type '{t}' is not an acceptable base type"
                )));
            }
            base_ids.push(base_id);
        }
        for (i, &a) in base_ids.iter().enumerate() {
            if base_ids[..i].contains(&a) {
                let dup = match self.heap.get(a) {
                    HeapData::ClassObject(cls) => cls.name(&self.interns).to_owned(),
                    _ => "?".to_owned(),
                };
                return Err(ExcType::type_error(format!("duplicate base class {dup}")));
            }
        }

        let ns_entries = match ns_v {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Dict(dict) => dict.entries_vec(),
                _ => return Err(ExcType::type_error("type() argument 3 must be a dict")),
            },
            _ => return Err(ExcType::type_error("type() argument 3 must be a dict")),
        };

        self.publish_class(mcls_id, name_id, base_ids, ns_entries)
    }

    /// The creation state machine: bases validated, MRO computed, slots
    /// resolved, then published. Failures free the reserved heap slot so
    /// no partially constructed type is ever reachable.
    fn publish_class(
        &mut self,
        mcls_id: HeapId,
        name_id: StringId,
        base_ids: Vec<HeapId>,
        ns_entries: Vec<(Value, Value)>,
    ) -> RunResult<Value> {
        let object_id = self.heap.builtin_class_id(Type::Object, &mut self.interns)?;

        // the class body, in declaration order
        let mut namespace = Dict::with_capacity(ns_entries.len());
        let mut slots_decl: Option<Vec<String>> = None;
        for (k, v) in ns_entries {
            if let Some(key) = k.as_str(&self.heap, &self.interns)
                && key == StaticStrings::DunderSlots.as_str()
            {
                slots_decl = Some(self.parse_slots(&v)?);
            }
            namespace.set(k, v, &self.heap, &self.interns)?;
        }

        // defining __eq__ without __hash__ nulls the hash slot
        let has_eq = namespace
            .get_by_str(StaticStrings::DunderEq.as_str(), &self.heap, &self.interns)
            .is_some();
        let has_hash = namespace
            .get_by_str(StaticStrings::DunderHash.as_str(), &self.heap, &self.interns)
            .is_some();
        if has_eq && !has_hash {
            namespace.insert_id(StaticStrings::DunderHash.into(), Value::None, &self.interns);
        }

        let metaclass_val = self.class_value(mcls_id);
        let uid = self.heap.next_class_uid();
        let cls = ClassObject::new(name_id, uid, metaclass_val, namespace, base_ids.clone());
        let class_id = self.heap.allocate(HeapData::ClassObject(cls))?;

        let mro = match compute_c3_mro(class_id, &base_ids, object_id, &self.heap, &self.interns) {
            Ok(mro) => mro,
            Err(err) => {
                self.heap.free(class_id);
                return Err(err);
            }
        };

        // at most one base may contribute a non-empty slot layout
        let mut inherited: Vec<String> = Vec::new();
        let mut has_dict_inherited = false;
        let mut has_weakref_inherited = false;
        for &base_id in &base_ids {
            if let HeapData::ClassObject(base) = self.heap.get(base_id) {
                has_dict_inherited |= base.instance_has_dict();
                has_weakref_inherited |= base.instance_has_weakref();
                let layout = base.slot_layout();
                if !layout.is_empty() {
                    if !inherited.is_empty() && inherited != layout {
                        self.heap.free(class_id);
                        return Err(ExcType::type_error("multiple bases have instance lay-out conflict"));
                    }
                    inherited = layout.to_vec();
                }
            }
        }

        let mut layout = inherited;
        let mut own_slot_names: Vec<String> = Vec::new();
        let mut dict_slot = false;
        let mut weakref_slot = false;
        if let Some(decl) = &slots_decl {
            for slot in decl {
                if slot == StaticStrings::DunderDict.as_str() {
                    dict_slot = true;
                } else if slot == StaticStrings::DunderWeakref.as_str() {
                    weakref_slot = true;
                } else if !layout.contains(slot) {
                    layout.push(slot.clone());
                    own_slot_names.push(slot.clone());
                }
            }
        }
        let slot_indices: AHashMap<String, usize> =
            layout.iter().enumerate().map(|(i, name)| (name.clone(), i)).collect();
        let instance_has_dict = slots_decl.is_none() || dict_slot || has_dict_inherited;
        let instance_has_weakref = slots_decl.is_none() || weakref_slot || has_weakref_inherited;

        // member descriptors for the slots declared here
        let mut member_descrs: Vec<(StringId, Value)> = Vec::with_capacity(own_slot_names.len());
        for slot in &own_slot_names {
            let index = slot_indices[slot];
            let descr = MemberDescriptor::new(slot.clone(), index);
            let descr_id = match self.heap.allocate(HeapData::MemberDescriptor(descr)) {
                Ok(id) => id,
                Err(err) => {
                    self.heap.free(class_id);
                    return Err(err.into());
                }
            };
            let slot_name_id = self.interns.intern(slot);
            member_descrs.push((slot_name_id, Value::Ref(descr_id)));
        }

        // publication: from here on the class is fully formed
        match self.heap.get_mut(class_id) {
            HeapData::ClassObject(cls) => {
                cls.set_mro(mro);
                if let Some(decl) = slots_decl {
                    cls.set_slots(decl);
                }
                cls.set_slot_layout(layout, slot_indices, instance_has_dict, instance_has_weakref);
            }
            _ => unreachable!("just allocated a class object"),
        }
        for (slot_name_id, descr) in member_descrs {
            self.heap.with_entry_mut(class_id, |_heap, data| {
                if let HeapData::ClassObject(cls) = data {
                    cls.namespace_mut().insert_id(slot_name_id, descr, &self.interns);
                }
            });
        }
        for &base_id in &base_ids {
            if let HeapData::ClassObject(base) = self.heap.get_mut(base_id) {
                base.register_subclass(class_id, uid);
            }
        }

        Ok(Value::Ref(class_id))
    }

    fn parse_slots(&self, v: &Value) -> RunResult<Vec<String>> {
        if let Some(single) = v.as_str(&self.heap, &self.interns) {
            return Ok(vec![single.to_owned()]);
        }
        let items = match v {
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::List(l) => l.as_vec().to_vec(),
                HeapData::Tuple(t) => t.as_vec().to_vec(),
                _ => return Err(ExcType::type_error("__slots__ must be a string or sequence of strings")),
            },
            _ => return Err(ExcType::type_error("__slots__ must be a string or sequence of strings")),
        };
        let mut slots = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str(&self.heap, &self.interns) {
                Some(s) => slots.push(s.to_owned()),
                None => return Err(ExcType::type_error("__slots__ items must be strings")),
            }
        }
        Ok(slots)
    }
}
