//! Attribute resolution.
//!
//! Implements the full descriptor-cooperating lookup order:
//!
//! * data descriptors found on the type win over the instance dict,
//! * the instance dict wins over non-data descriptors,
//! * non-data descriptors (functions included) bind on retrieval,
//! * `__getattribute__`/`__getattr__`/`__setattr__`/`__delattr__`
//!   overrides defined by user classes intercept the default machinery,
//! * class-object targets resolve through the metaclass.
//!
//! The MRO order is the only tie-break: the first hit wins.

use crate::{
    args::ArgValues,
    builtins::Builtins,
    exception_private::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, StringId},
    resource::ResourceTracker,
    runtime::Runtime,
    types::{BoundMethod, Dict, MappingProxy},
    value::Value,
};

/// Descriptor classification for the retrieval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DescrKind {
    /// Not a descriptor: the found value is returned as-is.
    NotDescriptor,
    /// Defines `__get__` only: loses to the instance dict.
    NonData,
    /// Defines `__get__` and (`__set__` or `__delete__`): wins over the
    /// instance dict.
    Data,
}

/// What kind of heap object an attribute target is.
enum TargetKind {
    Instance(HeapId),
    Class(HeapId),
    Module(HeapId),
    Other,
}

impl<T: ResourceTracker> Runtime<T> {
    fn target_kind(&self, obj: &Value) -> TargetKind {
        if let Value::Ref(id) = obj {
            match self.heap.get(*id) {
                HeapData::Instance(_) => TargetKind::Instance(*id),
                HeapData::ClassObject(_) => TargetKind::Class(*id),
                HeapData::Module(_) => TargetKind::Module(*id),
                _ => TargetKind::Other,
            }
        } else {
            TargetKind::Other
        }
    }

    // ------------------------------------------------------------------
    // getattr
    // ------------------------------------------------------------------

    /// `getattr(obj, name)`.
    pub fn getattr(&mut self, obj: Value, name: &str) -> RunResult<Value> {
        let name_id = self.interns.intern(name);
        self.getattr_id(obj, name_id)
    }

    /// Three-argument `getattr`: an `AttributeError` reads as absence.
    pub fn getattr_with_default(&mut self, obj: Value, name: &str, default: Value) -> RunResult<Value> {
        match self.getattr(obj, name) {
            Ok(v) => Ok(v),
            Err(err) if err.is_attribute_error() => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// `hasattr(obj, name)`.
    pub fn hasattr(&mut self, obj: Value, name: &str) -> RunResult<bool> {
        match self.getattr(obj, name) {
            Ok(_) => Ok(true),
            Err(err) if err.is_attribute_error() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn getattr_id(&mut self, obj: Value, name_id: StringId) -> RunResult<Value> {
        // builtin type values resolve like their wrapper classes
        if matches!(obj, Value::Builtin(Builtins::Type(_) | Builtins::ExcType(_))) {
            let cls_id = self.as_class_id(&obj)?.expect("builtin type values are classes");
            return self.class_getattr(obj, cls_id, name_id);
        }
        match self.target_kind(&obj) {
            TargetKind::Instance(id) => self.instance_getattr(obj, id, name_id),
            TargetKind::Class(id) => self.class_getattr(obj, id, name_id),
            TargetKind::Module(id) => self.module_getattr(id, name_id),
            TargetKind::Other => self.builtin_value_getattr(obj, name_id),
        }
    }

    fn instance_getattr(&mut self, obj: Value, inst_id: HeapId, name_id: StringId) -> RunResult<Value> {
        let class_id = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.class_id(),
            _ => return Err(crate::exception_private::RunError::internal("instance target changed shape")),
        };

        // user __getattribute__ replaces the default algorithm wholesale;
        // an AttributeError it raises falls through to __getattr__
        if let Some(getattribute) = self.heap_dunder_value(class_id, StaticStrings::DunderGetattribute)? {
            let result = self.call_dunder_bound(obj, getattribute, ArgValues::One(Value::InternString(name_id)));
            return match result {
                Err(err) if err.is_attribute_error() => {
                    if let Some(getattr) = self.heap_dunder_value(class_id, StaticStrings::DunderGetattr)? {
                        self.call_dunder_bound(obj, getattr, ArgValues::One(Value::InternString(name_id)))
                    } else {
                        Err(err)
                    }
                }
                other => other,
            };
        }

        self.generic_instance_getattr(obj, inst_id, class_id, name_id)
    }

    fn generic_instance_getattr(
        &mut self,
        obj: Value,
        inst_id: HeapId,
        class_id: HeapId,
        name_id: StringId,
    ) -> RunResult<Value> {
        let name = self.interns.get_str(name_id).to_owned();

        if name_id == StaticStrings::DunderClass {
            return Ok(self.class_value(class_id));
        }
        if name_id == StaticStrings::DunderDict {
            return self.instance_dict_value(inst_id, class_id, &name);
        }

        // 1-2. first hit along the type's MRO
        let found = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };

        // 3. data descriptors win outright
        if let Some((attr, _owner)) = found {
            if self.descriptor_kind(&attr)? == DescrKind::Data {
                let objtype = self.class_value(class_id);
                return self.descr_get(attr, Some(obj), objtype);
            }
        }

        // 4. instance dict
        if let Some(value) = self.instance_dict_get(inst_id, &name) {
            return Ok(value);
        }

        // 5-6. non-data descriptors bind; plain values return as-is
        if let Some((attr, _owner)) = found {
            let objtype = self.class_value(class_id);
            return self.descr_get(attr, Some(obj), objtype);
        }

        // 7. __getattr__ has the last word
        if let Some(getattr) = self.heap_dunder_value(class_id, StaticStrings::DunderGetattr)? {
            return self.call_dunder_bound(obj, getattr, ArgValues::One(Value::InternString(name_id)));
        }

        // 8. truly absent
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::attribute_error(type_name, &name))
    }

    fn class_getattr(&mut self, cls_val: Value, cls_id: HeapId, name_id: StringId) -> RunResult<Value> {
        let name = self.interns.get_str(name_id).to_owned();

        // introspection attributes come first; they are not namespace entries
        if name_id == StaticStrings::DunderName {
            let name_id = match self.heap.get(cls_id) {
                HeapData::ClassObject(cls) => cls.name_id(),
                _ => return Err(crate::exception_private::RunError::internal("class target changed shape")),
            };
            return Ok(Value::InternString(name_id));
        }
        if name_id == StaticStrings::DunderMro {
            let mro = match self.heap.get(cls_id) {
                HeapData::ClassObject(cls) => cls.mro().to_vec(),
                _ => Vec::new(),
            };
            let values: Vec<Value> = mro.iter().map(|&id| self.class_value(id)).collect();
            return self.alloc_tuple(values);
        }
        if name_id == StaticStrings::DunderBases {
            let bases = match self.heap.get(cls_id) {
                HeapData::ClassObject(cls) => cls.bases().to_vec(),
                _ => Vec::new(),
            };
            let values: Vec<Value> = bases.iter().map(|&id| self.class_value(id)).collect();
            return self.alloc_tuple(values);
        }
        if name_id == StaticStrings::DunderDict {
            let id = self.heap.allocate(HeapData::MappingProxy(MappingProxy::new(cls_id)))?;
            return Ok(Value::Ref(id));
        }
        if name_id == StaticStrings::DunderClass {
            let metaclass = match self.heap.get(cls_id) {
                HeapData::ClassObject(cls) => cls.metaclass(),
                _ => Value::None,
            };
            return Ok(metaclass);
        }
        if name_id == StaticStrings::DunderDoc {
            // docstrings belong to the compiler layer; every class answers
            let doc = match self.heap.get(cls_id) {
                HeapData::ClassObject(cls) => cls.namespace().get_by_str(
                    StaticStrings::DunderDoc.as_str(),
                    &self.heap,
                    &self.interns,
                ),
                _ => None,
            };
            return Ok(doc.unwrap_or(Value::None));
        }

        let meta_id = self.class_id_of(&cls_val)?;

        // user metaclass __getattribute__ intercepts class lookups too
        if let Some(getattribute) = self.heap_dunder_value(meta_id, StaticStrings::DunderGetattribute)? {
            let result = self.call_dunder_bound(cls_val, getattribute, ArgValues::One(Value::InternString(name_id)));
            return match result {
                Err(err) if err.is_attribute_error() => {
                    if let Some(getattr) = self.heap_dunder_value(meta_id, StaticStrings::DunderGetattr)? {
                        self.call_dunder_bound(cls_val, getattr, ArgValues::One(Value::InternString(name_id)))
                    } else {
                        Err(err)
                    }
                }
                other => other,
            };
        }

        // metaclass data descriptors win over the class's own namespace
        let meta_found = match self.heap.get(meta_id) {
            HeapData::ClassObject(meta) => meta.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };
        if let Some((meta_attr, _)) = meta_found {
            if self.descriptor_kind(&meta_attr)? == DescrKind::Data {
                let meta_value = self.class_value(meta_id);
                return self.descr_get(meta_attr, Some(cls_val), meta_value);
            }
        }

        // the class's own MRO, bound class-style (no instance)
        let own_found = match self.heap.get(cls_id) {
            HeapData::ClassObject(cls) => cls.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };
        if let Some((attr, _owner)) = own_found {
            return self.descr_get(attr, None, cls_val);
        }

        // metaclass non-data descriptors and plain values
        if let Some((meta_attr, _)) = meta_found {
            let meta_value = self.class_value(meta_id);
            return self.descr_get(meta_attr, Some(cls_val), meta_value);
        }

        // metaclass __getattr__ fallback
        if let Some(getattr) = self.heap_dunder_value(meta_id, StaticStrings::DunderGetattr)? {
            return self.call_dunder_bound(cls_val, getattr, ArgValues::One(Value::InternString(name_id)));
        }

        let class_name = match self.heap.get(cls_id) {
            HeapData::ClassObject(cls) => cls.name(&self.interns).to_owned(),
            _ => "?".to_owned(),
        };
        Err(ExcType::attribute_error_type(&class_name, &name))
    }

    fn module_getattr(&mut self, module_id: HeapId, name_id: StringId) -> RunResult<Value> {
        let name = self.interns.get_str(name_id).to_owned();
        let (value, module_name) = match self.heap.get(module_id) {
            HeapData::Module(module) => (
                module.dict().get_by_str(&name, &self.heap, &self.interns),
                module.name(),
            ),
            _ => return Err(crate::exception_private::RunError::internal("module target changed shape")),
        };
        match value {
            Some(v) => Ok(v),
            None => {
                let module_name = self.interns.get_str(module_name).to_owned();
                Err(ExcType::attribute_error_msg(format!(
                    "module '{module_name}' has no attribute '{name}'"
                )))
            }
        }
    }

    fn builtin_value_getattr(&mut self, obj: Value, name_id: StringId) -> RunResult<Value> {
        if name_id == StaticStrings::DunderClass {
            return self.type_of(obj);
        }
        if name_id == StaticStrings::DunderName {
            match obj {
                Value::DefFunction(fid) => return Ok(Value::InternString(self.functions[fid.index()].name)),
                Value::HostFunction(hid) => return Ok(Value::InternString(self.host_functions[hid.index()].name)),
                Value::Builtin(b) => {
                    let name = b.name();
                    let id = self.interns.intern(name);
                    return Ok(Value::InternString(id));
                }
                _ => {}
            }
        }
        // exception payloads expose their args and chaining links
        if let Value::Ref(id) = obj
            && matches!(self.heap.get(id), HeapData::Exception(_))
        {
            if name_id == StaticStrings::Args {
                let arg = match self.heap.get(id) {
                    HeapData::Exception(exc) => exc.arg().map(str::to_owned),
                    _ => None,
                };
                let values = match arg {
                    Some(s) => vec![self.alloc_str(&s)?],
                    None => vec![],
                };
                return self.alloc_tuple(values);
            }
            if name_id == StaticStrings::DunderCause || name_id == StaticStrings::DunderContext {
                let linked = match self.heap.get(id) {
                    HeapData::Exception(exc) => {
                        if name_id == StaticStrings::DunderCause {
                            exc.cause().cloned()
                        } else {
                            exc.context().cloned()
                        }
                    }
                    _ => None,
                };
                return match linked {
                    Some(exc) => {
                        let linked_id = self.heap.allocate(HeapData::Exception(exc))?;
                        Ok(Value::Ref(linked_id))
                    }
                    None => Ok(Value::None),
                };
            }
            if name_id == StaticStrings::DunderSuppressContext {
                let suppress = match self.heap.get(id) {
                    HeapData::Exception(exc) => exc.suppress_context(),
                    _ => false,
                };
                return Ok(Value::Bool(suppress));
            }
        }
        let name = self.interns.get_str(name_id).to_owned();
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::attribute_error(type_name, &name))
    }

    // ------------------------------------------------------------------
    // setattr / delattr
    // ------------------------------------------------------------------

    /// `setattr(obj, name, value)`.
    pub fn setattr(&mut self, obj: Value, name: &str, value: Value) -> RunResult<()> {
        let name_id = self.interns.intern(name);
        self.setattr_id(obj, name_id, value)
    }

    pub(crate) fn setattr_id(&mut self, obj: Value, name_id: StringId, value: Value) -> RunResult<()> {
        if matches!(obj, Value::Builtin(Builtins::Type(_) | Builtins::ExcType(_))) {
            let cls_id = self.as_class_id(&obj)?.expect("builtin type values are classes");
            return self.class_setattr(cls_id, name_id, value);
        }
        match self.target_kind(&obj) {
            TargetKind::Instance(id) => self.instance_setattr(obj, id, name_id, value),
            TargetKind::Class(id) => self.class_setattr(id, name_id, value),
            TargetKind::Module(id) => {
                self.heap.with_entry_mut(id, |heap, data| match data {
                    HeapData::Module(module) => {
                        module
                            .dict_mut()
                            .set(Value::InternString(name_id), value, heap, &self.interns)?;
                        Ok(())
                    }
                    _ => Err(crate::exception_private::RunError::internal("module target changed shape")),
                })
            }
            TargetKind::Other => {
                let name = self.interns.get_str(name_id).to_owned();
                let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::attribute_error(type_name, &name))
            }
        }
    }

    fn instance_setattr(&mut self, obj: Value, inst_id: HeapId, name_id: StringId, value: Value) -> RunResult<()> {
        let class_id = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.class_id(),
            _ => return Err(crate::exception_private::RunError::internal("instance target changed shape")),
        };

        if name_id == StaticStrings::DunderClass {
            return self.reassign_class(inst_id, class_id, value);
        }
        if name_id == StaticStrings::DunderDict {
            let Value::Ref(dict_id) = value else {
                return Err(ExcType::type_error("__dict__ must be set to a dictionary"));
            };
            if !matches!(self.heap.get(dict_id), HeapData::Dict(_)) {
                return Err(ExcType::type_error("__dict__ must be set to a dictionary"));
            }
            match self.heap.get_mut(inst_id) {
                HeapData::Instance(inst) => inst.set_attrs_id(Some(dict_id)),
                _ => unreachable!("checked above"),
            }
            return Ok(());
        }

        // user __setattr__ intercepts everything
        if let Some(setattr) = self.heap_dunder_value(class_id, StaticStrings::DunderSetattr)? {
            self.call_dunder_bound(obj, setattr, ArgValues::Two(Value::InternString(name_id), value))?;
            return Ok(());
        }

        let name = self.interns.get_str(name_id).to_owned();

        // data descriptors with a set handler win
        let found = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };
        if let Some((attr, _owner)) = found
            && self.try_descr_set(attr, obj, value)?
        {
            return Ok(());
        }

        // otherwise the instance dict
        let has_dict = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.instance_has_dict(),
            _ => true,
        };
        if !has_dict {
            let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
            return Err(ExcType::attribute_error(type_name, &name));
        }
        let attrs_id = self.ensure_instance_dict(inst_id)?;
        self.heap.with_entry_mut(attrs_id, |heap, data| match data {
            HeapData::Dict(dict) => {
                dict.set(Value::InternString(name_id), value, heap, &self.interns)?;
                Ok(())
            }
            _ => Err(crate::exception_private::RunError::internal("instance dict changed shape")),
        })
    }

    fn class_setattr(&mut self, cls_id: HeapId, name_id: StringId, value: Value) -> RunResult<()> {
        let (immutable, class_name) = match self.heap.get(cls_id) {
            HeapData::ClassObject(cls) => (cls.is_immutable(), cls.name(&self.interns).to_owned()),
            _ => return Err(crate::exception_private::RunError::internal("class target changed shape")),
        };
        if immutable {
            return Err(ExcType::type_error(format!(
                "can't set attributes of built-in/extension type '{class_name}'"
            )));
        }

        // metaclass data descriptors intercept class attribute stores
        let cls_val = Value::Ref(cls_id);
        let meta_id = self.class_id_of(&cls_val)?;
        let name = self.interns.get_str(name_id).to_owned();
        let meta_found = match self.heap.get(meta_id) {
            HeapData::ClassObject(meta) => meta.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };
        if let Some((meta_attr, _)) = meta_found
            && self.try_descr_set(meta_attr, cls_val, value)?
        {
            return Ok(());
        }

        self.heap.with_entry_mut(cls_id, |heap, data| match data {
            HeapData::ClassObject(cls) => {
                cls.namespace_mut()
                    .set(Value::InternString(name_id), value, heap, &self.interns)?;
                Ok(())
            }
            _ => Err(crate::exception_private::RunError::internal("class target changed shape")),
        })?;
        // reassigning a dunder invalidates the slot here and in every
        // subclass; version bumps ride along
        self.invalidate_class_attr(cls_id, name_id);
        Ok(())
    }

    /// `delattr(obj, name)`.
    pub fn delattr(&mut self, obj: Value, name: &str) -> RunResult<()> {
        let name_id = self.interns.intern(name);
        self.delattr_id(obj, name_id)
    }

    pub(crate) fn delattr_id(&mut self, obj: Value, name_id: StringId) -> RunResult<()> {
        if matches!(obj, Value::Builtin(Builtins::Type(_) | Builtins::ExcType(_))) {
            let cls_id = self.as_class_id(&obj)?.expect("builtin type values are classes");
            return self.class_delattr(cls_id, name_id);
        }
        match self.target_kind(&obj) {
            TargetKind::Instance(id) => self.instance_delattr(obj, id, name_id),
            TargetKind::Class(id) => self.class_delattr(id, name_id),
            TargetKind::Module(id) => {
                let name = self.interns.get_str(name_id).to_owned();
                let removed = self.heap.with_entry_mut(id, |heap, data| match data {
                    HeapData::Module(module) => module.dict_mut().remove_by_str(&name, heap, &self.interns),
                    _ => None,
                });
                match removed {
                    Some(_) => Ok(()),
                    None => Err(ExcType::attribute_error("module", &name)),
                }
            }
            TargetKind::Other => {
                let name = self.interns.get_str(name_id).to_owned();
                let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::attribute_error(type_name, &name))
            }
        }
    }

    fn instance_delattr(&mut self, obj: Value, inst_id: HeapId, name_id: StringId) -> RunResult<()> {
        let class_id = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.class_id(),
            _ => return Err(crate::exception_private::RunError::internal("instance target changed shape")),
        };

        if let Some(delattr) = self.heap_dunder_value(class_id, StaticStrings::DunderDelattr)? {
            self.call_dunder_bound(obj, delattr, ArgValues::One(Value::InternString(name_id)))?;
            return Ok(());
        }

        let name = self.interns.get_str(name_id).to_owned();

        let found = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.mro_lookup(&name, &self.heap, &self.interns),
            _ => None,
        };
        if let Some((attr, _owner)) = found
            && self.try_descr_delete(attr, obj)?
        {
            return Ok(());
        }

        let attrs_id = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.attrs_id(),
            _ => None,
        };
        if let Some(attrs_id) = attrs_id {
            let removed = self.heap.with_entry_mut(attrs_id, |heap, data| match data {
                HeapData::Dict(dict) => dict.remove_by_str(&name, heap, &self.interns),
                _ => None,
            });
            if removed.is_some() {
                return Ok(());
            }
        }
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::attribute_error(type_name, &name))
    }

    fn class_delattr(&mut self, cls_id: HeapId, name_id: StringId) -> RunResult<()> {
        let (immutable, class_name) = match self.heap.get(cls_id) {
            HeapData::ClassObject(cls) => (cls.is_immutable(), cls.name(&self.interns).to_owned()),
            _ => return Err(crate::exception_private::RunError::internal("class target changed shape")),
        };
        if immutable {
            return Err(ExcType::type_error(format!(
                "can't set attributes of built-in/extension type '{class_name}'"
            )));
        }
        let name = self.interns.get_str(name_id).to_owned();
        let removed = self.heap.with_entry_mut(cls_id, |heap, data| match data {
            HeapData::ClassObject(cls) => cls.namespace_mut().remove_by_str(&name, heap, &self.interns),
            _ => None,
        });
        match removed {
            Some(_) => {
                self.invalidate_class_attr(cls_id, name_id);
                Ok(())
            }
            None => Err(ExcType::attribute_error_type(&class_name, &name)),
        }
    }

    // ------------------------------------------------------------------
    // instance dict plumbing
    // ------------------------------------------------------------------

    fn instance_dict_get(&mut self, inst_id: HeapId, name: &str) -> Option<Value> {
        let attrs_id = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.attrs_id()?,
            _ => return None,
        };
        match self.heap.get(attrs_id) {
            HeapData::Dict(dict) => dict.get_by_str(name, &self.heap, &self.interns),
            _ => None,
        }
    }

    /// Returns the instance dict id, allocating it on first touch.
    pub(crate) fn ensure_instance_dict(&mut self, inst_id: HeapId) -> RunResult<HeapId> {
        let existing = match self.heap.get(inst_id) {
            HeapData::Instance(inst) => inst.attrs_id(),
            _ => None,
        };
        if let Some(id) = existing {
            return Ok(id);
        }
        let dict_id = self.heap.allocate(HeapData::Dict(Dict::new()))?;
        match self.heap.get_mut(inst_id) {
            HeapData::Instance(inst) => inst.set_attrs_id(Some(dict_id)),
            _ => return Err(crate::exception_private::RunError::internal("instance target changed shape")),
        }
        Ok(dict_id)
    }

    fn instance_dict_value(&mut self, inst_id: HeapId, class_id: HeapId, name: &str) -> RunResult<Value> {
        let has_dict = match self.heap.get(class_id) {
            HeapData::ClassObject(cls) => cls.instance_has_dict(),
            _ => true,
        };
        if !has_dict {
            let type_name = Value::Ref(inst_id).type_name(&self.heap, &self.interns).into_owned();
            return Err(ExcType::attribute_error(type_name, name));
        }
        let dict_id = self.ensure_instance_dict(inst_id)?;
        Ok(Value::Ref(dict_id))
    }

    fn reassign_class(&mut self, inst_id: HeapId, old_class_id: HeapId, value: Value) -> RunResult<()> {
        let Some(new_class_id) = self.as_class_id(&value)? else {
            return Err(ExcType::type_error("__class__ must be set to a class"));
        };
        // layout compatibility keeps __slots__ storage coherent
        let compatible = match (self.heap.get(old_class_id), self.heap.get(new_class_id)) {
            (HeapData::ClassObject(old), HeapData::ClassObject(new)) => {
                old.builtin().is_none()
                    && new.builtin().is_none()
                    && old.slot_layout() == new.slot_layout()
                    && old.instance_has_dict() == new.instance_has_dict()
                    && old.instance_has_weakref() == new.instance_has_weakref()
            }
            _ => false,
        };
        if !compatible {
            let old_name = match self.heap.get(old_class_id) {
                HeapData::ClassObject(cls) => cls.name(&self.interns).to_owned(),
                _ => "?".to_owned(),
            };
            let new_name = match self.heap.get(new_class_id) {
                HeapData::ClassObject(cls) => cls.name(&self.interns).to_owned(),
                _ => "?".to_owned(),
            };
            return Err(ExcType::type_error(format!(
                "__class__ assignment: '{new_name}' object layout differs from '{old_name}'"
            )));
        }
        match self.heap.get_mut(inst_id) {
            HeapData::Instance(inst) => inst.set_class_id(new_class_id),
            _ => return Err(crate::exception_private::RunError::internal("instance target changed shape")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // descriptor protocol
    // ------------------------------------------------------------------

    /// Classifies a value found on a type for the retrieval path.
    pub(crate) fn descriptor_kind(&mut self, v: &Value) -> RunResult<DescrKind> {
        match v {
            Value::DefFunction(_) | Value::HostFunction(_) | Value::Builtin(Builtins::Function(_)) => {
                Ok(DescrKind::NonData)
            }
            Value::Ref(id) => {
                let instance_class = match self.heap.get(*id) {
                    HeapData::Property(_) | HeapData::MemberDescriptor(_) => return Ok(DescrKind::Data),
                    HeapData::StaticMethod(_) | HeapData::ClassMethod(_) => return Ok(DescrKind::NonData),
                    HeapData::Instance(inst) => inst.class_id(),
                    _ => return Ok(DescrKind::NotDescriptor),
                };
                let has_get = self.dunder_origin(instance_class, StaticStrings::DunderDescGet)?.is_some();
                if !has_get {
                    return Ok(DescrKind::NotDescriptor);
                }
                let has_set = self.dunder_origin(instance_class, StaticStrings::DunderDescSet)?.is_some();
                let has_delete = self
                    .dunder_origin(instance_class, StaticStrings::DunderDescDelete)?
                    .is_some();
                if has_set || has_delete {
                    Ok(DescrKind::Data)
                } else {
                    Ok(DescrKind::NonData)
                }
            }
            _ => Ok(DescrKind::NotDescriptor),
        }
    }

    /// `descr.__get__(instance, objtype)`.
    ///
    /// With `instance = None` this is the class-targeted binding: functions
    /// and data descriptors return themselves, `classmethod` still binds
    /// the class.
    pub(crate) fn descr_get(&mut self, descr: Value, instance: Option<Value>, objtype: Value) -> RunResult<Value> {
        match descr {
            Value::DefFunction(_) | Value::HostFunction(_) | Value::Builtin(Builtins::Function(_)) => match instance {
                Some(inst) => {
                    let id = self.heap.allocate(HeapData::BoundMethod(BoundMethod::new(descr, inst)))?;
                    Ok(Value::Ref(id))
                }
                None => Ok(descr),
            },
            Value::Ref(id) => {
                enum Payload {
                    Property { fget: Option<Value> },
                    Static(Value),
                    Class(Value),
                    Member { name: String, index: usize },
                    UserInstance(HeapId),
                    Plain,
                }
                let payload = match self.heap.get(id) {
                    HeapData::Property(p) => Payload::Property { fget: p.fget() },
                    HeapData::StaticMethod(sm) => Payload::Static(sm.func()),
                    HeapData::ClassMethod(cm) => Payload::Class(cm.func()),
                    HeapData::MemberDescriptor(m) => Payload::Member {
                        name: m.name().to_owned(),
                        index: m.index(),
                    },
                    HeapData::Instance(inst) => Payload::UserInstance(inst.class_id()),
                    _ => Payload::Plain,
                };
                match payload {
                    Payload::Property { fget } => match instance {
                        None => Ok(descr),
                        Some(inst) => match fget {
                            Some(getter) => self.call(getter, ArgValues::One(inst)),
                            None => Err(ExcType::attribute_error_msg("unreadable attribute")),
                        },
                    },
                    Payload::Static(func) => Ok(func),
                    Payload::Class(func) => {
                        let id = self.heap.allocate(HeapData::BoundMethod(BoundMethod::new(func, objtype)))?;
                        Ok(Value::Ref(id))
                    }
                    Payload::Member { name, index } => match instance {
                        None => Ok(descr),
                        Some(inst) => {
                            let slot = match inst {
                                Value::Ref(iid) => match self.heap.get(iid) {
                                    HeapData::Instance(i) => i.slot_value(index),
                                    _ => None,
                                },
                                _ => None,
                            };
                            match slot {
                                Some(v) if !matches!(v, Value::Undefined) => Ok(v),
                                _ => {
                                    let type_name = inst.type_name(&self.heap, &self.interns).into_owned();
                                    Err(ExcType::attribute_error(type_name, &name))
                                }
                            }
                        }
                    },
                    Payload::UserInstance(descr_class) => {
                        if let Some((get_fn, _)) = self.dunder_value(descr_class, StaticStrings::DunderDescGet)? {
                            let inst_arg = instance.unwrap_or(Value::None);
                            self.call_dunder_bound(descr, get_fn, ArgValues::Two(inst_arg, objtype))
                        } else {
                            Ok(descr)
                        }
                    }
                    Payload::Plain => Ok(descr),
                }
            }
            _ => Ok(descr),
        }
    }

    /// Attempts `descr.__set__(instance, value)`. Returns whether the
    /// descriptor intercepted the store.
    fn try_descr_set(&mut self, descr: Value, instance: Value, value: Value) -> RunResult<bool> {
        let Value::Ref(id) = descr else { return Ok(false) };
        enum Payload {
            Property { fset: Option<Value> },
            Member { index: usize },
            UserInstance(HeapId),
            Plain,
        }
        let payload = match self.heap.get(id) {
            HeapData::Property(p) => Payload::Property { fset: p.fset() },
            HeapData::MemberDescriptor(m) => Payload::Member { index: m.index() },
            HeapData::Instance(inst) => Payload::UserInstance(inst.class_id()),
            _ => Payload::Plain,
        };
        match payload {
            Payload::Property { fset } => match fset {
                Some(setter) => {
                    self.call(setter, ArgValues::Two(instance, value))?;
                    Ok(true)
                }
                None => Err(ExcType::attribute_error_msg("can't set attribute")),
            },
            Payload::Member { index } => {
                if let Value::Ref(iid) = instance
                    && let HeapData::Instance(inst) = self.heap.get_mut(iid)
                {
                    inst.set_slot_value(index, value);
                    return Ok(true);
                }
                Ok(false)
            }
            Payload::UserInstance(descr_class) => {
                if let Some((set_fn, _)) = self.dunder_value(descr_class, StaticStrings::DunderDescSet)? {
                    self.call_dunder_bound(descr, set_fn, ArgValues::Two(instance, value))?;
                    return Ok(true);
                }
                // a __delete__-only data descriptor still blocks the store
                if self.dunder_origin(descr_class, StaticStrings::DunderDescDelete)?.is_some()
                    && self.dunder_origin(descr_class, StaticStrings::DunderDescGet)?.is_some()
                {
                    return Err(ExcType::attribute_error_msg("can't set attribute"));
                }
                Ok(false)
            }
            Payload::Plain => Ok(false),
        }
    }

    /// Attempts `descr.__delete__(instance)`. Returns whether the
    /// descriptor intercepted the deletion.
    fn try_descr_delete(&mut self, descr: Value, instance: Value) -> RunResult<bool> {
        let Value::Ref(id) = descr else { return Ok(false) };
        enum Payload {
            Property { fdel: Option<Value> },
            Member { name: String, index: usize },
            UserInstance(HeapId),
            Plain,
        }
        let payload = match self.heap.get(id) {
            HeapData::Property(p) => Payload::Property { fdel: p.fdel() },
            HeapData::MemberDescriptor(m) => Payload::Member {
                name: m.name().to_owned(),
                index: m.index(),
            },
            HeapData::Instance(inst) => Payload::UserInstance(inst.class_id()),
            _ => Payload::Plain,
        };
        match payload {
            Payload::Property { fdel } => match fdel {
                Some(deleter) => {
                    self.call(deleter, ArgValues::One(instance))?;
                    Ok(true)
                }
                None => Err(ExcType::attribute_error_msg("can't delete attribute")),
            },
            Payload::Member { name, index } => {
                if let Value::Ref(iid) = instance {
                    let had_value = match self.heap.get(iid) {
                        HeapData::Instance(inst) => {
                            inst.slot_value(index).is_some_and(|v| !matches!(v, Value::Undefined))
                        }
                        _ => false,
                    };
                    if !had_value {
                        let type_name = instance.type_name(&self.heap, &self.interns).into_owned();
                        return Err(ExcType::attribute_error(type_name, &name));
                    }
                    if let HeapData::Instance(inst) = self.heap.get_mut(iid) {
                        inst.set_slot_value(index, Value::Undefined);
                    }
                    return Ok(true);
                }
                Ok(false)
            }
            Payload::UserInstance(descr_class) => {
                if let Some((del_fn, _)) = self.dunder_value(descr_class, StaticStrings::DunderDescDelete)? {
                    self.call_dunder_bound(descr, del_fn, ArgValues::One(instance))?;
                    return Ok(true);
                }
                Ok(false)
            }
            Payload::Plain => Ok(false),
        }
    }
}
