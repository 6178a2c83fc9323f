//! The foreign-type bridge.
//!
//! Values owned by a host type system appear inside the runtime as
//! ordinary instances of registered *foreign types*: immutable classes
//! whose method table entries are host thunks. `adapt` wraps an opaque
//! [`ProxyId`] as an instance of such a class; from that point attribute
//! lookup, operator dispatch and calls flow through the normal machinery
//! and bottom out in the registered thunks.

use crate::{
    exception_private::{ExcType, RunResult},
    function::HostFn,
    heap::HeapData,
    proxy::ProxyId,
    resource::ResourceTracker,
    runtime::Runtime,
    types::{ClassObject, Dict, Instance, Type},
    value::Value,
};

impl<T: ResourceTracker> Runtime<T> {
    /// Registers a foreign type: an immutable class whose namespace holds
    /// the given host thunks. Dunder names participate in operator
    /// dispatch exactly like user-defined methods.
    pub fn register_foreign_type(&mut self, name: &str, methods: &[(&str, HostFn<T>)]) -> RunResult<Value> {
        let object_id = self.heap.builtin_class_id(Type::Object, &mut self.interns)?;
        let type_wrapper = self.heap.builtin_class_id(Type::Type, &mut self.interns)?;

        let mut namespace = Dict::new();
        for &(method_name, body) in methods {
            let func = self.register_host_function(method_name, body);
            let method_id = self.interns.intern(method_name);
            namespace.insert_id(method_id, func, &self.interns);
        }

        let name_id = self.interns.intern(name);
        let uid = self.heap.next_class_uid();
        let metaclass = self.class_value(type_wrapper);
        let mut cls = ClassObject::new(name_id, uid, metaclass, namespace, vec![object_id]);
        cls.set_immutable();
        let class_id = self.heap.allocate(HeapData::ClassObject(cls))?;
        let mro = vec![class_id, object_id];
        match self.heap.get_mut(class_id) {
            HeapData::ClassObject(cls) => cls.set_mro(mro),
            _ => unreachable!("just allocated a class object"),
        }
        Ok(Value::Ref(class_id))
    }

    /// Adapts a host value into an instance of a registered foreign type.
    pub fn adapt(&mut self, proxy: ProxyId, foreign_type: Value) -> RunResult<Value> {
        let Some(class_id) = self.as_class_id(&foreign_type)? else {
            return Err(ExcType::type_error("adapt() requires a registered foreign type"));
        };
        let mut instance = Instance::new(class_id, None, 0);
        instance.set_proxy(proxy);
        let id = self.heap.allocate(HeapData::Instance(instance))?;
        Ok(Value::Ref(id))
    }

    /// The proxy handle an adapted instance carries, if any.
    pub fn proxy_of(&self, v: Value) -> Option<ProxyId> {
        match v {
            Value::Proxy(id) => Some(id),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Instance(inst) => inst.proxy(),
                _ => None,
            },
            _ => None,
        }
    }
}
