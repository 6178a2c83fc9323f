//! Builtin descriptor payloads.
//!
//! These are the descriptors the runtime itself creates: `property`,
//! `staticmethod`, `classmethod`, the member descriptors backing
//! `__slots__`, bound methods, and the read-only class-namespace proxy.
//! User-defined descriptors are ordinary instances whose class MRO defines
//! `__get__`/`__set__`/`__delete__`; classification for both kinds lives in
//! `runtime::attr`.

use crate::{heap::HeapId, value::Value};

/// A `property` object: a data descriptor built from accessor callables.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct Property {
    fget: Option<Value>,
    fset: Option<Value>,
    fdel: Option<Value>,
}

impl Property {
    #[must_use]
    pub fn new(fget: Option<Value>, fset: Option<Value>, fdel: Option<Value>) -> Self {
        Self { fget, fset, fdel }
    }

    #[must_use]
    pub fn fget(&self) -> Option<Value> {
        self.fget
    }

    #[must_use]
    pub fn fset(&self) -> Option<Value> {
        self.fset
    }

    #[must_use]
    pub fn fdel(&self) -> Option<Value> {
        self.fdel
    }
}

/// A `staticmethod` wrapper: retrieval returns the wrapped callable unbound.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct StaticMethod {
    func: Value,
}

impl StaticMethod {
    #[must_use]
    pub fn new(func: Value) -> Self {
        Self { func }
    }

    #[must_use]
    pub fn func(&self) -> Value {
        self.func
    }
}

/// A `classmethod` wrapper: retrieval binds the owning class.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct ClassMethod {
    func: Value,
}

impl ClassMethod {
    #[must_use]
    pub fn new(func: Value) -> Self {
        Self { func }
    }

    #[must_use]
    pub fn func(&self) -> Value {
        self.func
    }
}

/// A bound method: `(function, instance)` produced by attribute retrieval.
///
/// Calling it prepends the instance to the argument list.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct BoundMethod {
    func: Value,
    instance: Value,
}

impl BoundMethod {
    #[must_use]
    pub fn new(func: Value, instance: Value) -> Self {
        Self { func, instance }
    }

    #[must_use]
    pub fn func(&self) -> Value {
        self.func
    }

    #[must_use]
    pub fn instance(&self) -> Value {
        self.instance
    }
}

/// A member descriptor for one `__slots__` entry.
///
/// Data descriptor: reads and writes go to the instance's fixed slot
/// storage, and an unset slot reads as a missing attribute.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct MemberDescriptor {
    name: String,
    /// Index into `Instance::slot_values` of the owning layout.
    index: usize,
}

impl MemberDescriptor {
    #[must_use]
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Read-only live view of a class namespace (`cls.__dict__`).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct MappingProxy {
    class_id: HeapId,
}

impl MappingProxy {
    #[must_use]
    pub fn new(class_id: HeapId) -> Self {
        Self { class_id }
    }

    #[must_use]
    pub fn class_id(&self) -> HeapId {
        self.class_id
    }
}
