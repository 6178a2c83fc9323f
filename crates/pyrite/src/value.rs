//! The uniform value representation.
//!
//! Every value the runtime touches is a [`Value`]: either an immediate
//! (singletons, bools, machine ints, floats, interned strings, builtin and
//! registered callables, proxy handles) or a reference into the arena heap.
//! Immediates never allocate, which covers the small-integer range, the
//! booleans and the singletons by construction.
//!
//! `Value` is `Copy`: it is a handle, not an owner. Object lifetime is the
//! business of the embedding collector, which walks the heap through
//! `Heap::traverse`.

use std::borrow::Cow;

use crate::{
    builtins::Builtins,
    heap::{Heap, HeapData},
    intern::{FunctionId, HostFunctionId, Interns, StringId},
    proxy::ProxyId,
    resource::ResourceTracker,
    types::Type,
};

/// A runtime value: tagged immediate or heap reference.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// Unbound slot marker; never visible to user code.
    Undefined,
    /// The `Ellipsis` singleton.
    Ellipsis,
    /// The `None` singleton.
    None,
    /// The `NotImplemented` singleton.
    ///
    /// Returned by binary dunders to signal "try the other operand";
    /// distinct from raising, and consumed by the operation dispatcher.
    NotImplemented,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// An interned string. Content lives in the interner.
    InternString(StringId),
    /// A builtin type, exception type or function.
    Builtin(Builtins),
    /// A function registered with the runtime; its body is a host callback
    /// executed through the executor seam.
    DefFunction(FunctionId),
    /// A raw host thunk taking unbound arguments (interop bridge, method
    /// tables of foreign types).
    HostFunction(HostFunctionId),
    /// Opaque host-managed handle.
    Proxy(ProxyId),
    /// Reference to a heap-allocated object.
    Ref(crate::heap::HeapId),
}

impl Value {
    /// The tag-level type of the value.
    ///
    /// For user instances this is [`Type::Instance`]; the full descriptor is
    /// reached through `Runtime::type_of`.
    ///
    /// # Panics
    ///
    /// Panics on `Undefined`, which never escapes the runtime.
    #[must_use]
    pub fn py_type(&self, heap: &Heap<impl ResourceTracker>) -> Type {
        match self {
            Self::Undefined => panic!("cannot take the type of an undefined value"),
            Self::Ellipsis => Type::Ellipsis,
            Self::None => Type::NoneType,
            Self::NotImplemented => Type::NotImplementedType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::InternString(_) => Type::Str,
            Self::Builtin(b) => b.py_type(),
            Self::DefFunction(_) => Type::Function,
            Self::HostFunction(_) => Type::BuiltinFunction,
            Self::Proxy(_) => Type::Object,
            Self::Ref(id) => heap.get(*id).py_type(),
        }
    }

    /// Identity (`is`): tag equality for immediates, slot equality for refs.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None)
            | (Self::Ellipsis, Self::Ellipsis)
            | (Self::NotImplemented, Self::NotImplemented) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            // small ints behave like the interned-int cache of the
            // reference runtime: equal immediates are the same object
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::InternString(a), Self::InternString(b)) => a == b,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::DefFunction(a), Self::DefFunction(b)) => a == b,
            (Self::HostFunction(a), Self::HostFunction(b)) => a == b,
            (Self::Proxy(a), Self::Proxy(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }

    /// Whether this value is the `None` singleton.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The type name used in error messages.
    ///
    /// Instances report their class name, everything else the builtin name.
    #[must_use]
    pub(crate) fn type_name<'a>(&self, heap: &'a Heap<impl ResourceTracker>, interns: &'a Interns) -> Cow<'a, str> {
        if let Self::Ref(id) = self {
            match heap.get(*id) {
                HeapData::Instance(inst) => {
                    if let HeapData::ClassObject(cls) = heap.get(inst.class_id()) {
                        return Cow::Borrowed(cls.name(interns));
                    }
                }
                HeapData::ClassObject(_) => return Cow::Borrowed("type"),
                _ => {}
            }
        }
        Cow::Borrowed(self.py_type(heap).name())
    }

    /// Truthiness for builtin payloads; `None` when user dispatch
    /// (`__nonzero__`/`__len__`) is required.
    #[must_use]
    pub(crate) fn truthy_builtin(&self, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> Option<bool> {
        match self {
            Self::Undefined => None,
            Self::None => Some(false),
            Self::Ellipsis | Self::NotImplemented => Some(true),
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(f) => Some(*f != 0.0),
            Self::InternString(id) => Some(!interns.get_str(*id).is_empty()),
            Self::Builtin(_) | Self::DefFunction(_) | Self::HostFunction(_) | Self::Proxy(_) => Some(true),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => Some(s.byte_len() != 0),
                HeapData::Bytes(b) => Some(b.len() != 0),
                HeapData::List(l) => Some(l.len() != 0),
                HeapData::Tuple(t) => Some(t.len() != 0),
                HeapData::Dict(d) => Some(!d.is_empty()),
                HeapData::LongInt(li) => Some(!num_traits::Zero::is_zero(li.inner())),
                HeapData::Instance(_) => None,
                _ => Some(true),
            },
        }
    }

    /// Length for builtin payloads; `None` when `__len__` dispatch is
    /// required or the value has no length.
    #[must_use]
    pub(crate) fn len_builtin(&self, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> Option<usize> {
        match self {
            // count characters, not bytes
            Self::InternString(id) => Some(interns.get_str(*id).chars().count()),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => Some(s.char_len()),
                HeapData::Bytes(b) => Some(b.len()),
                HeapData::List(l) => Some(l.len()),
                HeapData::Tuple(t) => Some(t.len()),
                HeapData::Dict(d) => Some(d.len()),
                _ => None,
            },
            _ => None,
        }
    }

    /// String content, if this value is a string.
    #[must_use]
    pub(crate) fn as_str<'a>(&self, heap: &'a Heap<impl ResourceTracker>, interns: &'a Interns) -> Option<&'a str> {
        match self {
            Self::InternString(id) => Some(interns.get_str(*id)),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Formats a float the way Python repr does.
///
/// Shortest round-trip representation, always carrying a decimal point or
/// exponent so the result reads back as a float.
#[must_use]
pub(crate) fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_owned() } else { "-inf".to_owned() };
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format_finite(value).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn identity_matches_tag_and_payload() {
        assert!(Value::None.is_same(&Value::None));
        assert!(Value::Int(300).is_same(&Value::Int(300)));
        assert!(!Value::Int(1).is_same(&Value::Bool(true)));
        assert!(!Value::None.is_same(&Value::Ellipsis));
    }

    #[test]
    fn small_values_never_allocate() {
        let heap: Heap<NoLimitTracker> = Heap::new(NoLimitTracker);
        let before = heap.stats().live_objects;
        let values = [Value::Int(-5), Value::Int(256), Value::Bool(true), Value::None];
        for v in values {
            // type queries on immediates touch no heap slots
            let _ = v.py_type(&heap);
        }
        assert_eq!(heap.stats().live_objects, before);
    }

    #[test]
    fn float_repr_keeps_a_decimal_point() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(f64::NAN), "nan");
    }
}
