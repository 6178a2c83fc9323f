//! Builtin type descriptors.
//!
//! `Type` is the tag-level descriptor for values whose type is known to the
//! runtime itself. User-defined classes live on the heap as `ClassObject`s;
//! when a builtin type participates in inheritance or attribute lookup it is
//! materialized once per heap as an immutable `ClassObject` wrapper (see
//! `Heap::builtin_class_id`), so MRO walks are uniform.

use std::fmt;

use crate::exception_private::ExcType;

/// The builtin types of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Type {
    /// The metaclass of every builtin type and the default metaclass of
    /// user-defined classes.
    Type,
    /// The root of the type hierarchy.
    Object,
    NoneType,
    NotImplementedType,
    Ellipsis,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Tuple,
    Dict,
    Slice,
    Module,
    Function,
    BuiltinFunction,
    /// A bound method pairing.
    Method,
    Property,
    StaticMethod,
    ClassMethod,
    /// A `__slots__` member descriptor.
    MemberDescriptor,
    /// Read-only view of a class namespace.
    DictProxy,
    /// Tag for instances of user-defined classes; the real descriptor is
    /// the instance's `ClassObject`.
    Instance,
    /// A builtin exception type.
    Exception(ExcType),
}

impl Type {
    /// The Python name of the type.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Object => "object",
            Self::NoneType => "NoneType",
            Self::NotImplementedType => "NotImplementedType",
            Self::Ellipsis => "ellipsis",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Slice => "slice",
            Self::Module => "module",
            Self::Function => "function",
            Self::BuiltinFunction => "builtin_function_or_method",
            Self::Method => "instancemethod",
            Self::Property => "property",
            Self::StaticMethod => "staticmethod",
            Self::ClassMethod => "classmethod",
            Self::MemberDescriptor => "member_descriptor",
            Self::DictProxy => "dictproxy",
            Self::Instance => "instance",
            Self::Exception(exc) => exc.into(),
        }
    }

    /// The direct base type, `None` only for `object`.
    #[must_use]
    pub(crate) fn builtin_base(self) -> Option<Self> {
        match self {
            Self::Object => None,
            Self::Bool => Some(Self::Int),
            Self::Exception(exc) => Some(exc.base().map_or(Self::Object, Self::Exception)),
            _ => Some(Self::Object),
        }
    }

    /// Whether `self` is `other` or a transitive builtin subtype of it.
    #[must_use]
    pub fn is_subtype_of(self, other: Self) -> bool {
        let mut current = self;
        loop {
            if current == other {
                return true;
            }
            // exception hierarchy is wider than the base chain alone
            if let (Self::Exception(a), Self::Exception(b)) = (current, other) {
                return a.is_subclass_of(b);
            }
            match current.builtin_base() {
                Some(base) => current = base,
                None => return false,
            }
        }
    }

    /// Whether user classes may list this type as a base.
    ///
    /// `object`, `type` (metaclasses) and the exception types are
    /// acceptable; the remaining builtins have payload layouts a heap
    /// class cannot extend.
    #[must_use]
    pub(crate) fn is_acceptable_base(self) -> bool {
        matches!(self, Self::Object | Self::Type | Self::Exception(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_a_subtype_of_int() {
        assert!(Type::Bool.is_subtype_of(Type::Int));
        assert!(Type::Bool.is_subtype_of(Type::Object));
        assert!(!Type::Int.is_subtype_of(Type::Bool));
    }

    #[test]
    fn exception_subtyping_follows_the_hierarchy() {
        let key_error = Type::Exception(ExcType::KeyError);
        let lookup_error = Type::Exception(ExcType::LookupError);
        assert!(key_error.is_subtype_of(lookup_error));
        assert!(key_error.is_subtype_of(Type::Object));
        assert!(!lookup_error.is_subtype_of(key_error));
    }

    #[test]
    fn only_object_and_exceptions_are_acceptable_bases() {
        assert!(Type::Object.is_acceptable_base());
        assert!(Type::Exception(ExcType::ValueError).is_acceptable_base());
        assert!(!Type::Int.is_acceptable_base());
        assert!(!Type::Type.is_acceptable_base());
    }
}
