//! Builtin callables.
//!
//! The builtin surface the core's opcodes hit: type constructors, exception
//! types and the protocol-level builtin functions (`len`, `hash`,
//! `getattr`, `isinstance`, ...). Dispatch lives in `runtime::call`; this
//! module only defines the identities.

use strum::{Display, EnumString, IntoStaticStr};

use crate::{exception_private::ExcType, types::Type};

/// A builtin callable or type value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Builtins {
    /// A builtin type used as a value (e.g. `int`, `type`, `object`).
    Type(Type),
    /// A builtin exception type used as a value (e.g. `ValueError`).
    ExcType(ExcType),
    /// A builtin function (e.g. `len`, `getattr`).
    Function(BuiltinFunction),
}

impl Builtins {
    /// The tag-level type of this value.
    #[must_use]
    pub fn py_type(self) -> Type {
        match self {
            Self::Type(_) | Self::ExcType(_) => Type::Type,
            Self::Function(_) => Type::BuiltinFunction,
        }
    }

    /// The display name of the builtin.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Type(t) => t.name(),
            Self::ExcType(e) => e.into(),
            Self::Function(f) => f.into(),
        }
    }
}

/// Builtin functions implemented by the core.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinFunction {
    Len,
    Hash,
    Repr,
    Id,
    #[strum(serialize = "isinstance")]
    IsInstance,
    #[strum(serialize = "issubclass")]
    IsSubclass,
    #[strum(serialize = "getattr")]
    GetAttr,
    #[strum(serialize = "setattr")]
    SetAttr,
    #[strum(serialize = "delattr")]
    DelAttr,
    #[strum(serialize = "hasattr")]
    HasAttr,
    Callable,
    /// `object.__new__`: allocates a bare instance of the requested class.
    #[strum(serialize = "object.__new__")]
    ObjectNew,
    /// `object.__init__`: the default no-op initializer.
    #[strum(serialize = "object.__init__")]
    ObjectInit,
    /// `type.__new__`: creates a class from `(mcls, name, bases, namespace)`.
    #[strum(serialize = "type.__new__")]
    TypeNew,
}
