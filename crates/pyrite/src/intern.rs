//! String interning for identifiers and protocol names.
//!
//! Attribute and dunder lookups are by far the hottest string comparisons in
//! the runtime, so identifier strings are stored once in an interner and
//! referenced by [`StringId`]. Ids are laid out so the common cases never
//! touch the dynamic table:
//!
//! * 0 to 127 — single-character strings for the ASCII range
//! * 1000.. — the [`StaticStrings`] table of protocol names known at
//!   compile time
//! * `10_000..` — strings interned at runtime

use std::{str::FromStr, sync::LazyLock};

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the string interner's storage.
///
/// `u32` keeps `Value` small; four billion distinct identifiers is far more
/// than any embedding needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the `StringId` for a single ASCII character.
    #[must_use]
    pub(crate) fn from_ascii(byte: u8) -> Self {
        Self(u32::from(byte))
    }
}

/// Identifier for a function registered with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier for a host thunk registered with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HostFunctionId(pub(crate) u32);

impl HostFunctionId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// StringId offsets
const STATIC_STRING_ID_OFFSET: u32 = 1000;
const INTERN_STRING_ID_OFFSET: usize = 10_000;

/// Single-character strings for the ASCII range, built once on first access.
///
/// The leak is intentional and bounded (128 one-byte strings).
static ASCII_STRS: LazyLock<[&'static str; 128]> = LazyLock::new(|| {
    std::array::from_fn(|i| {
        let s = char::from(u8::try_from(i).expect("index out of u8 range")).to_string();
        &*Box::leak(s.into_boxed_str())
    })
});

/// Protocol and introspection names known at compile time.
///
/// These never hit the dynamic interner, so dunder dispatch compares plain
/// integers. The slot-cache keys in class objects are drawn from this table.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum StaticStrings {
    // ==========================
    // Descriptor protocol
    #[strum(serialize = "__get__")]
    DunderDescGet,
    #[strum(serialize = "__set__")]
    DunderDescSet,
    #[strum(serialize = "__delete__")]
    DunderDescDelete,

    // ==========================
    // Attribute access
    #[strum(serialize = "__getattr__")]
    DunderGetattr,
    #[strum(serialize = "__getattribute__")]
    DunderGetattribute,
    #[strum(serialize = "__setattr__")]
    DunderSetattr,
    #[strum(serialize = "__delattr__")]
    DunderDelattr,

    // ==========================
    // Construction and calls
    #[strum(serialize = "__new__")]
    DunderNew,
    #[strum(serialize = "__init__")]
    DunderInit,
    #[strum(serialize = "__call__")]
    DunderCall,
    #[strum(serialize = "__del__")]
    DunderDel,

    // ==========================
    // Conversion protocols
    #[strum(serialize = "__repr__")]
    DunderRepr,
    #[strum(serialize = "__str__")]
    DunderStr,
    #[strum(serialize = "__hash__")]
    DunderHash,
    #[strum(serialize = "__nonzero__")]
    DunderNonzero,
    #[strum(serialize = "__len__")]
    DunderLen,

    // ==========================
    // Rich comparisons
    #[strum(serialize = "__eq__")]
    DunderEq,
    #[strum(serialize = "__ne__")]
    DunderNe,
    #[strum(serialize = "__lt__")]
    DunderLt,
    #[strum(serialize = "__le__")]
    DunderLe,
    #[strum(serialize = "__gt__")]
    DunderGt,
    #[strum(serialize = "__ge__")]
    DunderGe,

    // ==========================
    // Binary operators (forward, reflected, in-place)
    #[strum(serialize = "__add__")]
    DunderAdd,
    #[strum(serialize = "__radd__")]
    DunderRadd,
    #[strum(serialize = "__iadd__")]
    DunderIadd,
    #[strum(serialize = "__sub__")]
    DunderSub,
    #[strum(serialize = "__rsub__")]
    DunderRsub,
    #[strum(serialize = "__isub__")]
    DunderIsub,
    #[strum(serialize = "__mul__")]
    DunderMul,
    #[strum(serialize = "__rmul__")]
    DunderRmul,
    #[strum(serialize = "__imul__")]
    DunderImul,
    #[strum(serialize = "__div__")]
    DunderDiv,
    #[strum(serialize = "__rdiv__")]
    DunderRdiv,
    #[strum(serialize = "__idiv__")]
    DunderIdiv,
    #[strum(serialize = "__truediv__")]
    DunderTruediv,
    #[strum(serialize = "__rtruediv__")]
    DunderRtruediv,
    #[strum(serialize = "__itruediv__")]
    DunderItruediv,
    #[strum(serialize = "__floordiv__")]
    DunderFloordiv,
    #[strum(serialize = "__rfloordiv__")]
    DunderRfloordiv,
    #[strum(serialize = "__ifloordiv__")]
    DunderIfloordiv,
    #[strum(serialize = "__mod__")]
    DunderMod,
    #[strum(serialize = "__rmod__")]
    DunderRmod,
    #[strum(serialize = "__imod__")]
    DunderImod,
    #[strum(serialize = "__pow__")]
    DunderPow,
    #[strum(serialize = "__rpow__")]
    DunderRpow,
    #[strum(serialize = "__ipow__")]
    DunderIpow,
    #[strum(serialize = "__and__")]
    DunderAnd,
    #[strum(serialize = "__rand__")]
    DunderRand,
    #[strum(serialize = "__iand__")]
    DunderIand,
    #[strum(serialize = "__or__")]
    DunderOr,
    #[strum(serialize = "__ror__")]
    DunderRor,
    #[strum(serialize = "__ior__")]
    DunderIor,
    #[strum(serialize = "__xor__")]
    DunderXor,
    #[strum(serialize = "__rxor__")]
    DunderRxor,
    #[strum(serialize = "__ixor__")]
    DunderIxor,
    #[strum(serialize = "__lshift__")]
    DunderLshift,
    #[strum(serialize = "__rlshift__")]
    DunderRlshift,
    #[strum(serialize = "__ilshift__")]
    DunderIlshift,
    #[strum(serialize = "__rshift__")]
    DunderRshift,
    #[strum(serialize = "__rrshift__")]
    DunderRrshift,
    #[strum(serialize = "__irshift__")]
    DunderIrshift,

    // ==========================
    // Unary operators
    #[strum(serialize = "__neg__")]
    DunderNeg,
    #[strum(serialize = "__pos__")]
    DunderPos,
    #[strum(serialize = "__invert__")]
    DunderInvert,

    // ==========================
    // Subscription, including the legacy two-bound slice forms
    #[strum(serialize = "__getitem__")]
    DunderGetitem,
    #[strum(serialize = "__setitem__")]
    DunderSetitem,
    #[strum(serialize = "__delitem__")]
    DunderDelitem,
    #[strum(serialize = "__getslice__")]
    DunderGetslice,
    #[strum(serialize = "__setslice__")]
    DunderSetslice,
    #[strum(serialize = "__delslice__")]
    DunderDelslice,

    // ==========================
    // Introspection attributes
    #[strum(serialize = "__name__")]
    DunderName,
    #[strum(serialize = "__bases__")]
    DunderBases,
    #[strum(serialize = "__mro__")]
    DunderMro,
    #[strum(serialize = "__dict__")]
    DunderDict,
    #[strum(serialize = "__class__")]
    DunderClass,
    #[strum(serialize = "__doc__")]
    DunderDoc,
    #[strum(serialize = "__metaclass__")]
    DunderMetaclass,
    #[strum(serialize = "__slots__")]
    DunderSlots,
    #[strum(serialize = "__weakref__")]
    DunderWeakref,
    #[strum(serialize = "__cause__")]
    DunderCause,
    #[strum(serialize = "__context__")]
    DunderContext,
    #[strum(serialize = "__suppress_context__")]
    DunderSuppressContext,
    Args,
}

impl StaticStrings {
    /// Returns the static string for a `StringId` in the static range.
    fn from_string_id(id: StringId) -> Option<Self> {
        let ordinal = id.0.checked_sub(STATIC_STRING_ID_OFFSET)?;
        Self::from_repr(u16::try_from(ordinal).ok()?)
    }

    /// Returns the string content of this static entry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl From<StaticStrings> for StringId {
    fn from(s: StaticStrings) -> Self {
        Self(STATIC_STRING_ID_OFFSET + s as u16 as u32)
    }
}

impl PartialEq<StaticStrings> for StringId {
    fn eq(&self, other: &StaticStrings) -> bool {
        *self == Self::from(*other)
    }
}

/// Storage for interned strings.
///
/// Lookups are needed only for error messages, repr output and the
/// general (non-interned) dict path; everything hot compares `StringId`s.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct Interns {
    strings: Vec<String>,
    map: AHashMap<String, StringId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its id.
    ///
    /// ASCII single characters and [`StaticStrings`] entries resolve without
    /// touching the dynamic table.
    pub fn intern(&mut self, s: &str) -> StringId {
        if s.len() == 1 && s.is_ascii() {
            return StringId::from_ascii(s.as_bytes()[0]);
        }
        if let Ok(st) = StaticStrings::from_str(s) {
            return st.into();
        }
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let raw_index = self.strings.len() + INTERN_STRING_ID_OFFSET;
        let id = StringId(raw_index.try_into().expect("StringId overflow"));
        self.strings.push(s.to_owned());
        self.map.insert(s.to_owned(), id);
        id
    }

    /// Looks up a string by its `StringId`.
    ///
    /// # Panics
    ///
    /// Panics if the `StringId` did not come from this interner, the ASCII
    /// range, or the static table.
    #[inline]
    pub fn get_str(&self, id: StringId) -> &str {
        if let Ok(c) = u8::try_from(id.0)
            && c < 128
        {
            ASCII_STRS[c as usize]
        } else if let Some(intern_index) = id.index().checked_sub(INTERN_STRING_ID_OFFSET) {
            &self.strings[intern_index]
        } else {
            StaticStrings::from_string_id(id).expect("invalid static string id").as_str()
        }
    }

    /// Tries to find the `StringId` for a string without interning it.
    #[must_use]
    pub fn try_get_str_id(&self, s: &str) -> Option<StringId> {
        if s.len() == 1 && s.is_ascii() {
            return Some(StringId::from_ascii(s.as_bytes()[0]));
        }
        if let Ok(st) = StaticStrings::from_str(s) {
            return Some(st.into());
        }
        self.map.get(s).copied()
    }

    /// Number of dynamically interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_strings_round_trip() {
        let id: StringId = StaticStrings::DunderAdd.into();
        assert_eq!(StaticStrings::from_string_id(id), Some(StaticStrings::DunderAdd));
        let interns = Interns::new();
        assert_eq!(interns.get_str(id), "__add__");
    }

    #[test]
    fn dynamic_interning_is_stable() {
        let mut interns = Interns::new();
        let a = interns.intern("spam");
        let b = interns.intern("spam");
        assert_eq!(a, b);
        assert_eq!(interns.get_str(a), "spam");
        assert_eq!(interns.try_get_str_id("spam"), Some(a));
        assert_eq!(interns.try_get_str_id("eggs"), None);
    }

    #[test]
    fn ascii_and_static_do_not_allocate() {
        let mut interns = Interns::new();
        let x = interns.intern("x");
        let add = interns.intern("__add__");
        assert_eq!(interns.len(), 0);
        assert_eq!(interns.get_str(x), "x");
        assert_eq!(interns.get_str(add), "__add__");
        assert_eq!(StringId::from(StaticStrings::DunderAdd), add);
    }
}
