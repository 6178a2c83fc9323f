//! Arbitrary-precision integer payload.
//!
//! Integers outside the `i64` range promote to a heap-allocated `LongInt`.
//! The numeric algorithms themselves live with `num-bigint`; this crate owns
//! only their representation and dispatch.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    exception_private::RunResult,
    heap::{Heap, HeapData},
    py_hash,
    resource::ResourceTracker,
    value::Value,
};

/// A heap-allocated arbitrary-precision integer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct LongInt(BigInt);

impl LongInt {
    #[must_use]
    pub fn new(value: BigInt) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    /// Converts to a value, demoting to an immediate `Int` when in range.
    pub fn into_value(self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let Some(small) = self.0.to_i64() {
            return Ok(Value::Int(small));
        }
        let id = heap.allocate(HeapData::LongInt(self))?;
        Ok(Value::Ref(id))
    }

    /// Hash agreeing with the immediate-int hash for values in range.
    #[must_use]
    pub fn py_hash(&self) -> i64 {
        if let Some(small) = self.0.to_i64() {
            return py_hash::hash_int(small);
        }
        let (sign, digits) = self.0.to_u32_digits();
        py_hash::hash_bigint(sign == num_bigint::Sign::Minus, &digits)
    }
}

impl From<i64> for LongInt {
    fn from(value: i64) -> Self {
        Self(BigInt::from(value))
    }
}

impl std::fmt::Display for LongInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
