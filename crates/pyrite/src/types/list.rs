//! Heap-allocated list payload.

use crate::value::Value;

/// A Python list: a mutable sequence of values.
///
/// The core dispatches `__getitem__`/`__setitem__` and concatenation on
/// lists natively; the richer method surface belongs to the standard
/// library layer above this crate.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct List(Vec<Value>);

impl List {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_vec(&self) -> &[Value] {
        &self.0
    }

    pub fn as_vec_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }
}
