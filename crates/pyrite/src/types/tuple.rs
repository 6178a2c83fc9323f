//! Heap-allocated tuple payload.

use crate::{
    exception_private::RunResult,
    heap::{Heap, HeapData},
    resource::ResourceTracker,
    value::Value,
};

/// A Python tuple: an immutable sequence of values.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct Tuple(Vec<Value>);

impl Tuple {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_vec(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Allocates a tuple on the heap, returning the referencing value.
pub(crate) fn allocate_tuple(values: Vec<Value>, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
    let id = heap.allocate(HeapData::Tuple(Tuple::new(values)))?;
    Ok(Value::Ref(id))
}
