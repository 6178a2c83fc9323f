//! Call frames.

use crate::{heap::HeapId, intern::FunctionId, value::Value};

/// A transient activation record for one function call.
//
// Locals are a flat vector laid out by the signature binder:
// `[args][*args slot?][kwonly][**kwargs slot?]`. The frame is created on
// call and dropped on return; an embedding interpreter that implements
// generators keeps the frame alive across yields itself.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    function: FunctionId,
    locals: Vec<Value>,
    /// The enclosing module's globals dict, if any.
    globals: Option<HeapId>,
    /// Current line, reported by the executing body for tracebacks.
    lineno: Option<u32>,
}

impl Frame {
    #[must_use]
    pub(crate) fn new(function: FunctionId, locals: Vec<Value>, globals: Option<HeapId>) -> Self {
        Self {
            function,
            locals,
            globals,
            lineno: None,
        }
    }

    /// The function this frame executes.
    #[must_use]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// A bound parameter by namespace slot index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range for the signature's layout.
    #[must_use]
    pub fn arg(&self, index: usize) -> Value {
        self.locals[index]
    }

    /// All local slots in signature layout order.
    #[must_use]
    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    /// Writes a local slot.
    pub fn set_local(&mut self, index: usize, value: Value) {
        self.locals[index] = value;
    }

    /// The enclosing module's globals dict, if the function has one.
    #[must_use]
    pub fn globals(&self) -> Option<HeapId> {
        self.globals
    }

    /// Reports the current line for traceback construction.
    pub fn set_lineno(&mut self, lineno: u32) {
        self.lineno = Some(lineno);
    }

    /// The last reported line.
    #[must_use]
    pub fn lineno(&self) -> Option<u32> {
        self.lineno
    }
}
