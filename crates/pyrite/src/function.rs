//! Function records.
//!
//! The core owns signatures, argument binding and frames; function *bodies*
//! belong to the executing layer above (a bytecode interpreter, a compiler,
//! or test code) and are registered as host callbacks. Calling a
//! `Value::DefFunction` binds arguments into a [`Frame`](crate::frame::Frame)
//! and re-enters the body with the runtime borrowed reentrantly.

use crate::{
    args::ArgValues,
    exception_private::RunResult,
    frame::Frame,
    heap::HeapId,
    intern::StringId,
    resource::ResourceTracker,
    runtime::Runtime,
    signature::Signature,
    value::Value,
};

/// Body of a registered function: receives the runtime and the bound frame.
///
/// Every invocation is a suspension point for the dispatch engine; the body
/// may re-enter any runtime operation.
pub type FunctionBody<T> = fn(&mut Runtime<T>, &mut Frame) -> RunResult<Value>;

/// A raw host thunk: receives unbound call-site arguments.
///
/// Used by the interop bridge and for builtin-shaped extensions that do
/// their own argument handling.
pub type HostFn<T> = fn(&mut Runtime<T>, ArgValues) -> RunResult<Value>;

/// A function registered with the runtime.
#[derive(Debug)]
pub(crate) struct Function<T: ResourceTracker> {
    pub name: StringId,
    pub signature: Signature,
    /// Default values, evaluated at registration:
    /// `[arg defaults..][kwonly defaults..]`.
    pub defaults: Vec<Value>,
    /// Module globals the function closes over, if registered in a module.
    pub globals: Option<HeapId>,
    pub body: FunctionBody<T>,
}

/// A registered host thunk.
#[derive(Debug)]
pub(crate) struct HostFunction<T: ResourceTracker> {
    pub name: StringId,
    pub body: HostFn<T>,
}
