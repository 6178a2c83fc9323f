#![doc = include_str!("../../../README.md")]

// first so the payload types exist for everything else
mod heap;

mod args;
mod builtins;
mod exception_private;
mod exception_public;
mod frame;
mod function;
mod intern;
mod interop;
mod object;
mod proxy;
mod py_hash;
mod resource;
mod runtime;
mod signature;
mod types;
mod value;

pub use crate::{
    args::{ArgValues, KwargsValues},
    builtins::{BuiltinFunction, Builtins},
    exception_private::{ExcType, SimpleException},
    exception_public::{Exception, StackFrame},
    frame::Frame,
    function::{FunctionBody, HostFn},
    heap::{Heap, HeapId, HeapStats},
    intern::{FunctionId, HostFunctionId, StringId},
    object::Object,
    proxy::ProxyId,
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    runtime::{BinaryOp, CompareOp, DictIter, InterruptHandle, Runtime, UnaryOp},
    signature::Signature,
    types::Type,
    value::Value,
};

/// Result alias for the public runtime API.
///
/// The error side is the internal error channel; uncaught errors convert
/// into [`Exception`] for display at the embedding boundary.
pub type RunResult<T> = exception_private::RunResult<T>;

/// The public error type of every runtime entry point.
pub use crate::exception_private::RunError;
