//! Host-facing exception values.
//!
//! Uncaught exceptions cross the embedding boundary as [`Exception`]: an
//! owned snapshot of the exception type, message, chaining links and
//! traceback. Unlike the internal machinery it has no ties to the heap and
//! can be stored, displayed or serialized freely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception_private::{ExcType, ExceptionRaise, RunError, SimpleException};

/// One traceback entry visible to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function the error passed through, if known.
    pub function: Option<String>,
    /// Line number within that function, if the embedder reported one.
    pub lineno: Option<u32>,
}

/// An owned Python exception delivered to the embedding layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    exc_type: ExcType,
    message: Option<String>,
    /// Innermost frame first.
    frames: Vec<StackFrame>,
    cause: Option<Box<Exception>>,
    context: Option<Box<Exception>>,
    /// Whether this exception escaped a resource limit and was uncatchable.
    uncatchable: bool,
}

impl Exception {
    /// Creates an exception with no traceback, for use as a host-side value.
    #[must_use]
    pub fn new(exc_type: ExcType, message: Option<String>) -> Self {
        Self {
            exc_type,
            message,
            frames: Vec::new(),
            cause: None,
            context: None,
            uncatchable: false,
        }
    }

    /// The exception type.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// The message argument, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Consumes the exception, returning its message.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
    }

    /// Traceback frames, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Explicit cause (`raise X from Y`), if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_deref()
    }

    /// Implicit context (raised while handling), if any.
    #[must_use]
    pub fn context(&self) -> Option<&Exception> {
        self.context.as_deref()
    }

    /// Whether this exception came from a resource limit and could not be
    /// caught by user code.
    #[must_use]
    pub fn is_uncatchable(&self) -> bool {
        self.uncatchable
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_str: &'static str = self.exc_type.into();
        match &self.message {
            Some(msg) => write!(f, "{type_str}: {msg}"),
            None => f.write_str(type_str),
        }
    }
}

impl std::error::Error for Exception {}

fn from_simple(exc: &SimpleException) -> Exception {
    Exception {
        exc_type: exc.exc_type(),
        message: exc.arg().map(str::to_owned),
        frames: Vec::new(),
        cause: exc.cause().map(|c| Box::new(from_simple(c))),
        context: exc.context().filter(|_| !exc.suppress_context()).map(|c| Box::new(from_simple(c))),
        uncatchable: false,
    }
}

impl From<ExceptionRaise> for Exception {
    fn from(raise: ExceptionRaise) -> Self {
        let mut exc = from_simple(&raise.exc);
        exc.frames = raise
            .frames
            .into_iter()
            .map(|f| StackFrame {
                function: f.function,
                lineno: f.lineno,
            })
            .collect();
        exc
    }
}

impl From<RunError> for Exception {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Internal(msg) => Self::new(ExcType::RuntimeError, Some(format!("internal error: {msg}"))),
            RunError::Exc(raise) => Self::from(*raise),
            RunError::UncatchableExc(raise) => {
                let mut exc = Self::from(*raise);
                exc.uncatchable = true;
                exc
            }
        }
    }
}
