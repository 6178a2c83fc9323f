//! Internal exception machinery.
//!
//! Every failure inside the runtime is a [`RunError`]: a catchable Python
//! exception, an uncatchable resource violation, or an internal invariant
//! breach (a bug in pyrite, not in user code). Exceptions carry their
//! chaining links (`__cause__`/`__context__`) and accumulate traceback
//! frames while unwinding through function calls.

use std::{
    borrow::Cow,
    fmt::{self, Display, Write},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{resource::ResourceError, types::str::string_repr_fmt};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Python exception types raised by the core.
///
/// The string representation matches the Python class name exactly
/// (e.g. `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Root of the exception hierarchy.
    BaseException,
    /// Base class for all non-exiting exceptions.
    Exception,
    /// Cancellation delivered through the interrupt flag.
    KeyboardInterrupt,
    SystemExit,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    FloatingPointError,
    OverflowError,
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    NotImplementedError,
    RecursionError,

    AttributeError,
    NameError,
    ValueError,
    TypeError,
    MemoryError,
    ReferenceError,
    StopIteration,
    AssertionError,
}

impl ExcType {
    /// Checks whether `self` would be caught by `except handler_type:`.
    ///
    /// Implements the builtin exception hierarchy used for handler matching
    /// and `isinstance` checks on exception values.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::BaseException => true,
            Self::Exception => !matches!(self, Self::BaseException | Self::KeyboardInterrupt | Self::SystemExit),
            Self::LookupError => matches!(self, Self::KeyError | Self::IndexError),
            Self::ArithmeticError => matches!(
                self,
                Self::FloatingPointError | Self::ZeroDivisionError | Self::OverflowError
            ),
            Self::RuntimeError => matches!(self, Self::RecursionError | Self::NotImplementedError),
            _ => false,
        }
    }

    /// Returns the direct base type, if any.
    ///
    /// Used to materialize the MRO of builtin exception class wrappers.
    #[must_use]
    pub(crate) fn base(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::Exception | Self::KeyboardInterrupt | Self::SystemExit => Some(Self::BaseException),
            Self::ArithmeticError
            | Self::LookupError
            | Self::RuntimeError
            | Self::AttributeError
            | Self::NameError
            | Self::ValueError
            | Self::TypeError
            | Self::MemoryError
            | Self::ReferenceError
            | Self::StopIteration
            | Self::AssertionError => Some(Self::Exception),
            Self::FloatingPointError | Self::OverflowError | Self::ZeroDivisionError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::NotImplementedError | Self::RecursionError => Some(Self::RuntimeError),
        }
    }

    /// Creates a `TypeError` with the given message.
    pub(crate) fn type_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    /// Creates a `RuntimeError` with the given message.
    pub(crate) fn runtime_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::RuntimeError, msg).into()
    }

    /// Creates a `ValueError` with the given message.
    pub(crate) fn value_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    /// Creates an `IndexError` with the given message.
    pub(crate) fn index_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    /// Creates a `KeyError` carrying the repr of the missing key.
    pub(crate) fn key_error(key_repr: impl Into<String>) -> RunError {
        SimpleException::new(Self::KeyError, Some(key_repr.into())).into()
    }

    /// Creates a `ZeroDivisionError` with the given message.
    pub(crate) fn zero_division(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    /// `AttributeError` for a missing attribute on an instance.
    pub(crate) fn attribute_error(type_name: impl Display, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
        .into()
    }

    /// `AttributeError` for a missing attribute on a type object.
    pub(crate) fn attribute_error_type(class_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("type object '{class_name}' has no attribute '{attr}'"),
        )
        .into()
    }

    /// `AttributeError` with a verbatim message (property accessors).
    pub(crate) fn attribute_error_msg(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::AttributeError, msg).into()
    }

    /// `TypeError` for hashing an unhashable value.
    pub(crate) fn unhashable(type_name: impl Display) -> RunError {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    /// `TypeError` for a binary operator with unsupported operand types.
    pub(crate) fn binary_type_error(op: &str, lhs: impl Display, rhs: impl Display) -> RunError {
        Self::type_error(format!("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'"))
    }

    /// `TypeError` for a unary operator with an unsupported operand type.
    pub(crate) fn unary_type_error(op: &str, operand: impl Display) -> RunError {
        Self::type_error(format!("bad operand type for unary {op}: '{operand}'"))
    }

    /// `TypeError` for calling a non-callable value.
    pub(crate) fn not_callable(type_name: impl Display) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    /// `TypeError` for an unsubscriptable value.
    pub(crate) fn not_subscriptable(type_name: impl Display) -> RunError {
        Self::type_error(format!("'{type_name}' object is not subscriptable"))
    }

    // --- argument binding errors ---

    pub(crate) fn type_error_no_args(name: &str, count: usize) -> RunError {
        Self::type_error(format!("{name}() takes no arguments ({count} given)"))
    }

    pub(crate) fn type_error_arg_count(name: &str, expected: usize, got: usize) -> RunError {
        let plural = if expected == 1 { "" } else { "s" };
        Self::type_error(format!("{name}() takes exactly {expected} argument{plural} ({got} given)"))
    }

    pub(crate) fn type_error_at_least(name: &str, min: usize, got: usize) -> RunError {
        let plural = if min == 1 { "" } else { "s" };
        Self::type_error(format!("{name}() takes at least {min} argument{plural} ({got} given)"))
    }

    pub(crate) fn type_error_at_most(name: &str, max: usize, got: usize) -> RunError {
        let plural = if max == 1 { "" } else { "s" };
        Self::type_error(format!("{name}() takes at most {max} argument{plural} ({got} given)"))
    }

    pub(crate) fn type_error_unexpected_keyword(func: &str, key: &str) -> RunError {
        Self::type_error(format!("{func}() got an unexpected keyword argument '{key}'"))
    }

    pub(crate) fn type_error_duplicate_arg(func: &str, param: &str) -> RunError {
        Self::type_error(format!("{func}() got multiple values for keyword argument '{param}'"))
    }

    pub(crate) fn type_error_kwargs_nonstring_key() -> RunError {
        Self::type_error("keywords must be strings")
    }

    pub(crate) fn type_error_too_many_positional(func: &str, max: usize, given: usize, kwonly_given: usize) -> RunError {
        let plural = if max == 1 { "" } else { "s" };
        let msg = if kwonly_given > 0 {
            format!(
                "{func}() takes {max} positional argument{plural} but {given} positional arguments \
                 (and {kwonly_given} keyword-only argument{}) were given",
                if kwonly_given == 1 { "" } else { "s" }
            )
        } else {
            let verb = if given == 1 { "was" } else { "were" };
            format!("{func}() takes {max} positional argument{plural} but {given} {verb} given")
        };
        Self::type_error(msg)
    }

    pub(crate) fn type_error_missing_positional_with_names(func: &str, names: &[&str]) -> RunError {
        let plural = if names.len() == 1 { "" } else { "s" };
        let mut quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
        let last = quoted.pop().unwrap_or_default();
        let joined = if quoted.is_empty() {
            last
        } else {
            format!("{}, and {last}", quoted.join(", "))
        };
        Self::type_error(format!(
            "{func}() missing {} required positional argument{plural}: {joined}",
            names.len()
        ))
    }

    pub(crate) fn type_error_missing_kwonly_with_names(func: &str, names: &[&str]) -> RunError {
        let plural = if names.len() == 1 { "" } else { "s" };
        let mut quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
        let last = quoted.pop().unwrap_or_default();
        let joined = if quoted.is_empty() {
            last
        } else {
            format!("{}, and {last}", quoted.join(", "))
        };
        Self::type_error(format!(
            "{func}() missing {} required keyword-only argument{plural}: {joined}",
            names.len()
        ))
    }

    /// `KeyboardInterrupt` delivered from the interrupt flag.
    pub(crate) fn keyboard_interrupt() -> RunError {
        SimpleException::new(Self::KeyboardInterrupt, None).into()
    }
}

/// Lightweight exception payload.
///
/// Chaining links hold boxed copies of the linked exceptions rather than
/// heap references so an in-flight error never keeps arena slots alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
    /// Explicit chaining cause set by `raise X from Y`.
    #[serde(default)]
    cause: Option<Box<Self>>,
    /// Implicit chaining context set when raising during handling.
    #[serde(default)]
    context: Option<Box<Self>>,
    /// Whether implicit context is suppressed in tracebacks.
    #[serde(default)]
    suppress_context: bool,
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.py_repr_fmt(f)
    }
}

impl SimpleException {
    /// Creates a new exception with the given type and optional message.
    #[must_use]
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self {
            exc_type,
            arg,
            cause: None,
            context: None,
            suppress_context: false,
        }
    }

    /// Creates a new exception with the given type and message.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, arg: impl fmt::Display) -> Self {
        Self::new(exc_type, Some(arg.to_string()))
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    #[must_use]
    pub fn cause(&self) -> Option<&Self> {
        self.cause.as_deref()
    }

    #[must_use]
    pub fn context(&self) -> Option<&Self> {
        self.context.as_deref()
    }

    #[must_use]
    pub fn suppress_context(&self) -> bool {
        self.suppress_context
    }

    /// Sets the explicit cause (`raise X from Y`); suppresses implicit context.
    pub fn set_cause(&mut self, cause: Option<Self>) {
        self.cause = cause.map(Box::new);
        self.suppress_context = true;
    }

    /// Records the implicit context if none is set yet.
    pub fn chain_context(&mut self, context: Self) {
        if self.context.is_none() {
            self.context = Some(Box::new(context));
        }
    }

    /// `str()` of the exception: the message, with `KeyError` using the key repr.
    #[must_use]
    pub fn py_str(&self) -> String {
        match (self.exc_type, &self.arg) {
            (ExcType::KeyError, Some(arg)) => arg.clone(),
            (_, Some(arg)) => arg.clone(),
            (_, None) => String::new(),
        }
    }

    /// Formats the exception the way Python would repr it.
    pub fn py_repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        let type_str: &'static str = self.exc_type.into();
        write!(f, "{type_str}(")?;
        if let Some(arg) = &self.arg {
            if self.exc_type == ExcType::KeyError {
                // KeyError stores the already-repr'd key
                f.write_str(arg)?;
            } else {
                string_repr_fmt(arg, f)?;
            }
        }
        f.write_char(')')
    }

    /// Attaches an empty traceback, producing a raisable error payload.
    #[must_use]
    pub fn into_raise(self) -> ExceptionRaise {
        ExceptionRaise {
            exc: self,
            frames: Vec::new(),
        }
    }
}

/// One traceback entry: the function and line where the error passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStackFrame {
    pub function: Option<String>,
    pub lineno: Option<u32>,
}

/// An exception in flight: payload plus accumulated traceback.
///
/// Frames are appended innermost-first while the error unwinds through
/// `call` boundaries; re-raising keeps the list intact unless the embedder
/// explicitly replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRaise {
    pub exc: SimpleException,
    pub frames: Vec<RawStackFrame>,
}

impl ExceptionRaise {
    pub fn push_frame(&mut self, function: Option<String>, lineno: Option<u32>) {
        self.frames.push(RawStackFrame { function, lineno });
    }
}

impl From<SimpleException> for ExceptionRaise {
    fn from(exc: SimpleException) -> Self {
        exc.into_raise()
    }
}

/// Error channel for all runtime operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunError {
    /// Internal invariant violation - a bug in pyrite, not user code.
    Internal(Cow<'static, str>),
    /// Catchable Python exception.
    Exc(Box<ExceptionRaise>),
    /// Uncatchable exception from resource limits.
    ///
    /// Displays with a traceback like a normal exception but cannot be
    /// caught, so untrusted code cannot suppress limit violations.
    UncatchableExc(Box<ExceptionRaise>),
}

impl RunError {
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the exception type if this is a Python exception.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match self {
            Self::Internal(_) => None,
            Self::Exc(raise) | Self::UncatchableExc(raise) => Some(raise.exc.exc_type()),
        }
    }

    /// Whether this is a catchable `AttributeError` (the one error `hasattr`
    /// and three-argument `getattr` treat as absence).
    #[must_use]
    pub fn is_attribute_error(&self) -> bool {
        matches!(self, Self::Exc(raise) if raise.exc.exc_type().is_subclass_of(ExcType::AttributeError))
    }

    /// Appends a traceback frame if this error carries an exception.
    pub fn push_frame(&mut self, function: Option<String>, lineno: Option<u32>) {
        match self {
            Self::Internal(_) => {}
            Self::Exc(raise) | Self::UncatchableExc(raise) => raise.push_frame(function, lineno),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(raise) | Self::UncatchableExc(raise) => {
                let type_str: &'static str = raise.exc.exc_type().into();
                match raise.exc.arg() {
                    Some(arg) => write!(f, "{type_str}: {arg}"),
                    None => f.write_str(type_str),
                }
            }
        }
    }
}

impl From<ExceptionRaise> for RunError {
    fn from(exc: ExceptionRaise) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc.into_raise()))
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        let exc = match err {
            ResourceError::Memory { .. } | ResourceError::Allocations { .. } => {
                SimpleException::new_msg(ExcType::MemoryError, err)
            }
            ResourceError::Recursion { .. } => {
                SimpleException::new_msg(ExcType::RecursionError, "maximum recursion depth exceeded")
            }
        };
        Self::UncatchableExc(Box::new(exc.into_raise()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_hierarchy_matches_handlers() {
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::KeyboardInterrupt.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::KeyboardInterrupt.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::ValueError.is_subclass_of(ExcType::TypeError));
    }

    #[test]
    fn resource_errors_are_uncatchable() {
        let err: RunError = ResourceError::Recursion { limit: 10 }.into();
        assert!(matches!(err, RunError::UncatchableExc(_)));
        assert_eq!(err.exc_type(), Some(ExcType::RecursionError));
    }

    #[test]
    fn context_chains_once() {
        let mut exc = SimpleException::new_msg(ExcType::ValueError, "second");
        exc.chain_context(SimpleException::new_msg(ExcType::TypeError, "first"));
        exc.chain_context(SimpleException::new_msg(ExcType::KeyError, "third"));
        assert_eq!(exc.context().unwrap().exc_type(), ExcType::TypeError);
    }
}
