//! Error types for the settle promise library
//!
//! Two families live here. [`Error`] is what the library itself returns from
//! fallible operations (`flush`, `value()`, settings loading). [`TypeError`],
//! [`Message`] and [`UnhandledRejection`] are error *values*: they travel inside
//! a [`Reason`] as the rejection reason of a promise.

use std::fmt;
use thiserror::Error;

use crate::reason::Reason;
use crate::trace::Trace;

/// Observable promise state, used in diagnostics and [`Error::InvalidState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with a reason
    Rejected,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Pending => write!(f, "pending"),
            StateKind::Fulfilled => write!(f, "fulfilled"),
            StateKind::Rejected => write!(f, "rejected"),
        }
    }
}

/// Main error type for settle
#[derive(Error, Debug)]
pub enum Error {
    /// A `.done()` chain ended in a rejection nobody handled
    #[error(transparent)]
    Unhandled(#[from] UnhandledRejection),

    /// Internal invariant or API contract violated (e.g. recursive flush)
    #[error("AssertionError: {0}")]
    Assertion(String),

    /// `value()` / `reason()` called in the wrong state
    #[error("InvalidState: promise is {actual}, expected {expected}")]
    InvalidState {
        expected: StateKind,
        actual: StateKind,
    },

    /// Malformed settings document
    #[error("ConfigError: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error while reading settings
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an assertion error
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion(message.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(expected: StateKind, actual: StateKind) -> Self {
        Error::InvalidState { expected, actual }
    }

    /// The unhandled rejection carried by this error, if that is what it is
    pub fn as_unhandled(&self) -> Option<&UnhandledRejection> {
        match self {
            Error::Unhandled(unhandled) => Some(unhandled),
            _ => None,
        }
    }
}

/// Result type alias for settle
pub type Result<T> = std::result::Result<T, Error>;

/// Programmer misuse detected at runtime, delivered as a rejection reason
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("TypeError: {message}")]
pub struct TypeError {
    pub message: String,
}

impl TypeError {
    /// Create a TypeError
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A plain-text rejection reason, for callers without a dedicated error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct Message(pub String);

/// Raised out of a flush when a `.done()` chain ends in an unhandled rejection
///
/// Carries the original reason and the causal trace of the `.done()` call.
#[derive(Error, Debug, Clone)]
#[error("UnhandledRejection: {reason}")]
pub struct UnhandledRejection {
    reason: Reason,
    trace: Option<Trace>,
}

impl UnhandledRejection {
    /// Wrap a reason together with the trace of the `.done()` call site
    pub fn new(reason: Reason, trace: Option<Trace>) -> Self {
        Self { reason, trace }
    }

    /// The rejection reason that went unhandled
    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    /// Trace to the `.done()` call site
    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// Full diagnostic text: the reason's own stack followed by the done trace
    pub fn stack(&self) -> String {
        let mut out = format!("UnhandledRejection: {}", self.reason.stack());
        if let Some(trace) = &self.trace {
            out.push_str("\n  from Promise at:\n");
            out.push_str(&trace.inspect());
        }
        out
    }
}

/// Standardized error message templates
pub mod messages {
    pub const RESOLVE_TO_SELF: &str = "cannot resolve Promise to self";
    pub const RECURSIVE_FLUSH: &str = "cannot recursively flush";
    pub const EMPTY_PREDICATE: &str = "invalid predicate to .catch(), got an empty class list";

    /// Format a "X while Y is still unwrapping" fence violation
    pub fn unwrap_overlap(entering: impl std::fmt::Display, current: impl std::fmt::Display) -> String {
        format!("{} unwrapped while {} is still unwrapping", entering, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_error_display() {
        let err = TypeError::new(messages::RESOLVE_TO_SELF);
        assert_eq!(err.to_string(), "TypeError: cannot resolve Promise to self");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state(StateKind::Fulfilled, StateKind::Pending);
        assert_eq!(
            err.to_string(),
            "InvalidState: promise is pending, expected fulfilled"
        );
    }

    #[test]
    fn test_unhandled_rejection_carries_reason() {
        let reason = Reason::new(Message("boom".into()));
        let err: Error = UnhandledRejection::new(reason.clone(), None).into();
        let unhandled = err.as_unhandled().expect("unhandled variant");
        assert!(unhandled.reason().ptr_eq(&reason));
        assert_eq!(err.to_string(), "UnhandledRejection: boom");
    }

    #[test]
    fn test_unhandled_rejection_stack_includes_done_site() {
        let trace = Trace::here();
        let line = trace.stack().location().line();
        let unhandled = UnhandledRejection::new(Reason::msg("late"), Some(trace));
        let stack = unhandled.stack();
        assert!(stack.starts_with("UnhandledRejection: late"));
        assert!(stack.contains("from Promise at:"));
        assert!(stack.contains(&format!("{}:{}", file!(), line)));
    }
}
