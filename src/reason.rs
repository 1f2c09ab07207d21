//! Rejection reasons
//!
//! A [`Reason`] is the opaque payload of a rejected promise. It wraps any
//! `std::error::Error + 'static` behind an `Rc`, so every handler of a
//! rejected promise observes the very same reason (see [`Reason::ptr_eq`]).
//!
//! When long traces are enabled, the first promise rejected with a reason
//! attaches its causal trace; [`Reason::stack`] then renders the error followed
//! by `from Promise at:` and the trace. The text is computed on demand.

use std::cell::OnceCell;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use crate::error::Message;
use crate::trace::Trace;

/// Why a promise was rejected
#[derive(Clone)]
pub struct Reason(Rc<ReasonInner>);

struct ReasonInner {
    error: Box<dyn StdError + 'static>,
    trace: OnceCell<Trace>,
}

impl Reason {
    /// Wrap an error value
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        Reason(Rc::new(ReasonInner {
            error: Box::new(error),
            trace: OnceCell::new(),
        }))
    }

    /// A reason carrying only a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// The wrapped error
    pub fn error(&self) -> &(dyn StdError + 'static) {
        self.0.error.as_ref()
    }

    /// Borrow the wrapped error as `E`, if that is its type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.error.downcast_ref::<E>()
    }

    /// Whether the wrapped error is an `E`
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.error.is::<E>()
    }

    /// Whether both handles point at the same reason
    pub fn ptr_eq(&self, other: &Reason) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Causal trace of the promise this reason first rejected, if any
    pub fn trace(&self) -> Option<&Trace> {
        self.0.trace.get()
    }

    /// Attach a trace; only the first attachment sticks
    pub(crate) fn attach_trace(&self, trace: &Trace) {
        let _ = self.0.trace.set(trace.clone());
    }

    /// Error text, extended with the causal trace when one is attached
    pub fn stack(&self) -> String {
        match self.trace() {
            Some(trace) => format!("{}\n  from Promise at:\n{}", self.0.error, trace.inspect()),
            None => self.0.error.to_string(),
        }
    }
}

impl<E: StdError + 'static> From<E> for Reason {
    fn from(error: E) -> Self {
        Reason::new(error)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.error, f)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reason")
            .field("error", &self.0.error)
            .field("traced", &self.0.trace.get().is_some())
            .finish()
    }
}
