//! What a promise can be resolved with, and the handles that resolve it

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::{Inner, Promise};
use crate::reason::Reason;

/// A foreign promise-like value that can be adopted
///
/// `then` is called synchronously during resolution with fresh one-shot
/// handles. Only the first handle call counts; an `Err` returned before
/// either handle was called rejects the adopting promise.
pub trait Thenable<T> {
    fn then(&self, resolve: Resolve<T>, reject: Reject<T>) -> Result<(), Reason>;
}

/// The value a promise is resolved with
pub enum Resolution<T> {
    /// Fulfill with this value
    Value(T),
    /// Adopt the state of another promise
    Promise(Promise<T>),
    /// Adopt the state of a foreign thenable
    Thenable(Rc<dyn Thenable<T>>),
}

impl<T> From<T> for Resolution<T> {
    fn from(value: T) -> Self {
        Resolution::Value(value)
    }
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T> Resolution<T> {
    /// Wrap a thenable
    pub fn thenable(thenable: impl Thenable<T> + 'static) -> Self {
        Resolution::Thenable(Rc::new(thenable))
    }
}

/// One-shot resolve handle
pub struct Resolve<T> {
    target: Rc<Inner<T>>,
    called: Rc<Cell<bool>>,
}

/// One-shot reject handle, paired with a [`Resolve`]
pub struct Reject<T> {
    target: Rc<Inner<T>>,
    called: Rc<Cell<bool>>,
}

/// Fresh pair of handles sharing one "already called" flag
pub(crate) fn capture<T>(target: &Rc<Inner<T>>) -> (Resolve<T>, Reject<T>) {
    let called = Rc::new(Cell::new(false));
    (
        Resolve {
            target: target.clone(),
            called: called.clone(),
        },
        Reject {
            target: target.clone(),
            called,
        },
    )
}

impl<T: Clone + 'static> Resolve<T> {
    /// Resolve the promise, unless either handle was used before
    pub fn call(&self, value: impl Into<Resolution<T>>) {
        if !self.called.replace(true) {
            self.target.resolve(value.into());
        }
    }
}

impl<T: Clone + 'static> Reject<T> {
    /// Reject the promise, unless either handle was used before
    pub fn call(&self, reason: impl Into<Reason>) {
        if !self.called.replace(true) {
            self.target.reject(reason.into());
        }
    }
}

impl<T> Resolve<T> {
    pub fn is_called(&self) -> bool {
        self.called.get()
    }
}

impl<T> Reject<T> {
    pub fn is_called(&self) -> bool {
        self.called.get()
    }
}

impl<T> Clone for Resolve<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            called: self.called.clone(),
        }
    }
}

impl<T> Clone for Reject<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            called: self.called.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolve<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("promise", &self.target.id)
            .field("called", &self.called.get())
            .finish()
    }
}

impl<T> fmt::Debug for Reject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("promise", &self.target.id)
            .field("called", &self.called.get())
            .finish()
    }
}

/// A promise together with the handles that settle it
pub struct Deferred<T> {
    pub promise: Promise<T>,
    pub resolve: Resolve<T>,
    pub reject: Reject<T>,
}

/// Result of a `.done()` or `.finally()` callback
///
/// `()` means the callback is complete. A promise means "complete once this
/// settles": its rejection is reported like any other failure.
pub trait Completion {
    fn into_promise(self) -> Option<Promise<()>>;
}

impl Completion for () {
    fn into_promise(self) -> Option<Promise<()>> {
        None
    }
}

impl<T: Clone + 'static> Completion for Promise<T> {
    fn into_promise(self) -> Option<Promise<()>> {
        Some(self.returns(()))
    }
}
