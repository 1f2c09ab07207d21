//! Subscriptions waiting on a promise, and the unwrap fence they run under

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::{Completion, Inner, PromiseId, Resolution};
use crate::config;
use crate::error::{messages, Error, Result};
use crate::reason::Reason;
use crate::trace::Trace;

/// What a `.then()` callback produced
pub(crate) type Outcome<U> = std::result::Result<Resolution<U>, Reason>;

pub(crate) type OnRejected<U> = Box<dyn FnOnce(Reason) -> Outcome<U>>;

/// Type-erased `.done()` callback; a returned promise is already being
/// observed by the time it returns
pub(crate) type DoneFn<A> = Box<dyn FnOnce(A, &Trace) -> std::result::Result<(), Reason>>;

/// A queued subscription, consumed once the source settles
pub(crate) trait Handler<T> {
    fn react(
        self: Box<Self>,
        source: &Rc<Inner<T>>,
        settled: std::result::Result<T, Reason>,
    ) -> Result<()>;

    /// Erase the handler so it can be released outside the promise that
    /// owned it
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

pub(crate) enum OnFulfilled<T, U> {
    /// User callback, run under the unwrap fence
    Call(Box<dyn FnOnce(T) -> Outcome<U>>),
    /// Plain value mapping with no user code (catch and follow)
    Forward(fn(T) -> U),
}

impl<T: 'static, U: 'static> OnFulfilled<T, U> {
    pub(crate) fn call<F, R>(f: F) -> Self
    where
        F: FnOnce(T) -> std::result::Result<R, Reason> + 'static,
        R: Into<Resolution<U>>,
    {
        OnFulfilled::Call(Box::new(move |value| f(value).map(Into::into)))
    }
}

pub(crate) fn on_rejected<U, G, S>(f: G) -> OnRejected<U>
where
    G: FnOnce(Reason) -> std::result::Result<S, Reason> + 'static,
    S: Into<Resolution<U>>,
{
    Box::new(move |reason| f(reason).map(Into::into))
}

pub(crate) fn done_fn<A, F, C>(f: F) -> DoneFn<A>
where
    F: FnOnce(A) -> std::result::Result<C, Reason> + 'static,
    C: Completion,
{
    Box::new(move |arg, trace| {
        if let Some(promise) = f(arg)?.into_promise() {
            promise
                .inner()
                .subscribe(Box::new(DoneHandler::new(None, None, trace.clone())));
        }
        Ok(())
    })
}

/// Resolves a slave promise with the outcome of the callbacks
pub(crate) struct ThenHandler<T, U> {
    slave: Rc<Inner<U>>,
    on_fulfilled: OnFulfilled<T, U>,
    on_rejected: Option<OnRejected<U>>,
}

impl<T, U> ThenHandler<T, U> {
    pub(crate) fn new(
        slave: Rc<Inner<U>>,
        on_fulfilled: OnFulfilled<T, U>,
        on_rejected: Option<OnRejected<U>>,
    ) -> Self {
        Self {
            slave,
            on_fulfilled,
            on_rejected,
        }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> Handler<T> for ThenHandler<T, U> {
    fn react(
        self: Box<Self>,
        _source: &Rc<Inner<T>>,
        settled: std::result::Result<T, Reason>,
    ) -> Result<()> {
        let ThenHandler {
            slave,
            on_fulfilled,
            on_rejected,
        } = *self;
        let outcome = match (settled, on_fulfilled, on_rejected) {
            (Ok(value), OnFulfilled::Forward(map), _) => Ok(Resolution::Value(map(value))),
            (Ok(value), OnFulfilled::Call(f), _) => {
                let _fence = UnwrapGuard::enter(slave.id(), slave.trace())?;
                f(value)
            }
            (Err(reason), _, Some(r)) => {
                let _fence = UnwrapGuard::enter(slave.id(), slave.trace())?;
                r(reason)
            }
            (Err(reason), _, None) => Err(reason),
        };
        match outcome {
            Ok(resolution) => slave.resolve(resolution),
            Err(reason) => slave.reject(reason),
        }
        Ok(())
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Terminal subscription; reports rejections nobody handled
pub(crate) struct DoneHandler<T> {
    on_fulfilled: Option<DoneFn<T>>,
    on_rejected: Option<DoneFn<Reason>>,
    trace: Trace,
}

impl<T> DoneHandler<T> {
    pub(crate) fn new(
        on_fulfilled: Option<DoneFn<T>>,
        on_rejected: Option<DoneFn<Reason>>,
        trace: Trace,
    ) -> Self {
        Self {
            on_fulfilled,
            on_rejected,
            trace,
        }
    }
}

impl<T: Clone + 'static> Handler<T> for DoneHandler<T> {
    fn react(
        self: Box<Self>,
        source: &Rc<Inner<T>>,
        settled: std::result::Result<T, Reason>,
    ) -> Result<()> {
        let DoneHandler {
            on_fulfilled,
            on_rejected,
            trace,
        } = *self;
        let outcome = match settled {
            Ok(value) => match on_fulfilled {
                Some(f) => {
                    let _fence = UnwrapGuard::enter(source.id(), source.trace())?;
                    f(value, &trace)
                }
                None => Ok(()),
            },
            Err(reason) => match on_rejected {
                Some(r) => {
                    let _fence = UnwrapGuard::enter(source.id(), source.trace())?;
                    r(reason, &trace)
                }
                None => Err(reason),
            },
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(reason) => config::report_unhandled(&reason, Some(&trace)),
        }
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct Unwrapping {
    id: PromiseId,
    trace: Option<Trace>,
}

thread_local! {
    static UNWRAPPING: RefCell<Option<Unwrapping>> = const { RefCell::new(None) };
}

/// Trace of the promise whose callback is running right now
pub(crate) fn unwrapping_trace() -> Option<Trace> {
    UNWRAPPING.with(|slot| slot.borrow().as_ref().and_then(|u| u.trace.clone()))
}

/// Marks one promise as "currently unwrapping" for the duration of a single
/// callback; released on every exit path
#[derive(Debug)]
pub(crate) struct UnwrapGuard(());

impl UnwrapGuard {
    pub(crate) fn enter(id: PromiseId, trace: Option<&Trace>) -> Result<Self> {
        UNWRAPPING.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(current) = slot.as_ref() {
                return Err(Error::assertion(messages::unwrap_overlap(id, current.id)));
            }
            *slot = Some(Unwrapping {
                id,
                trace: trace.cloned(),
            });
            Ok(())
        })?;
        config::trace_event(id, "unwrap");
        Ok(UnwrapGuard(()))
    }
}

impl Drop for UnwrapGuard {
    fn drop(&mut self) {
        UNWRAPPING.with(|slot| slot.borrow_mut().take());
    }
}
