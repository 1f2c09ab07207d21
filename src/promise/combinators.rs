//! Constructors and combinators over many promises

use std::cell::{Cell, RefCell};
use std::panic::Location;
use std::rc::Rc;

use super::handler::{self, OnFulfilled};
use super::{resolution, Deferred, Inner, Promise, Resolution};
use crate::event_loop;
use crate::reason::Reason;

impl<T: Clone + 'static> Promise<T> {
    /// A promise resolved with `value`; a promise passed in is returned as is
    #[track_caller]
    pub fn resolve(value: impl Into<Resolution<T>>) -> Self {
        match value.into() {
            Resolution::Promise(promise) => promise,
            other => {
                let inner = Inner::new(Location::caller());
                inner.resolve(other);
                Promise::from_inner(inner)
            }
        }
    }

    /// A promise rejected with `reason`
    #[track_caller]
    pub fn reject(reason: impl Into<Reason>) -> Self {
        Self::rejected_at(Location::caller(), reason.into())
    }

    pub(crate) fn rejected_at(location: &'static Location<'static>, reason: Reason) -> Self {
        let inner = Inner::new(location);
        inner.reject(reason);
        Promise::from_inner(inner)
    }

    /// A pending promise plus the handles that settle it
    #[track_caller]
    pub fn defer() -> Deferred<T> {
        let promise = Promise::pending_at(Location::caller());
        let (resolve, reject) = resolution::capture(promise.inner());
        Deferred {
            promise,
            resolve,
            reject,
        }
    }

    /// Fulfill with `value` after `ms` milliseconds of event loop time
    #[track_caller]
    pub fn delayed(value: T, ms: u64) -> Self {
        let promise = Promise::pending_at(Location::caller());
        let target = promise.inner().clone();
        event_loop::set_timeout(ms, move || {
            target.fulfill(value);
            Ok(())
        });
        promise
    }

    /// Pass the fulfillment value on `ms` milliseconds later; rejections
    /// pass on immediately
    #[track_caller]
    pub fn delay(&self, ms: u64) -> Promise<T> {
        let location = Location::caller();
        self.chain(
            location,
            OnFulfilled::Call(Box::new(move |value: T| {
                let delayed = Promise::pending_at(location);
                let target = delayed.inner().clone();
                event_loop::set_timeout(ms, move || {
                    target.fulfill(value);
                    Ok(())
                });
                Ok(Resolution::Promise(delayed))
            })),
            None,
        )
    }

    /// Fulfill with every value, in input order, once all fulfill
    ///
    /// Rejects with the first rejection reported. Every input is observed, so
    /// later rejections never count as unhandled.
    #[track_caller]
    pub fn all(promises: impl IntoIterator<Item = Promise<T>>) -> Promise<Vec<T>> {
        let location = Location::caller();
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        let result = Promise::<Vec<T>>::pending_at(location);
        if promises.is_empty() {
            result.inner().fulfill(Vec::new());
            return result;
        }

        let values = Rc::new(RefCell::new(vec![None; promises.len()]));
        let remaining = Rc::new(Cell::new(promises.len()));
        for (index, promise) in promises.iter().enumerate() {
            let (values, remaining) = (values.clone(), remaining.clone());
            let on_value = result.inner().clone();
            let on_reason = result.inner().clone();
            promise.finish(
                location,
                Some(handler::done_fn(move |value: T| -> Result<(), Reason> {
                    values.borrow_mut()[index] = Some(value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 && on_value.is_pending() {
                        let all = values.take().into_iter().flatten().collect();
                        on_value.fulfill(all);
                    }
                    Ok(())
                })),
                Some(handler::done_fn(move |reason: Reason| -> Result<(), Reason> {
                    if on_reason.is_pending() {
                        on_reason.reject(reason);
                    }
                    Ok(())
                })),
            );
        }
        result
    }

    /// Settle like whichever input settles first; never settles when empty
    #[track_caller]
    pub fn race(promises: impl IntoIterator<Item = Promise<T>>) -> Promise<T> {
        let location = Location::caller();
        let result = Promise::<T>::pending_at(location);
        for promise in promises {
            let on_value = result.inner().clone();
            let on_reason = result.inner().clone();
            promise.finish(
                location,
                Some(handler::done_fn(move |value: T| -> Result<(), Reason> {
                    if on_value.is_pending() {
                        on_value.fulfill(value);
                    }
                    Ok(())
                })),
                Some(handler::done_fn(move |reason: Reason| -> Result<(), Reason> {
                    if on_reason.is_pending() {
                        on_reason.reject(reason);
                    }
                    Ok(())
                })),
            );
        }
        result
    }
}
