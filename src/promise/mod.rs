//! Promise Implementation
//!
//! A Promises/A+ style promise over the deferred-call [`scheduler`]. Callbacks
//! never run inside the call that settles or subscribes to a promise: every
//! handler becomes one scheduler entry, so long chains resolve breadth first
//! with a flat native stack.
//!
//! A promise moves from pending to fulfilled or rejected exactly once. Handlers
//! attached while pending are queued in attachment order; handlers attached
//! later are scheduled immediately, behind whatever already ran.
//!
//! Errors thrown by callbacks are modelled as `Err(Reason)` returns. The only
//! error that ever leaves [`crate::flush`] is the one raised by a `.done()`
//! chain ending in an unhandled rejection.

mod combinators;
mod handler;
mod predicate;
mod release;
mod resolution;
mod tracking;

pub use predicate::{Matcher, Predicate};
pub use resolution::{Completion, Deferred, Reject, Resolution, Resolve, Thenable};

use bitflags::bitflags;
use std::cell::{Cell, RefCell};
use std::convert::identity;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::error::{messages, Error, Result, StateKind, TypeError};
use crate::reason::Reason;
use crate::scheduler;
use crate::trace::{Stack, Trace};
use handler::{DoneFn, DoneHandler, Handler, OnFulfilled, OnRejected, Outcome, ThenHandler};

/// ID counter for Promise tracking
static PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// Diagnostic identity of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        PromiseId(PROMISE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise {}", self.0)
    }
}

bitflags! {
    /// Rejection bookkeeping of a single promise
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub(crate) struct Flags: u8 {
        /// Someone subscribed to, adopted or suppressed this rejection
        const REJECTION_HANDLED = 1;
        /// Already reported as possibly unhandled
        const UNHANDLED_REJECTION_NOTIFIED = 1 << 1;
    }
}

pub(crate) enum State<T> {
    Pending(Vec<Box<dyn Handler<T>>>),
    Fulfilled(T),
    Rejected(Reason),
}

impl<T> State<T> {
    fn kind(&self) -> StateKind {
        match self {
            State::Pending(_) => StateKind::Pending,
            State::Fulfilled(_) => StateKind::Fulfilled,
            State::Rejected(_) => StateKind::Rejected,
        }
    }
}

/// Shared promise state
pub(crate) struct Inner<T> {
    id: PromiseId,
    state: RefCell<State<T>>,
    flags: Cell<Flags>,
    /// Causal trace, present only if long traces were on at creation
    trace: Option<Trace>,
}

impl<T: Clone + 'static> Inner<T> {
    fn new(location: &'static Location<'static>) -> Rc<Self> {
        Self::with_source(location, None)
    }

    /// New pending promise whose trace continues `source`, or else the
    /// promise currently unwrapping
    fn with_source(location: &'static Location<'static>, source: Option<&Trace>) -> Rc<Self> {
        let id = PromiseId::next();
        let trace = config::long_traces().then(|| {
            let here = Trace::new(Stack::capture(location, config::capture_backtraces()));
            match source.cloned().or_else(handler::unwrapping_trace) {
                Some(parent) => here.with_source(&parent, config::trace_limit()),
                None => here,
            }
        });
        config::trace_event(id, "new");
        Rc::new(Inner {
            id,
            state: RefCell::new(State::Pending(Vec::new())),
            flags: Cell::new(Flags::empty()),
            trace,
        })
    }

    pub(crate) fn id(&self) -> PromiseId {
        self.id
    }

    pub(crate) fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub(crate) fn flags(&self) -> Flags {
        self.flags.get()
    }

    pub(crate) fn set_flags(&self, flags: Flags) {
        self.flags.set(self.flags.get() | flags);
    }

    pub(crate) fn kind(&self) -> StateKind {
        self.state.borrow().kind()
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), State::Pending(_))
    }

    /// The outcome, if settled
    fn settled(&self) -> Option<std::result::Result<T, Reason>> {
        match &*self.state.borrow() {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    pub(crate) fn rejection(&self) -> Option<Reason> {
        match &*self.state.borrow() {
            State::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Leave the pending state, handing back the queued handlers
    fn transition(&self, next: State<T>) -> Option<Vec<Box<dyn Handler<T>>>> {
        let mut state = self.state.borrow_mut();
        if !matches!(*state, State::Pending(_)) {
            debug_assert!(false, "{} settled twice", self.id);
            return None;
        }
        match std::mem::replace(&mut *state, next) {
            State::Pending(handlers) => Some(handlers),
            _ => None,
        }
    }

    pub(crate) fn fulfill(self: &Rc<Self>, value: T) {
        if let Some(handlers) = self.transition(State::Fulfilled(value)) {
            config::trace_event(self.id, "fulfill");
            for handler in handlers {
                self.schedule(handler);
            }
        }
    }

    pub(crate) fn reject(self: &Rc<Self>, reason: Reason) {
        if let Some(handlers) = self.transition(State::Rejected(reason.clone())) {
            if let Some(trace) = &self.trace {
                reason.attach_trace(trace);
            }
            config::trace_event(self.id, "reject");
            for handler in handlers {
                self.schedule(handler);
            }
            tracking::track(self);
        }
    }

    /// Settle according to the resolution procedure
    pub(crate) fn resolve(self: &Rc<Self>, value: Resolution<T>) {
        config::trace_event(self.id, "resolve");
        match value {
            Resolution::Value(value) => self.fulfill(value),
            Resolution::Promise(promise) => self.follow(promise.inner),
            Resolution::Thenable(thenable) => {
                let (resolve, reject) = resolution::capture(self);
                if let Err(reason) = thenable.then(resolve, reject.clone()) {
                    reject.call(reason);
                }
            }
        }
    }

    /// Adopt the eventual state of `source`
    fn follow(self: &Rc<Self>, source: Rc<Inner<T>>) {
        if Rc::ptr_eq(self, &source) {
            self.reject(Reason::new(TypeError::new(messages::RESOLVE_TO_SELF)));
            return;
        }
        config::trace_event(self.id, "follow");
        tracking::set_rejection_handled(&source);
        match source.settled() {
            Some(Ok(value)) => self.fulfill(value),
            Some(Err(reason)) => self.reject(reason),
            None => source.subscribe(Box::new(ThenHandler::new(
                self.clone(),
                OnFulfilled::Forward(identity),
                None,
            ))),
        }
    }

    /// Attach a handler; once settled it goes straight to the scheduler
    fn subscribe(self: &Rc<Self>, handler: Box<dyn Handler<T>>) {
        tracking::set_rejection_handled(self);
        if let State::Pending(handlers) = &mut *self.state.borrow_mut() {
            handlers.push(handler);
            return;
        }
        self.schedule(handler);
    }

    fn schedule(self: &Rc<Self>, handler: Box<dyn Handler<T>>) {
        scheduler::current().enqueue(
            |(source, handler): (Rc<Inner<T>>, Box<dyn Handler<T>>)| source.run_handler(handler),
            (self.clone(), handler),
        );
    }

    /// Run one handler against the settled outcome
    fn run_handler(self: Rc<Self>, handler: Box<dyn Handler<T>>) -> Result<()> {
        match self.settled() {
            Some(settled) => handler.react(&self, settled),
            None => Err(Error::assertion(format!("{} unwrapped while pending", self.id))),
        }
    }

    /// Trace for a `.done()` call site: always captured, with this
    /// promise's history when it has one
    fn done_trace(&self, location: &'static Location<'static>) -> Trace {
        let here = Trace::new(Stack::capture(location, config::capture_backtraces()));
        match &self.trace {
            Some(source) => here.with_source(source, config::trace_limit()),
            None => here,
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let State::Pending(handlers) = self.state.get_mut() {
            if !handlers.is_empty() {
                let parked = handlers.drain(..).map(|handler| handler.into_any()).collect();
                release::release(parked);
            }
        }
    }
}

/// A value that will be available later, or a reason why not
pub struct Promise<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Create a promise settled by `executor`
    ///
    /// The first call to either handle wins; later calls are ignored. An
    /// `Err` returned before either handle was used rejects the promise.
    #[track_caller]
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T>, Reject<T>) -> std::result::Result<(), Reason>,
    {
        let inner = Inner::new(Location::caller());
        let (resolve, reject) = resolution::capture(&inner);
        if let Err(reason) = executor(resolve, reject.clone()) {
            reject.call(reason);
        }
        Promise { inner }
    }

    pub(crate) fn from_inner(inner: Rc<Inner<T>>) -> Self {
        Promise { inner }
    }

    pub(crate) fn pending_at(location: &'static Location<'static>) -> Self {
        Promise {
            inner: Inner::new(location),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<Inner<T>> {
        &self.inner
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    /// Causal trace captured at creation (long traces only)
    pub fn trace(&self) -> Option<&Trace> {
        self.inner.trace()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.kind() == StateKind::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.inner.kind() == StateKind::Rejected
    }

    /// The fulfillment value; fails unless fulfilled
    pub fn value(&self) -> Result<T> {
        match &*self.inner.state.borrow() {
            State::Fulfilled(value) => Ok(value.clone()),
            other => Err(Error::invalid_state(StateKind::Fulfilled, other.kind())),
        }
    }

    /// The rejection reason; fails unless rejected
    pub fn reason(&self) -> Result<Reason> {
        match &*self.inner.state.borrow() {
            State::Rejected(reason) => Ok(reason.clone()),
            other => Err(Error::invalid_state(StateKind::Rejected, other.kind())),
        }
    }

    /// Transform the fulfillment value
    ///
    /// The callback may return a plain value, another promise or a
    /// [`Resolution`]; returning `Err` rejects the resulting promise.
    /// Rejections pass through unchanged.
    #[track_caller]
    pub fn then<U, F, R>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> std::result::Result<R, Reason> + 'static,
        R: Into<Resolution<U>>,
    {
        self.chain(Location::caller(), OnFulfilled::call(on_fulfilled), None)
    }

    /// [`then`](Self::then) with a rejection callback as well
    #[track_caller]
    pub fn then_with<U, F, R, G, S>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> std::result::Result<R, Reason> + 'static,
        R: Into<Resolution<U>>,
        G: FnOnce(Reason) -> std::result::Result<S, Reason> + 'static,
        S: Into<Resolution<U>>,
    {
        self.chain(
            Location::caller(),
            OnFulfilled::call(on_fulfilled),
            Some(handler::on_rejected(on_rejected)),
        )
    }

    /// Recover from a rejection
    ///
    /// On an already fulfilled promise this returns the promise itself.
    #[track_caller]
    pub fn catch<G, S>(&self, on_rejected: G) -> Promise<T>
    where
        G: FnOnce(Reason) -> std::result::Result<S, Reason> + 'static,
        S: Into<Resolution<T>>,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        self.chain(
            Location::caller(),
            OnFulfilled::Forward(identity),
            Some(handler::on_rejected(on_rejected)),
        )
    }

    /// Recover only from rejections matching `predicate`; others pass
    /// through with the very same reason
    ///
    /// An empty class list is a usage error: the result rejects with a
    /// `TypeError`.
    #[track_caller]
    pub fn catch_if<G, S>(&self, predicate: Predicate, on_rejected: G) -> Promise<T>
    where
        G: FnOnce(Reason) -> std::result::Result<S, Reason> + 'static,
        S: Into<Resolution<T>>,
    {
        let location = Location::caller();
        if let Err(reason) = predicate.validate() {
            return Promise::rejected_at(location, reason);
        }
        if self.is_fulfilled() {
            return self.clone();
        }
        let on_rejected = move |reason: Reason| -> Outcome<T> {
            if predicate.matches(&reason) {
                on_rejected(reason).map(Into::into)
            } else {
                Err(reason)
            }
        };
        self.chain(
            location,
            OnFulfilled::Forward(identity),
            Some(Box::new(on_rejected)),
        )
    }

    fn chain<U: Clone + 'static>(
        &self,
        location: &'static Location<'static>,
        on_fulfilled: OnFulfilled<T, U>,
        on_rejected: Option<OnRejected<U>>,
    ) -> Promise<U> {
        let slave = Inner::with_source(location, self.inner.trace());
        config::trace_event(self.inner.id, "then");
        if on_rejected.is_none() {
            if let Some(reason) = self.inner.rejection() {
                tracking::set_rejection_handled(&self.inner);
                slave.reject(reason);
                return Promise { inner: slave };
            }
        }
        self.inner.subscribe(Box::new(ThenHandler::new(
            slave.clone(),
            on_fulfilled,
            on_rejected,
        )));
        Promise { inner: slave }
    }

    /// End the chain: an unhandled rejection escapes the next flush
    #[track_caller]
    pub fn done(&self) {
        self.finish(Location::caller(), None, None);
    }

    /// End the chain with a fulfillment callback
    ///
    /// A failing callback, or a returned promise that rejects, is reported
    /// like an unhandled rejection.
    #[track_caller]
    pub fn done_then<F, C>(&self, on_fulfilled: F)
    where
        F: FnOnce(T) -> std::result::Result<C, Reason> + 'static,
        C: Completion,
    {
        self.finish(Location::caller(), Some(handler::done_fn(on_fulfilled)), None);
    }

    #[track_caller]
    pub fn done_with<F, C, G, D>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(T) -> std::result::Result<C, Reason> + 'static,
        C: Completion,
        G: FnOnce(Reason) -> std::result::Result<D, Reason> + 'static,
        D: Completion,
    {
        self.finish(
            Location::caller(),
            Some(handler::done_fn(on_fulfilled)),
            Some(handler::done_fn(on_rejected)),
        );
    }

    #[track_caller]
    pub fn done_catch<G, D>(&self, on_rejected: G)
    where
        G: FnOnce(Reason) -> std::result::Result<D, Reason> + 'static,
        D: Completion,
    {
        self.finish(Location::caller(), None, Some(handler::done_fn(on_rejected)));
    }

    pub(crate) fn finish(
        &self,
        location: &'static Location<'static>,
        on_fulfilled: Option<DoneFn<T>>,
        on_rejected: Option<DoneFn<Reason>>,
    ) {
        config::trace_event(self.inner.id, "done");
        if on_fulfilled.is_none() && self.is_fulfilled() {
            return;
        }
        let trace = self.inner.done_trace(location);
        self.inner
            .subscribe(Box::new(DoneHandler::new(on_fulfilled, on_rejected, trace)));
    }

    /// Run `handler` once settled, whatever the outcome
    ///
    /// The result settles like this promise once the handler (and any
    /// promise it returns) completes, unless the handler fails: then that
    /// failure wins.
    #[track_caller]
    pub fn finally<F, C>(&self, handler: F) -> Promise<T>
    where
        F: FnOnce(&Promise<T>) -> std::result::Result<C, Reason> + 'static,
        C: Completion,
    {
        let location = Location::caller();
        let slot = Rc::new(Cell::new(Some(handler)));
        let (fulfilled_slot, settled) = (slot.clone(), self.clone());
        let rejected_settled = self.clone();
        let waited: Promise<()> = self.chain(
            location,
            OnFulfilled::Call(Box::new(move |_: T| run_finally(&fulfilled_slot, &settled))),
            Some(Box::new(move |_: Reason| run_finally(&slot, &rejected_settled))),
        );
        let original = self.clone();
        waited.chain(
            location,
            OnFulfilled::Call(Box::new(move |_: ()| Ok(Resolution::Promise(original)))),
            None,
        )
    }

    /// Replace the fulfillment value with `value`
    #[track_caller]
    pub fn returns<U: Clone + 'static>(&self, value: impl Into<Resolution<U>>) -> Promise<U> {
        let value = value.into();
        self.chain(
            Location::caller(),
            OnFulfilled::Call(Box::new(move |_: T| Ok(value))),
            None,
        )
    }

    /// Turn a fulfillment into a rejection with `reason`
    #[track_caller]
    pub fn throws(&self, reason: impl Into<Reason>) -> Promise<T> {
        let reason = reason.into();
        self.chain(
            Location::caller(),
            OnFulfilled::Call(Box::new(move |_: T| Err(reason))),
            None,
        )
    }

    /// Mark a rejection as handled without attaching a consumer
    pub fn suppress_unhandled_rejections(&self) {
        tracking::set_rejection_handled(&self.inner);
    }

    /// State summary plus the causal trace, if any
    pub fn inspect(&self) -> String {
        match &self.inner.trace {
            Some(trace) => format!("{}\n{}", self, trace.inspect()),
            None => self.to_string(),
        }
    }
}

fn run_finally<T, F, C>(
    slot: &Cell<Option<F>>,
    settled: &Promise<T>,
) -> std::result::Result<Resolution<()>, Reason>
where
    F: FnOnce(&Promise<T>) -> std::result::Result<C, Reason>,
    C: Completion,
{
    let Some(handler) = slot.take() else {
        return Ok(Resolution::Value(()));
    };
    Ok(match handler(settled)?.into_promise() {
        Some(promise) => Resolution::Promise(promise),
        None => Resolution::Value(()),
    })
}

impl<T: Clone + 'static> fmt::Display for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}: {}]", self.inner.id, self.inner.kind())
    }
}

impl<T: Clone + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.inner.id.get())
            .field("state", &self.inner.kind())
            .finish()
    }
}
