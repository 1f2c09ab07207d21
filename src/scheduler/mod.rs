//! The deferred-call scheduler behind every promise callback
//!
//! [`Async`] owns two [`Ring`]s: `main` for normal work (promise handlers) and
//! `idle` for work that must wait until normal work is exhausted (unhandled
//! rejection probes). Nothing runs synchronously on enqueue: the first enqueue
//! asks the host scheduler to call back later, and that callback flushes.
//!
//! A flush drains `main`, then, if idle work exists, swaps the two rings and
//! keeps going. After the swap, normal work queued by idle callbacks lands
//! behind the idle batch currently running but ahead of any idle work queued
//! since, which is the order the rejection probes rely on.
//!
//! Errors returned by callbacks are not caught: they end the flush and
//! propagate to whoever called it. Whatever is still queued stays queued, and
//! another flush is scheduled automatically.

mod call_queue;
mod ring;

pub use call_queue::{CallQueue, Task, DEFAULT_QUEUE_CAPACITY};
pub use ring::{QueuePool, Ring};

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::{messages, Error, Result};
use crate::event_loop;

/// Host hook that runs a [`Flusher`] later, outside the current call frame
pub type Scheduler = Rc<dyn Fn(Flusher)>;

/// Handle handed to the host scheduler; running it performs the flush
#[derive(Clone)]
pub struct Flusher(Weak<Async>);

impl Flusher {
    /// Flush the scheduler this handle belongs to
    pub fn flush(&self) -> Result<()> {
        match self.0.upgrade() {
            Some(scheduler) => scheduler.scheduled_flush(),
            None => Ok(()),
        }
    }
}

/// Two-priority deferred call scheduler
pub struct Async {
    main: RefCell<Ring>,
    idle: RefCell<Ring>,
    pool: QueuePool,
    flushing: Cell<bool>,
    scheduled: Cell<bool>,
    scheduler: RefCell<Option<Scheduler>>,
    this: Weak<Async>,
}

thread_local! {
    static CURRENT: Rc<Async> = Async::new();
}

/// The scheduler promises on this thread use
pub fn current() -> Rc<Async> {
    CURRENT.with(Rc::clone)
}

/// Run all queued promise work now
pub fn flush() -> Result<()> {
    current().flush()
}

/// Replace the host scheduler of the current thread; `None` restores the
/// default (a zero-delay task on the [`event_loop`])
pub fn set_scheduler(scheduler: Option<Scheduler>) {
    current().set_scheduler(scheduler);
}

fn default_scheduler(flusher: Flusher) {
    event_loop::schedule(move || flusher.flush());
}

impl Async {
    /// A scheduler with the default queue capacity
    pub fn new() -> Rc<Self> {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// A scheduler whose call queues hold `capacity` calls each
    pub fn with_capacity(capacity: usize) -> Rc<Self> {
        let pool = QueuePool::new(capacity);
        Rc::new_cyclic(|this| Async {
            main: RefCell::new(Ring::new(pool.clone())),
            idle: RefCell::new(Ring::new(pool.clone())),
            pool,
            flushing: Cell::new(false),
            scheduled: Cell::new(false),
            scheduler: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Replace the host scheduler; `None` restores the default
    pub fn set_scheduler(&self, scheduler: Option<Scheduler>) {
        *self.scheduler.borrow_mut() = scheduler;
    }

    pub(crate) fn set_queue_capacity(&self, capacity: usize) {
        self.pool.set_capacity(capacity);
    }

    /// Queue normal-priority work
    pub fn enqueue<A: 'static>(&self, callback: impl FnOnce(A) -> Result<()> + 'static, arg: A) {
        self.main.borrow_mut().enqueue(callback, arg);
        self.request_flush();
    }

    /// Queue work that runs only once normal work is exhausted
    pub fn enqueue_idle<A: 'static>(
        &self,
        callback: impl FnOnce(A) -> Result<()> + 'static,
        arg: A,
    ) {
        self.idle.borrow_mut().enqueue(callback, arg);
        self.request_flush();
    }

    /// Run queued work until both rings are empty
    ///
    /// Fails with an assertion error when called from inside a flush.
    pub fn flush(&self) -> Result<()> {
        if self.flushing.replace(true) {
            return Err(Error::assertion(messages::RECURSIVE_FLUSH));
        }
        tracing::trace!("flush started");
        let outcome = self.drain();
        self.flushing.set(false);
        if let Err(err) = &outcome {
            tracing::debug!(error = %err, "flush aborted, remaining work rescheduled");
        }
        if !self.is_empty() && !self.scheduled.get() {
            self.schedule();
        }
        outcome
    }

    fn drain(&self) -> Result<()> {
        loop {
            let next = self.main.borrow_mut().shift();
            match next {
                Some(task) => task()?,
                None => {
                    if self.idle.borrow().is_empty() {
                        return Ok(());
                    }
                    self.main.swap(&self.idle);
                }
            }
        }
    }

    /// Whether both rings are empty
    pub fn is_empty(&self) -> bool {
        self.main.borrow().is_empty() && self.idle.borrow().is_empty()
    }

    /// Calls waiting in (main, idle)
    pub fn pending(&self) -> (usize, usize) {
        (self.main.borrow().len(), self.idle.borrow().len())
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Whether a flush has been handed to the host scheduler and not run yet
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.get()
    }

    fn request_flush(&self) {
        if !self.flushing.get() && !self.scheduled.get() {
            self.schedule();
        }
    }

    fn schedule(&self) {
        self.scheduled.set(true);
        let flusher = Flusher(self.this.clone());
        let scheduler = self.scheduler.borrow().clone();
        tracing::trace!("flush scheduled");
        match scheduler {
            Some(scheduler) => scheduler(flusher),
            None => default_scheduler(flusher),
        }
    }

    fn scheduled_flush(&self) -> Result<()> {
        self.scheduled.set(false);
        self.flush()
    }
}
