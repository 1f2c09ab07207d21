//! Event Loop Implementation
//!
//! A deterministic, single-threaded macrotask loop with virtual time. It is
//! the default host for the promise scheduler (each scheduled flush becomes a
//! zero-delay macrotask) and the timer behind `Promise::delay`.
//!
//! Time never passes on its own: [`run`] jumps virtual time forward to the
//! next due task, which makes timer-driven promise code fully reproducible in
//! tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::Result;

/// Identifier of a queued macrotask
pub type TaskId = u64;

/// A macrotask to be executed (scheduled flushes, timers)
pub struct Macrotask {
    /// Unique task ID
    pub id: TaskId,
    /// Virtual time (ms) at which the task fires
    pub fire_at: u64,
    callback: Box<dyn FnOnce() -> Result<()>>,
}

/// Result of running the event loop via [`run`] or [`run_for`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Number of macrotasks dequeued and executed
    pub macrotasks_processed: usize,
    /// The virtual time when the run finished
    pub final_time: u64,
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    /// Total macrotasks queued
    pub total_scheduled: u64,
    /// Total macrotasks executed
    pub total_macrotasks: u64,
    /// Macrotasks that returned an error
    pub total_failures: u64,
    /// Most macrotasks queued at once
    pub max_queue_len: usize,
}

/// The event loop holds macrotasks ordered by (fire time, insertion order)
pub struct EventLoop {
    queue: RefCell<BTreeMap<(u64, TaskId), Macrotask>>,
    virtual_time: Cell<u64>,
    next_id: Cell<TaskId>,
    stats: RefCell<EventLoopStats>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop at virtual time 0
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(BTreeMap::new()),
            virtual_time: Cell::new(0),
            next_id: Cell::new(1),
            stats: RefCell::new(EventLoopStats::default()),
        }
    }

    /// Get current virtual time
    pub fn current_time(&self) -> u64 {
        self.virtual_time.get()
    }

    /// Queue `callback` to run once `delay` virtual ms have passed
    pub fn set_timeout(&self, delay: u64, callback: impl FnOnce() -> Result<()> + 'static) -> TaskId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let fire_at = self.virtual_time.get().saturating_add(delay);

        let mut queue = self.queue.borrow_mut();
        queue.insert(
            (fire_at, id),
            Macrotask {
                id,
                fire_at,
                callback: Box::new(callback),
            },
        );
        let mut stats = self.stats.borrow_mut();
        stats.total_scheduled += 1;
        stats.max_queue_len = stats.max_queue_len.max(queue.len());
        id
    }

    /// Queue a zero-delay macrotask
    pub fn schedule(&self, callback: impl FnOnce() -> Result<()> + 'static) -> TaskId {
        self.set_timeout(0, callback)
    }

    /// Check if there are pending macrotasks
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Get the time of the next scheduled macrotask
    pub fn next_macrotask_time(&self) -> Option<u64> {
        self.queue.borrow().keys().next().map(|&(fire_at, _)| fire_at)
    }

    /// Remove the next macrotask due at or before `deadline`
    fn next_due(&self, deadline: u64) -> Option<Macrotask> {
        let mut queue = self.queue.borrow_mut();
        let key = *queue.keys().next()?;
        if key.0 > deadline {
            return None;
        }
        queue.remove(&key)
    }

    /// Run macrotasks until none remain
    ///
    /// A failing macrotask stops the run and returns its error; tasks behind
    /// it stay queued.
    pub fn run(&self) -> Result<RunResult> {
        self.run_until(u64::MAX)
    }

    /// Run every macrotask due within the next `ms` virtual milliseconds,
    /// then leave the clock at that point
    pub fn run_for(&self, ms: u64) -> Result<RunResult> {
        let deadline = self.virtual_time.get().saturating_add(ms);
        let result = self.run_until(deadline)?;
        self.virtual_time.set(deadline);
        Ok(RunResult {
            final_time: deadline,
            ..result
        })
    }

    fn run_until(&self, deadline: u64) -> Result<RunResult> {
        let mut result = RunResult::default();

        while let Some(task) = self.next_due(deadline) {
            if task.fire_at > self.virtual_time.get() {
                self.virtual_time.set(task.fire_at);
            }
            result.macrotasks_processed += 1;
            self.stats.borrow_mut().total_macrotasks += 1;
            if let Err(err) = (task.callback)() {
                self.stats.borrow_mut().total_failures += 1;
                tracing::debug!(task = task.id, error = %err, "macrotask failed");
                return Err(err);
            }
        }

        result.final_time = self.virtual_time.get();
        Ok(result)
    }

    /// Get runtime statistics
    pub fn stats(&self) -> EventLoopStats {
        self.stats.borrow().clone()
    }

    /// Clear all pending work (for cleanup)
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }
}

thread_local! {
    static EVENT_LOOP: EventLoop = EventLoop::new();
}

/// Queue a zero-delay macrotask on this thread's loop
pub fn schedule(callback: impl FnOnce() -> Result<()> + 'static) -> TaskId {
    EVENT_LOOP.with(|el| el.schedule(callback))
}

/// Queue a timer on this thread's loop
pub fn set_timeout(delay: u64, callback: impl FnOnce() -> Result<()> + 'static) -> TaskId {
    EVENT_LOOP.with(|el| el.set_timeout(delay, callback))
}

/// Run this thread's loop until it has no macrotasks left
pub fn run() -> Result<RunResult> {
    EVENT_LOOP.with(|el| el.run())
}

/// Run this thread's loop for `ms` virtual milliseconds
pub fn run_for(ms: u64) -> Result<RunResult> {
    EVENT_LOOP.with(|el| el.run_for(ms))
}

/// Current virtual time of this thread's loop
pub fn now() -> u64 {
    EVENT_LOOP.with(|el| el.current_time())
}

/// Macrotasks queued on this thread's loop
pub fn pending() -> usize {
    EVENT_LOOP.with(|el| el.pending())
}

pub fn stats() -> EventLoopStats {
    EVENT_LOOP.with(|el| el.stats())
}
