//! Flat, reusable batch of deferred calls

use crate::error::Result;

/// A deferred call: a callback already bound to its argument
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Callback pairs per queue before the ring moves on to another queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Fixed-capacity FIFO of deferred calls
///
/// Slots are consumed through a read cursor: each task is taken out of its
/// slot *before* it runs, so a task that fails leaves the queue positioned on
/// the next entry. A later flush continues from there; nothing is re-run and
/// nothing is skipped. The capacity is a batching knob, not a hard limit.
pub struct CallQueue {
    slots: Vec<Option<Task>>,
    first: usize,
    capacity: usize,
}

impl CallQueue {
    /// Create a queue with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue holding `capacity` calls per batch
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            first: 0,
            capacity,
        }
    }

    /// Queue `callback(arg)`; returns whether there is room for another call
    pub fn push<A: 'static>(
        &mut self,
        callback: impl FnOnce(A) -> Result<()> + 'static,
        arg: A,
    ) -> bool {
        self.push_task(Box::new(move || callback(arg)))
    }

    /// Queue an already bound task; returns whether there is room for another
    pub fn push_task(&mut self, task: Task) -> bool {
        self.slots.push(Some(task));
        self.has_space()
    }

    /// Whether another call fits in the current batch
    pub fn has_space(&self) -> bool {
        self.slots.len() < self.capacity
    }

    /// Take the next call, advancing the cursor
    ///
    /// Once the last call is taken the queue rewinds to empty, ready for reuse.
    pub fn shift(&mut self) -> Option<Task> {
        if self.first >= self.slots.len() {
            return None;
        }
        let task = self.slots[self.first].take();
        self.first += 1;
        if self.first == self.slots.len() {
            self.clear();
        }
        task
    }

    /// Run every queued call in order
    ///
    /// The first failing call aborts this flush; the remaining calls stay
    /// queued for the next one.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(task) = self.shift() {
            task()?;
        }
        Ok(())
    }

    /// Number of calls not yet run
    pub fn len(&self) -> usize {
        self.slots.len() - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop any remaining calls and rewind
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.first = 0;
    }
}

impl Default for CallQueue {
    fn default() -> Self {
        Self::new()
    }
}
