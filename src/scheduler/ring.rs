//! FIFO of pooled call queues

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::call_queue::{CallQueue, Task};
use crate::error::Result;

/// Free list of drained call queues, shared by every ring of a scheduler
#[derive(Clone)]
pub struct QueuePool(Rc<RefCell<PoolInner>>);

struct PoolInner {
    free: Vec<CallQueue>,
    capacity: usize,
}

impl QueuePool {
    /// An empty pool handing out queues of `capacity` calls
    pub fn new(capacity: usize) -> Self {
        QueuePool(Rc::new(RefCell::new(PoolInner {
            free: Vec::new(),
            capacity,
        })))
    }

    /// Reuse a free queue, or allocate one
    fn take(&self) -> CallQueue {
        let mut pool = self.0.borrow_mut();
        match pool.free.pop() {
            Some(queue) => queue,
            None => CallQueue::with_capacity(pool.capacity),
        }
    }

    fn give(&self, mut queue: CallQueue) {
        queue.clear();
        let mut pool = self.0.borrow_mut();
        if queue.capacity() == pool.capacity {
            pool.free.push(queue);
        }
    }

    /// Queues waiting for reuse
    pub fn free_count(&self) -> usize {
        self.0.borrow().free.len()
    }

    /// Change the capacity of queues allocated from now on; pooled queues of
    /// another size are discarded
    pub fn set_capacity(&self, capacity: usize) {
        let mut pool = self.0.borrow_mut();
        pool.capacity = capacity.max(1);
        let capacity = pool.capacity;
        pool.free.retain(|q| q.capacity() == capacity);
    }
}

/// Unbounded FIFO built from fixed-size call queues
///
/// Enqueue always appends to the last queue, pulling a fresh one from the pool
/// when it is full. Draining returns emptied front queues to the pool and keeps
/// the last one resident, so steady-state operation allocates nothing.
pub struct Ring {
    queues: VecDeque<CallQueue>,
    pool: QueuePool,
}

impl Ring {
    pub fn new(pool: QueuePool) -> Self {
        Self {
            queues: VecDeque::new(),
            pool,
        }
    }

    /// Queue `callback(arg)` at the back
    pub fn enqueue<A: 'static>(
        &mut self,
        callback: impl FnOnce(A) -> crate::Result<()> + 'static,
        arg: A,
    ) {
        self.enqueue_task(Box::new(move || callback(arg)));
    }

    pub fn enqueue_task(&mut self, task: Task) {
        let needs_queue = self.queues.back().map_or(true, |q| !q.has_space());
        if needs_queue {
            let queue = self.pool.take();
            self.queues.push_back(queue);
        }
        if let Some(back) = self.queues.back_mut() {
            back.push_task(task);
        }
    }

    /// Take the oldest call, recycling front queues as they drain
    pub fn shift(&mut self) -> Option<Task> {
        loop {
            let front = self.queues.front_mut()?;
            if let Some(task) = front.shift() {
                return Some(task);
            }
            if self.queues.len() == 1 {
                return None;
            }
            if let Some(drained) = self.queues.pop_front() {
                self.pool.give(drained);
            }
        }
    }

    /// Run every queued call in order; a failing call aborts the flush and
    /// leaves the rest queued
    pub fn flush(&mut self) -> Result<()> {
        while let Some(task) = self.shift() {
            task()?;
        }
        Ok(())
    }

    /// True when at most one queue is resident and it holds nothing
    pub fn is_empty(&self) -> bool {
        match self.queues.len() {
            0 => true,
            1 => self.queues[0].is_empty(),
            _ => false,
        }
    }

    /// Calls waiting to run
    pub fn len(&self) -> usize {
        self.queues.iter().map(CallQueue::len).sum()
    }

    /// Queues currently owned by the ring
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
