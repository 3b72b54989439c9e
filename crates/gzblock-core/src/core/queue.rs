use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::telemetry;
use crate::telemetry::tags;
use crate::types::Block;

/// Bounded FIFO with a one-way closed state.
///
/// Producers block while the queue is full and consumers block while it is
/// empty. [`close`](Self::close) releases everyone: later enqueues fail, and
/// dequeues drain what is left before reporting end-of-stream. Closing is the
/// only cancellation signal the pipelines use.
#[derive(Debug)]
pub struct BoundedBlockQueue<T = Block<'static>> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    high_water: usize,
}

impl<T> BoundedBlockQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                high_water: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Appends `item`, waiting for room while the queue is full.
    ///
    /// Returns `false` without inserting when the queue is closed, including
    /// when it is closed while this call is waiting.
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.lock();
        while !state.closed && state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return false;
        }

        state.items.push_back(item);
        let depth = state.items.len();
        state.high_water = state.high_water.max(depth);
        drop(state);

        self.not_empty.notify_one();
        telemetry::record_histogram(
            tags::METRIC_QUEUE_DEPTH,
            depth as u64,
            &[("subsystem", "queue"), ("op", "enqueue")],
        );
        true
    }

    /// Removes the oldest item, waiting while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and wakes every waiting producer and consumer. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of items ever held at once.
    pub fn high_water_mark(&self) -> usize {
        self.lock().high_water
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_remaining_items_after_close() {
        let queue = BoundedBlockQueue::new(4);
        assert!(queue.enqueue(1u32));
        assert!(queue.enqueue(2u32));
        queue.close();
        queue.close();

        assert!(!queue.enqueue(3));
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = BoundedBlockQueue::<u8>::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
