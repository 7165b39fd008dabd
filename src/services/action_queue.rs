//! Bounded FIFO between the event producers and the dispatcher.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::domain::models::ActionQueueItem;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("action queue is full (capacity {capacity})")]
    Full {
        capacity: usize,
        item: Box<ActionQueueItem>,
    },
    #[error("action queue is closed")]
    Closed,
}

struct QueueState {
    items: VecDeque<ActionQueueItem>,
    closed: bool,
}

/// Thread-safe bounded queue. Producers never block indefinitely: `push`
/// fails fast and `push_timeout` waits a bounded time for room.
pub struct ActionQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl ActionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue without waiting.
    pub fn push(&self, item: ActionQueueItem) -> Result<(), QueueError> {
        self.push_timeout(item, Duration::ZERO)
    }

    /// Enqueue, waiting up to `timeout` for room. A full queue hands the
    /// item back inside the error.
    pub fn push_timeout(&self, item: ActionQueueItem, timeout: Duration) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            if self.not_full.wait_until(&mut state, deadline).timed_out() {
                if state.items.len() < self.capacity && !state.closed {
                    continue;
                }
                return Err(QueueError::Full {
                    capacity: self.capacity,
                    item: Box::new(item),
                });
            }
        }
    }

    /// Dequeue, waiting up to `timeout` for an item. Returns `None` on
    /// timeout or once the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<ActionQueueItem> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let item = state.items.pop_front();
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Refuse further pushes and wake every waiter. Items already queued
    /// can still be popped.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
