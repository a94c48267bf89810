//! Thread-safe FIFO hand-off buffer between two adjacent stages.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::orange::Orange;

/// Unbounded, synchronized FIFO of oranges shared by one producer role and one consumer role.
pub struct StageQueue {
    inner: Mutex<StageQueueState>,
    available: Condvar,
}

struct StageQueueState {
    queue: VecDeque<Orange>,
    pushed: u64,
    popped: u64,
}

impl StageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StageQueueState {
                queue: VecDeque::new(),
                pushed: 0,
                popped: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Append to the tail. Never blocks beyond the internal lock.
    pub fn push(&self, orange: Orange) {
        let mut guard = self.inner.lock();
        guard.queue.push_back(orange);
        guard.pushed += 1;
        self.available.notify_one();
    }

    /// Remove the head immediately, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<Orange> {
        let mut guard = self.inner.lock();
        Self::pop_locked(&mut guard)
    }

    /// Wait up to `timeout` for an orange. Returns `None` on timeout so the caller can
    /// re-check its running flag.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Orange> {
        let mut guard = self.inner.lock();
        if guard.queue.is_empty() {
            // A spurious wakeup or a lost race to another consumer both end as `None`.
            self.available.wait_for(&mut guard, timeout);
        }
        Self::pop_locked(&mut guard)
    }

    fn pop_locked(state: &mut StageQueueState) -> Option<Orange> {
        let orange = state.queue.pop_front()?;
        state.popped += 1;
        Some(orange)
    }

    /// Current number of resident oranges.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Oranges ever inserted.
    pub fn pushed(&self) -> u64 {
        self.inner.lock().pushed
    }

    /// Oranges ever removed.
    pub fn popped(&self) -> u64 {
        self.inner.lock().popped
    }
}

impl Default for StageQueue {
    fn default() -> Self {
        Self::new()
    }
}
