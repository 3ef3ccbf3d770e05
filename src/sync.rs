//! Shared coordination state: the task-done bounded queue and the exhaustion predicate.
//!
//! The standard library's channels give us bounded capacity but not "task done" semantics
//! distinct from dequeue, which the exhaustion predicate in [`SyncContext::exhausted`] depends
//! on (a Writer dequeues an item *before* writing it; shutdown must not race ahead of the
//! write). No channel crate in this crate's dependency surface exposes that directly, so it is
//! built from the primitives the design notes prescribe: a `Mutex`-protected `VecDeque`, an
//! outstanding counter, and a `Condvar`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A bounded FIFO queue with explicit "task done" acknowledgement.
///
/// `push` blocks while the queue is at capacity. `pop_timeout` blocks for up to the given
/// duration waiting for an item, returning `None` on timeout. An item is "outstanding" from the
/// moment it is pushed until `task_done` is called for it; `outstanding` therefore lags behind
/// `pop_timeout` by however long the consumer takes to process the item.
pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct State<T> {
    items: VecDeque<T>,
    outstanding: usize,
}

impl<T> TaskQueue<T> {
    /// Creates a queue that holds at most `capacity` items at once.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; a zero-capacity queue could never hold an item long enough
    /// for `pop_timeout` to observe it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "TaskQueue capacity must be at least 1");
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                outstanding: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Pushes an item, blocking while the queue is full.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.items.push_back(item);
        state.outstanding += 1;
        self.not_empty.notify_one();
    }

    /// Pops one item, waiting up to `timeout` for one to become available.
    ///
    /// Returns `None` if no item arrived within `timeout`. The popped item remains
    /// "outstanding" until [`TaskQueue::task_done`] is called.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            let (next_state, result) = self
                .not_empty
                .wait_timeout(state, timeout)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = next_state;
            if result.timed_out() {
                return None;
            }
        }
    }

    /// Acknowledges completion of one previously-popped item.
    ///
    /// # Panics
    ///
    /// Panics if called more times than items have been popped; this would indicate a bug in
    /// the calling Worker/Writer loop, not a condition a caller should recover from.
    pub fn task_done(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        assert!(state.outstanding > 0, "task_done called with no outstanding items");
        state.outstanding -= 1;
    }

    /// True iff no item has been pushed without a matching `task_done`.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.outstanding == 0
    }
}

/// Process-wide coordination state shared by the common queue and every Worker/Writer.
pub struct SyncContext<T> {
    /// The shared input queue ("the pool") all Workers pull from.
    pub common: TaskQueue<T>,
    eof: AtomicBool,
}

impl<T> SyncContext<T> {
    /// Creates a fresh context with the common queue sized for `capacity` outstanding items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            common: TaskQueue::new(capacity),
            eof: AtomicBool::new(false),
        }
    }

    /// Marks end-of-input. Irreversible.
    pub fn set_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
    }

    /// True once `set_eof` has been called.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    /// `eof ∧ the common queue and every queue in `queues` has zero outstanding items`.
    #[must_use]
    pub fn exhausted<U>(&self, queues: &[&TaskQueue<U>]) -> bool {
        self.is_eof() && self.common.is_drained() && queues.iter().all(|q| q.is_drained())
    }
}
