// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicUsize, Ordering};

/// A queue for waiters blocked on a condition.
///
/// The kernel runs one thread at a time and suspends only at explicit
/// blocking points, so a waiter re-evaluates its condition in a
/// spin-with-yield loop rather than parking on an OS primitive. A
/// condition that can never be satisfied by another runner must not be
/// waited on; callers are responsible for only sleeping when forward
/// progress is possible.
pub struct WaitQueue {
    waiters: AtomicUsize,
    wakeups: AtomicUsize,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: AtomicUsize::new(0),
            wakeups: AtomicUsize::new(0),
        }
    }

    /// Waits until `cond` returns `Some(_)`, yielding between polls.
    ///
    /// The condition is re-evaluated after every wake-up; spurious
    /// wake-ups are therefore harmless.
    pub fn wait_until<F, R>(&self, mut cond: F) -> R
    where
        F: FnMut() -> Option<R>,
    {
        if let Some(res) = cond() {
            return res;
        }
        self.waiters.fetch_add(1, Ordering::Acquire);
        let res = loop {
            if let Some(res) = cond() {
                break res;
            }
            core::hint::spin_loop();
        };
        self.waiters.fetch_sub(1, Ordering::Release);
        res
    }

    /// Wakes up all waiters on the queue.
    pub fn wake_all(&self) {
        self.wakeups.fetch_add(1, Ordering::Release);
    }

    /// Wakes up one waiter on the queue.
    ///
    /// With condition re-evaluation this is an optimization hint only;
    /// it behaves like [`Self::wake_all`].
    pub fn wake_one(&self) {
        self.wakeups.fetch_add(1, Ordering::Release);
    }

    /// Returns the number of threads currently blocked on the queue.
    pub fn num_waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
