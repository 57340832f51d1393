//! Termination handshake between workers and the coordinator.
//!
//! Workers that observe the stop condition post `quit` once and decrement
//! their role's liveness counter. The coordinator waits on `quit` for the
//! first of those signals, then keeps flooding the buffer until both
//! counters are zero.
//!
//! Every worker posts `quit` but the coordinator only waits once, so a
//! finished run leaves `producers + consumers - 1` permits behind. Those
//! are surfaced in the report rather than drained.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::Role;
use crate::sync::{BlockingSemaphore, Semaphore};

#[derive(Debug)]
pub(crate) struct Shutdown {
    quit: BlockingSemaphore,
    producers_alive: AtomicUsize,
    consumers_alive: AtomicUsize,
    /// Forces the stop condition when the coordinator gives up early.
    stop_requested: AtomicBool,
}

impl Shutdown {
    /// Liveness counters start at the configured counts, before any thread
    /// exists, so the coordinator can never observe a spurious zero.
    pub(crate) fn new(producers: usize, consumers: usize) -> Self {
        Self {
            quit: BlockingSemaphore::new(0),
            producers_alive: AtomicUsize::new(producers),
            consumers_alive: AtomicUsize::new(consumers),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn alive(&self, role: Role) -> &AtomicUsize {
        match role {
            Role::Producer => &self.producers_alive,
            Role::Consumer => &self.consumers_alive,
        }
    }

    /// Called by a worker right before its thread returns.
    pub(crate) fn announce_exit(&self, role: Role) {
        self.quit.post();
        let left = self.alive(role).fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(%role, left, "worker announced exit");
    }

    /// Accounts for workers that were never started.
    pub(crate) fn forget(&self, role: Role, count: usize) {
        self.alive(role).fetch_sub(count, Ordering::AcqRel);
    }

    /// Blocks until some worker has announced its exit.
    pub(crate) fn await_first_exit(&self) {
        self.quit.wait();
    }

    pub(crate) fn live_workers(&self, role: Role) -> usize {
        self.alive(role).load(Ordering::Acquire)
    }

    pub(crate) fn any_alive(&self) -> bool {
        self.live_workers(Role::Producer) > 0 || self.live_workers(Role::Consumer) > 0
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// `quit` permits nobody will ever wait for.
    pub(crate) fn stale_permits(&self) -> isize {
        self.quit.permits()
    }
}
