//! Semaphore built on a single atomic counter.

use std::fmt;
use std::sync::atomic::Ordering;

use super::primitives::{AtomicIsize, yield_now};
use super::{Semaphore, initial_count};
use crate::error::SemaphoreError;

/// A counting semaphore that never parks the calling thread.
///
/// `wait` loops on compare-and-swap, yielding the processor before every
/// attempt. Under light contention a permit handoff costs a few atomics and
/// no syscalls; under heavy contention waiters burn their scheduling quanta
/// re-reading the counter. Plain yielding is kept over exponential backoff so
/// that a waiter notices a freshly posted permit on its next turn.
pub struct LockFreeSemaphore {
    count: AtomicIsize,
}

impl LockFreeSemaphore {
    /// Creates a semaphore holding `permits` permits.
    ///
    /// # Panics
    ///
    /// Panics if `permits` exceeds `isize::MAX`.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            count: AtomicIsize::new(initial_count(permits)),
        }
    }

    /// Creates a semaphore from a signed count, rejecting negative values.
    pub fn from_count(count: isize) -> Result<Self, SemaphoreError> {
        if count < 0 {
            return Err(SemaphoreError::NegativePermits(count));
        }
        Ok(Self {
            count: AtomicIsize::new(count),
        })
    }

    /// One decrement attempt against an observed value.
    ///
    /// AcqRel on success: the acquire half pairs with the `Release` in
    /// `post`, so writes made before a post are visible after the wait.
    #[inline]
    fn try_decrement(&self, observed: isize) -> bool {
        self.count
            .compare_exchange(observed, observed - 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl fmt::Debug for LockFreeSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeSemaphore")
            .field("permits", &self.permits())
            .finish()
    }
}

impl Semaphore for LockFreeSemaphore {
    fn wait(&self) {
        loop {
            yield_now();

            let observed = self.count.load(Ordering::Relaxed);
            if observed <= 0 {
                continue;
            }
            if self.try_decrement(observed) {
                return;
            }
        }
    }

    fn post(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    fn try_wait(&self) -> bool {
        let observed = self.count.load(Ordering::Relaxed);
        // A lost race is reported as failure, not retried.
        observed > 0 && self.try_decrement(observed)
    }

    fn permits(&self) -> isize {
        self.count.load(Ordering::Relaxed)
    }
}
