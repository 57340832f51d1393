//! Semaphore built on a mutex and a condition variable.

use super::primitives::{Condvar, Mutex};
use super::{Semaphore, initial_count};
use crate::error::SemaphoreError;

/// A counting semaphore whose waiters sleep on a condition variable.
///
/// Every `post` that leaves the count positive wakes *all* sleeping waiters.
/// They re-contend for the mutex and all but the winners go back to sleep.
/// That herd costs some throughput but leaves no window for a lost wakeup.
#[derive(Debug)]
pub struct BlockingSemaphore {
    count: Mutex<isize>,
    available: Condvar,
}

impl BlockingSemaphore {
    /// Creates a semaphore holding `permits` permits.
    ///
    /// # Panics
    ///
    /// Panics if `permits` exceeds `isize::MAX`.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self::with_count(initial_count(permits))
    }

    /// Creates a semaphore from a signed count, rejecting negative values.
    pub fn from_count(count: isize) -> Result<Self, SemaphoreError> {
        if count < 0 {
            return Err(SemaphoreError::NegativePermits(count));
        }
        Ok(Self::with_count(count))
    }

    fn with_count(count: isize) -> Self {
        Self {
            count: Mutex::new(count),
            available: Condvar::new(),
        }
    }
}

impl Semaphore for BlockingSemaphore {
    fn wait(&self) {
        let mut count = self.count.lock();
        while *count <= 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    fn post(&self) {
        let mut count = self.count.lock();
        *count = count.wrapping_add(1);
        if *count > 0 {
            self.available.notify_all();
        }
    }

    fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn permits(&self) -> isize {
        *self.count.lock()
    }
}
