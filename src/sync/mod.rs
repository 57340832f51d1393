//! Counting semaphores with interchangeable implementations.
//!
//! # Primitives
//!
//! - [`BlockingSemaphore`]: counter behind a mutex; waiters sleep on a condvar
//! - [`LockFreeSemaphore`]: counter in an atomic cell; waiters spin with CAS
//!   and yield the processor between attempts
//!
//! Both implement [`Semaphore`], so callers pick a strategy at construction
//! time (see [`SemaphoreFlavor`]) and program against the trait afterwards.
//!
//! # Contract
//!
//! - `wait`: returns only after decrementing a strictly positive count
//! - `post`: increments the count and makes at least one waiter eligible to
//!   run; never blocks, never fails
//! - `try_wait`: decrements and returns `true` iff a permit was available
//!
//! Neither implementation is fair. A thread arriving late may take a permit
//! ahead of a thread that has been waiting longer.
//!
//! # Overflow
//!
//! The count is an `isize`. Posting past `isize::MAX` without matching waits
//! wraps the count; this is outside the contract and is not checked.

mod blocking;
mod lockfree;
mod primitives;

pub use blocking::BlockingSemaphore;
pub use lockfree::LockFreeSemaphore;

use std::fmt;

/// The `{wait, post, try_wait}` capability shared by both implementations.
pub trait Semaphore: Send + Sync + fmt::Debug {
    /// Blocks until a permit is available, then consumes it.
    fn wait(&self);

    /// Adds one permit, making a waiter eligible to resume.
    fn post(&self);

    /// Consumes a permit if one is available right now.
    ///
    /// Returns `false` without blocking otherwise.
    fn try_wait(&self) -> bool;

    /// Returns a snapshot of the permit count.
    ///
    /// Advisory only: the value may be stale by the time it is observed.
    fn permits(&self) -> isize;
}

impl<S: Semaphore + ?Sized> Semaphore for Box<S> {
    fn wait(&self) {
        (**self).wait();
    }

    fn post(&self) {
        (**self).post();
    }

    fn try_wait(&self) -> bool {
        (**self).try_wait()
    }

    fn permits(&self) -> isize {
        (**self).permits()
    }
}

impl<S: Semaphore + ?Sized> Semaphore for std::sync::Arc<S> {
    fn wait(&self) {
        (**self).wait();
    }

    fn post(&self) {
        (**self).post();
    }

    fn try_wait(&self) -> bool {
        (**self).try_wait()
    }

    fn permits(&self) -> isize {
        (**self).permits()
    }
}

/// Selects a semaphore implementation at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemaphoreFlavor {
    /// Mutex + condition variable. Waiters sleep.
    Blocking,
    /// Atomic compare-and-swap. Waiters spin and yield.
    #[default]
    LockFree,
}

impl SemaphoreFlavor {
    /// Returns the canonical name of the flavor.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::LockFree => "lock-free",
        }
    }

    /// Builds a semaphore of this flavor with `permits` initial permits.
    ///
    /// # Panics
    ///
    /// Panics if `permits` exceeds `isize::MAX`.
    #[must_use]
    pub fn build(self, permits: usize) -> Box<dyn Semaphore> {
        match self {
            Self::Blocking => Box::new(BlockingSemaphore::new(permits)),
            Self::LockFree => Box::new(LockFreeSemaphore::new(permits)),
        }
    }
}

impl fmt::Display for SemaphoreFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SemaphoreFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" | "condvar" => Ok(Self::Blocking),
            "lock-free" | "lockfree" | "lock_free" | "atomic" => Ok(Self::LockFree),
            other => Err(format!("unknown semaphore flavor: {other}")),
        }
    }
}

/// Converts a `usize` permit count into the signed representation.
fn initial_count(permits: usize) -> isize {
    isize::try_from(permits)
        .unwrap_or_else(|_| panic!("initial permit count {permits} exceeds isize::MAX"))
}
