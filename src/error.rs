//! Error types for sempipe.
//!
//! The semaphore operations themselves are total: `wait` blocks, `post`
//! always succeeds and `try_wait` reports "no permit" as a plain `false`.
//! The only failure-shaped signals are therefore at the edges:
//!
//! - [`SemaphoreError`]: rejected construction arguments
//! - [`ConfigError`]: invalid pipeline configuration or override
//! - [`PipelineError`]: the coordinator could not start the workers
//!
//! A worker that panics aborts the process instead of surfacing here; the
//! protocol has no way to recover a permit held by a dead thread.

use std::io;

/// Error returned when a semaphore cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// The initial permit count was negative.
    #[error("initial permit count must be non-negative, got {0}")]
    NegativePermits(isize),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The buffer must hold at least one slot.
    #[error("buffer capacity must be > 0")]
    ZeroCapacity,
    /// At least one producer thread is required.
    #[error("producer count must be > 0")]
    NoProducers,
    /// At least one consumer thread is required.
    #[error("consumer count must be > 0")]
    NoConsumers,
    /// The consumer pause range is inverted.
    #[error("consumer pause range is empty: min {min_ms}ms > max {max_ms}ms")]
    InvalidPauseRange {
        /// Lower bound in milliseconds.
        min_ms: u128,
        /// Upper bound in milliseconds.
        max_ms: u128,
    },
    /// An override value failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// An override named a key this crate does not know.
    #[error("unknown config override: {0}")]
    InvalidOverride(String),
}

/// Errors returned by [`Pipeline::run`](crate::pipeline::Pipeline::run).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn {role} worker {id}: {source}")]
    Spawn {
        /// Role of the worker that failed to start.
        role: crate::pipeline::Role,
        /// Worker index within its role.
        id: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
