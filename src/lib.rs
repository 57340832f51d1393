//! Counting semaphores and a bounded-buffer pipeline built on them.
//!
//! # Layout
//!
//! - [`sync`]: the [`Semaphore`](sync::Semaphore) capability and its two
//!   implementations, [`BlockingSemaphore`](sync::BlockingSemaphore)
//!   (mutex + condvar) and [`LockFreeSemaphore`](sync::LockFreeSemaphore)
//!   (atomic CAS)
//! - [`buffer`]: a circular buffer coordinated by four semaphores
//! - [`pipeline`]: producer/consumer threads around the buffer, with a
//!   `quit` handshake for shutdown
//! - [`config`]: capacity, item target and thread counts
//! - [`error`]: construction, configuration and run errors
//!
//! # Example
//!
//! ```
//! use sempipe::sync::{LockFreeSemaphore, Semaphore};
//!
//! let sem = LockFreeSemaphore::new(1);
//! sem.wait();
//! assert!(!sem.try_wait());
//! sem.post();
//! assert!(sem.try_wait());
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod sync;
pub mod test_utils;

pub use buffer::BoundedBuffer;
pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError, SemaphoreError};
pub use pipeline::{Pipeline, PipelineReport};
pub use sync::{BlockingSemaphore, LockFreeSemaphore, Semaphore, SemaphoreFlavor};
