//! Multi-producer/multi-consumer pipeline over a [`BoundedBuffer`].
//!
//! A [`Pipeline`] owns everything the workers share: the buffer and its
//! semaphores, the consumed/produced counters, the liveness counters and the
//! `quit` semaphore. Workers are scoped threads borrowing the pipeline.
//!
//! # Lifecycle
//!
//! 1. Producers loop: wait for a free slot, take the producer lock, check the
//!    stop condition, write, release, signal a filled slot.
//! 2. Consumers mirror this and bump the consumed counter inside their lock.
//! 3. Once `consumed >= target`, the next worker to take its lock backs out,
//!    posts `quit` and exits.
//! 4. The coordinator wakes on the first `quit`, floods `full` and `empty`
//!    until no worker is left, then joins them all.
//!
//! # Example
//!
//! ```
//! use sempipe::config::{PipelineConfig, PipelineProfile};
//! use sempipe::pipeline::{Pipeline, RandomWorkload};
//!
//! let config = PipelineConfig::from_profile(PipelineProfile::Testing).target(8);
//! let pipeline = Pipeline::new(config, RandomWorkload::new(1)).unwrap();
//! let report = pipeline.run().unwrap();
//! assert_eq!(report.consumed, 8);
//! ```

mod shutdown;
mod worker;
mod workload;

pub use workload::{RandomWorkload, Workload};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::buffer::BoundedBuffer;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use shutdown::Shutdown;

/// Which side of the buffer a worker sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Writes into the buffer.
    Producer,
    /// Reads from the buffer.
    Consumer,
}

impl Role {
    /// Lowercase role name, used in thread names and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Items read by consumers. Equals the target after a normal run.
    pub consumed: usize,
    /// Items written by producers. At most `consumed + capacity`.
    pub produced: usize,
    /// Times the coordinator posted to `full` and `empty` during shutdown.
    pub flood_rounds: u64,
    /// `quit` permits left unclaimed (one per worker beyond the first).
    pub stale_quit_permits: isize,
    /// Wall time from spawning the first worker to joining the last.
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Items written but never read.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.produced.saturating_sub(self.consumed)
    }
}

/// Coordinator for one producer/consumer run.
pub struct Pipeline<W: Workload> {
    config: PipelineConfig,
    seed: u64,
    buffer: BoundedBuffer<W::Item>,
    workload: W,
    consumed: AtomicUsize,
    produced: AtomicUsize,
    shutdown: Shutdown,
}

impl<W: Workload> Pipeline<W> {
    /// Validates `config` and builds the buffer and semaphores.
    pub fn new(mut config: PipelineConfig, workload: W) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.resolve_seed();
        Ok(Self {
            buffer: BoundedBuffer::new(config.capacity, config.flavor),
            shutdown: Shutdown::new(config.producers, config.consumers),
            consumed: AtomicUsize::new(0),
            produced: AtomicUsize::new(0),
            seed,
            config,
            workload,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Seed the consumer pacing streams derive from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The shared buffer.
    #[must_use]
    pub fn buffer(&self) -> &BoundedBuffer<W::Item> {
        &self.buffer
    }

    /// The workload.
    #[must_use]
    pub fn workload(&self) -> &W {
        &self.workload
    }

    /// Items consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::Acquire)
    }

    /// The stop condition every worker checks under its role lock.
    fn should_stop(&self) -> bool {
        self.consumed.load(Ordering::Acquire) >= self.config.target
            || self.shutdown.stop_requested()
    }

    fn worker_seed(&self, role: Role, id: usize) -> u64 {
        let lane = match role {
            Role::Producer => 0,
            Role::Consumer => 1,
        };
        self.seed ^ (((id as u64) << 1) | lane).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Runs the workers to completion and returns a summary.
    ///
    /// Consumes the pipeline: after shutdown the buffer's semaphores carry
    /// flood permits that no longer match its slots.
    pub fn run(self) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        tracing::info!(
            capacity = self.config.capacity,
            target = self.config.target,
            producers = self.config.producers,
            consumers = self.config.consumers,
            flavor = %self.config.flavor,
            seed = self.seed,
            "pipeline starting"
        );

        // Scoped workers are joined when the scope ends. A worker that panics
        // aborts the process, so the join never observes an unwind.
        let (flood_rounds, spawn_error) = thread::scope(|scope| {
            let mut spawn_error = None;

            'spawn: for (role, count) in [
                (Role::Producer, self.config.producers),
                (Role::Consumer, self.config.consumers),
            ] {
                for id in 0..count {
                    let this = &self;
                    let spawned = thread::Builder::new()
                        .name(format!("{role}-{id}"))
                        .spawn_scoped(scope, move || worker::run(this, role, id));
                    if let Err(source) = spawned {
                        tracing::error!(%role, id, error = %source, "worker spawn failed");
                        self.abandon_unspawned(role, id);
                        spawn_error = Some(PipelineError::Spawn { role, id, source });
                        break 'spawn;
                    }
                }
            }

            if spawn_error.is_none() {
                self.shutdown.await_first_exit();
                tracing::debug!(consumed = self.consumed(), "first worker exited");
            }
            (self.release_parked_workers(), spawn_error)
        });

        if let Some(err) = spawn_error {
            return Err(err);
        }

        let report = PipelineReport {
            consumed: self.consumed(),
            produced: self.produced.load(Ordering::Acquire),
            flood_rounds,
            stale_quit_permits: self.shutdown.stale_permits(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            consumed = report.consumed,
            produced = report.produced,
            flood_rounds = report.flood_rounds,
            "pipeline finished"
        );
        Ok(report)
    }

    /// Forces the stop condition and writes off the workers of `role` from
    /// `first` on, plus every consumer if producers were still being spawned.
    fn abandon_unspawned(&self, role: Role, first: usize) {
        self.shutdown.request_stop();
        match role {
            Role::Producer => {
                self.shutdown.forget(Role::Producer, self.config.producers - first);
                self.shutdown.forget(Role::Consumer, self.config.consumers);
            }
            Role::Consumer => {
                self.shutdown.forget(Role::Consumer, self.config.consumers - first);
            }
        }
    }

    /// Floods `full` and `empty` until every worker has left.
    fn release_parked_workers(&self) -> u64 {
        let mut rounds = 0;
        while self.shutdown.any_alive() {
            self.buffer.flood();
            rounds += 1;
            thread::yield_now();
        }
        tracing::debug!(rounds, "all workers left");
        rounds
    }
}

impl<W: Workload + fmt::Debug> fmt::Debug for Pipeline<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .field("workload", &self.workload)
            .field("consumed", &self.consumed())
            .field("produced", &self.produced.load(Ordering::Relaxed))
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
