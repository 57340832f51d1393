//! Producer and consumer thread bodies.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use super::{Pipeline, Role, Workload};
use crate::buffer::{Pop, Push};
use crate::payload::PayloadRng;

/// Aborts the process if the worker unwinds.
///
/// A panic inside a critical section leaves a role lock held forever and
/// every peer parked behind it.
struct AbortOnPanic {
    role: Role,
    id: usize,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(role = %self.role, id = self.id, "worker panicked, aborting");
            std::process::abort();
        }
    }
}

pub(super) fn run<W: Workload>(pipeline: &Pipeline<W>, role: Role, id: usize) {
    let _guard = AbortOnPanic { role, id };
    let span = tracing::debug_span!("worker", %role, id);
    let _enter = span.enter();

    let steps = match role {
        Role::Producer => produce_loop(pipeline, id),
        Role::Consumer => consume_loop(pipeline, id),
    };

    tracing::debug!(steps, "stop condition observed");
    pipeline.shutdown.announce_exit(role);
}

fn produce_loop<W: Workload>(pipeline: &Pipeline<W>, id: usize) -> usize {
    let pause = pipeline.config.pacing.producer;
    let mut steps = 0;
    loop {
        sleep(pause);
        let step = pipeline.buffer.push_unless(
            || pipeline.should_stop(),
            |slot| {
                pipeline.produced.fetch_add(1, Ordering::Relaxed);
                pipeline.workload.produce(id, slot)
            },
        );
        if step == Push::Stopped {
            return steps;
        }
        steps += 1;
    }
}

fn consume_loop<W: Workload>(pipeline: &Pipeline<W>, id: usize) -> usize {
    let pacing = pipeline.config.pacing;
    let mut rng = PayloadRng::new(pipeline.worker_seed(Role::Consumer, id));
    let mut steps = 0;
    loop {
        sleep(pacing.consumer_pause(&mut rng));
        let step = pipeline.buffer.pop_unless(
            || pipeline.should_stop(),
            |slot, item| {
                pipeline.workload.consume(id, slot, item);
                pipeline.consumed.fetch_add(1, Ordering::AcqRel);
            },
        );
        if step == Pop::Stopped {
            return steps;
        }
        steps += 1;
    }
}

fn sleep(pause: Duration) {
    if !pause.is_zero() {
        thread::sleep(pause);
    }
}
