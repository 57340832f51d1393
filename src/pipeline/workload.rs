//! What the workers move through the buffer.

use parking_lot::Mutex;

use crate::payload::PayloadRng;

/// Payload source and sink for a [`Pipeline`](super::Pipeline).
///
/// Both methods run inside the role's critical section, so calls of the same
/// kind never overlap and observe the buffer's write (or read) order.
/// Implementations must not panic: a worker that unwinds aborts the process.
pub trait Workload: Sync {
    /// Value carried by one slot.
    type Item: Send;

    /// Creates the value producer `producer` is about to write at `slot`.
    fn produce(&self, producer: usize, slot: usize) -> Self::Item;

    /// Receives the value consumer `consumer` just read from `slot`.
    fn consume(&self, consumer: usize, slot: usize, item: Self::Item);
}

impl<W: Workload + ?Sized> Workload for &W {
    type Item = W::Item;

    fn produce(&self, producer: usize, slot: usize) -> Self::Item {
        (**self).produce(producer, slot)
    }

    fn consume(&self, consumer: usize, slot: usize, item: Self::Item) {
        (**self).consume(consumer, slot, item);
    }
}

/// Random numbers in, log lines out.
#[derive(Debug)]
pub struct RandomWorkload {
    rng: Mutex<PayloadRng>,
}

impl RandomWorkload {
    /// Creates a workload whose payloads derive from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(PayloadRng::new(seed)),
        }
    }
}

impl Workload for RandomWorkload {
    type Item = u32;

    fn produce(&self, producer: usize, slot: usize) -> u32 {
        let value = self.rng.lock().next_u32();
        tracing::info!(producer, value, slot, "produced");
        value
    }

    fn consume(&self, consumer: usize, slot: usize, item: u32) {
        tracing::info!(consumer, slot, value = item, "consumed");
    }
}
