//! Demo payload generation.
//!
//! The pipeline does not care what travels through the buffer; the demo just
//! needs numbers that differ from run to run. [`PayloadRng`] is a small
//! xorshift64 generator: fast, seedable and NOT cryptographically secure.

use std::time::{SystemTime, UNIX_EPOCH};

/// Xorshift64 pseudo-random generator.
#[derive(Debug, Clone)]
pub struct PayloadRng {
    state: u64,
}

impl PayloadRng {
    /// Creates a generator from `seed`. A zero seed is replaced with 1,
    /// since xorshift never leaves the all-zero state.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Seeds from the wall clock.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        Self::new(nanos as u64 ^ (nanos >> 64) as u64)
    }

    /// Next 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Next 32-bit value (high half of the 64-bit output).
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform value in `[0, bound)`, rejection-sampled to avoid modulo bias.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "bound must be non-zero");
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let value = self.next_u64();
            if value < zone {
                return value % bound;
            }
        }
    }
}
