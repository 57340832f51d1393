//! Bounded circular buffer coordinated by four semaphores.
//!
//! | Semaphore       | Initial  | Meaning                                 |
//! |-----------------|----------|-----------------------------------------|
//! | `empty`         | capacity | free slots; taken before a write        |
//! | `full`          | 0        | filled slots; taken before a read       |
//! | `producer_lock` | 1        | one producer touches `tail` at a time   |
//! | `consumer_lock` | 1        | one consumer touches `head` at a time   |
//!
//! Each role takes its counting permit first and its lock second, and
//! releases in reverse. A slot is never read before it is written (`full`)
//! and never rewritten before it is read (`empty`).
//!
//! # Closing
//!
//! [`BoundedBuffer::flood`] marks the buffer closed and posts one permit to
//! each of `full` and `empty`, so parked producers and consumers wake up.
//! Those extra permits no longer correspond to slots; every path checks the
//! closed flag while holding its role lock and backs out without touching
//! the slots.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sync::{Semaphore, SemaphoreFlavor};

/// Outcome of a producer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// The value was written at `slot`.
    Stored {
        /// Slot index that received the value.
        slot: usize,
    },
    /// The stop condition held (or the buffer was closed); nothing written.
    Stopped,
}

/// Outcome of a consumer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// A value was read from `slot` and handed to the callback.
    Taken {
        /// Slot index the value was read from.
        slot: usize,
    },
    /// The stop condition held (or the buffer was closed); nothing read.
    Stopped,
}

/// A fixed-capacity FIFO shared by any number of producers and consumers.
pub struct BoundedBuffer<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    /// Next slot to read. Guarded by `consumer_lock`.
    head: UnsafeCell<usize>,
    /// Next slot to write. Guarded by `producer_lock`.
    tail: UnsafeCell<usize>,
    empty: Box<dyn Semaphore>,
    full: Box<dyn Semaphore>,
    producer_lock: Box<dyn Semaphore>,
    consumer_lock: Box<dyn Semaphore>,
    closed: AtomicBool,
    flavor: SemaphoreFlavor,
}

// SAFETY: `head` and `tail` are only touched while holding the matching
// role lock. A slot is written only by a producer holding an `empty` permit
// for it and read only by a consumer holding a `full` permit for it, so no
// slot is accessed from two threads at once. Values cross threads, hence
// `T: Send`.
unsafe impl<T: Send> Sync for BoundedBuffer<T> {}

impl<T> BoundedBuffer<T> {
    /// Creates a buffer with `capacity` slots, using `flavor` for all four
    /// semaphores.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize, flavor: SemaphoreFlavor) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        let slots = (0..capacity).map(|_| UnsafeCell::new(None)).collect();
        Self {
            slots,
            head: UnsafeCell::new(0),
            tail: UnsafeCell::new(0),
            empty: flavor.build(capacity),
            full: flavor.build(0),
            producer_lock: flavor.build(1),
            consumer_lock: flavor.build(1),
            closed: AtomicBool::new(false),
            flavor,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Semaphore implementation backing this buffer.
    #[must_use]
    pub fn flavor(&self) -> SemaphoreFlavor {
        self.flavor
    }

    /// Snapshot of the `empty` count.
    #[must_use]
    pub fn free_permits(&self) -> isize {
        self.empty.permits()
    }

    /// Snapshot of the `full` count.
    #[must_use]
    pub fn filled_permits(&self) -> isize {
        self.full.permits()
    }

    /// Returns true once [`flood`](Self::flood) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes `value`, blocking while the buffer is full.
    ///
    /// Returns the slot written, or gives the value back if the buffer is
    /// closed.
    pub fn push(&self, value: T) -> Result<usize, T> {
        self.empty.wait();
        self.producer_lock.wait();
        if self.is_closed() {
            self.producer_lock.post();
            return Err(value);
        }
        // SAFETY: we hold `producer_lock` and an `empty` permit.
        let slot = unsafe { self.write_tail(value) };
        self.producer_lock.post();
        self.full.post();
        Ok(slot)
    }

    /// Reads the oldest value, blocking while the buffer is empty.
    ///
    /// Returns `None` if the buffer is closed.
    pub fn pop(&self) -> Option<T> {
        self.full.wait();
        self.consumer_lock.wait();
        if self.is_closed() {
            self.consumer_lock.post();
            return None;
        }
        // SAFETY: we hold `consumer_lock` and a `full` permit.
        let (_, value) = unsafe { self.read_head() };
        self.consumer_lock.post();
        self.empty.post();
        Some(value)
    }

    /// One producer step with a stop check.
    ///
    /// Waits for a free slot and the producer lock, then evaluates `stop`.
    /// If it holds, the lock is released and [`Push::Stopped`] returned; the
    /// free-slot permit is kept, as the caller is leaving. Otherwise `make`
    /// is called with the slot index and its result is stored there.
    ///
    /// `stop` and `make` run inside the producer critical section. If either
    /// panics the producer lock is never released.
    pub fn push_unless(
        &self,
        stop: impl FnOnce() -> bool,
        make: impl FnOnce(usize) -> T,
    ) -> Push {
        self.empty.wait();
        self.producer_lock.wait();
        if self.is_closed() || stop() {
            self.producer_lock.post();
            return Push::Stopped;
        }
        // SAFETY: we hold `producer_lock`.
        let slot = unsafe { *self.tail.get() };
        let value = make(slot);
        // SAFETY: we hold `producer_lock` and an `empty` permit.
        unsafe { self.write_tail(value) };
        self.producer_lock.post();
        self.full.post();
        Push::Stored { slot }
    }

    /// One consumer step with a stop check; the mirror of
    /// [`push_unless`](Self::push_unless).
    ///
    /// `take` receives the slot index and the value while the consumer lock
    /// is still held.
    pub fn pop_unless(&self, stop: impl FnOnce() -> bool, take: impl FnOnce(usize, T)) -> Pop {
        self.full.wait();
        self.consumer_lock.wait();
        if self.is_closed() || stop() {
            self.consumer_lock.post();
            return Pop::Stopped;
        }
        // SAFETY: we hold `consumer_lock` and a `full` permit.
        let (slot, value) = unsafe { self.read_head() };
        take(slot, value);
        self.consumer_lock.post();
        self.empty.post();
        Pop::Taken { slot }
    }

    /// Writes `value` only if a slot is free right now.
    ///
    /// May still wait briefly for the producer lock. Gives the value back
    /// when the buffer is full or closed.
    pub fn try_push(&self, value: T) -> Result<usize, T> {
        if !self.empty.try_wait() {
            return Err(value);
        }
        self.producer_lock.wait();
        if self.is_closed() {
            self.producer_lock.post();
            return Err(value);
        }
        // SAFETY: we hold `producer_lock` and an `empty` permit.
        let slot = unsafe { self.write_tail(value) };
        self.producer_lock.post();
        self.full.post();
        Ok(slot)
    }

    /// Reads the oldest value only if one is available right now.
    pub fn try_pop(&self) -> Option<T> {
        if !self.full.try_wait() {
            return None;
        }
        self.consumer_lock.wait();
        if self.is_closed() {
            self.consumer_lock.post();
            return None;
        }
        // SAFETY: we hold `consumer_lock` and a `full` permit.
        let (_, value) = unsafe { self.read_head() };
        self.consumer_lock.post();
        self.empty.post();
        Some(value)
    }

    /// Closes the buffer and posts one permit to each of `full` and `empty`.
    ///
    /// A thread parked on either semaphore wakes, sees the closed flag under
    /// its role lock and returns without touching a slot. Call repeatedly
    /// until every worker has left; each call wakes at most one waiter per
    /// side.
    pub fn flood(&self) {
        // Store before posting: a waiter that takes one of these permits
        // synchronizes with the post and therefore sees the flag.
        self.closed.store(true, Ordering::Release);
        self.full.post();
        self.empty.post();
    }

    /// # Safety
    ///
    /// The caller must hold `producer_lock` and an `empty` permit.
    unsafe fn write_tail(&self, value: T) -> usize {
        // SAFETY: exclusive per the caller contract.
        let tail = unsafe { &mut *self.tail.get() };
        let slot = *tail;
        // SAFETY: the `empty` permit reserves this slot for us.
        let previous = unsafe { (*self.slots[slot].get()).replace(value) };
        debug_assert!(previous.is_none(), "slot {slot} overwritten before it was read");
        *tail = (slot + 1) % self.slots.len();
        slot
    }

    /// # Safety
    ///
    /// The caller must hold `consumer_lock` and a `full` permit.
    unsafe fn read_head(&self) -> (usize, T) {
        // SAFETY: exclusive per the caller contract.
        let head = unsafe { &mut *self.head.get() };
        let slot = *head;
        // SAFETY: the `full` permit guarantees the producer finished this slot.
        let value = unsafe { (*self.slots[slot].get()).take() }
            .unwrap_or_else(|| panic!("slot {slot} read before it was written"));
        *head = (slot + 1) % self.slots.len();
        (slot, value)
    }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity())
            .field("flavor", &self.flavor)
            .field("free", &self.free_permits())
            .field("filled", &self.filled_permits())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const FLAVORS: [SemaphoreFlavor; 2] = [SemaphoreFlavor::Blocking, SemaphoreFlavor::LockFree];

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn fifo_within_capacity() {
        init_test("fifo_within_capacity");
        for flavor in FLAVORS {
            let buf = BoundedBuffer::new(3, flavor);
            assert_eq!(buf.push(1), Ok(0));
            assert_eq!(buf.push(2), Ok(1));
            assert_eq!(buf.push(3), Ok(2));
            let popped: Vec<_> = (0..3).filter_map(|_| buf.pop()).collect();
            crate::assert_with_log!(popped == [1, 2, 3], "fifo order", [1, 2, 3], popped);
            // Indices wrap.
            assert_eq!(buf.push(4), Ok(0));
            assert_eq!(buf.pop(), Some(4));
        }
        crate::test_complete!("fifo_within_capacity");
    }

    #[test]
    fn permit_balance_at_rest() {
        init_test("permit_balance_at_rest");
        for flavor in FLAVORS {
            let buf = BoundedBuffer::new(4, flavor);
            for value in 0..3 {
                buf.push(value).expect("open");
                let sum = buf.free_permits() + buf.filled_permits();
                crate::assert_with_log!(sum == 4, "free + filled", 4, sum);
            }
            buf.pop().expect("value");
            let sum = buf.free_permits() + buf.filled_permits();
            crate::assert_with_log!(sum == 4, "free + filled after pop", 4, sum);
            crate::assert_with_log!(buf.filled_permits() == 2, "filled", 2, buf.filled_permits());
        }
        crate::test_complete!("permit_balance_at_rest");
    }

    #[test]
    fn try_push_refuses_when_full() {
        init_test("try_push_refuses_when_full");
        for flavor in FLAVORS {
            let buf = BoundedBuffer::new(2, flavor);
            assert!(buf.try_push('a').is_ok());
            assert!(buf.try_push('b').is_ok());
            let refused = buf.try_push('c');
            crate::assert_with_log!(refused == Err('c'), "value returned", Err::<usize, _>('c'), refused);
            assert_eq!(buf.try_pop(), Some('a'));
            assert_eq!(buf.try_pop(), Some('b'));
            assert_eq!(buf.try_pop(), None);
        }
        crate::test_complete!("try_push_refuses_when_full");
    }

    #[test]
    fn stop_releases_lock() {
        init_test("stop_releases_lock");
        for flavor in FLAVORS {
            let buf = BoundedBuffer::<usize>::new(2, flavor);
            let outcome = buf.push_unless(|| true, |_| unreachable!("stopped producer made a value"));
            crate::assert_with_log!(outcome == Push::Stopped, "stopped", Push::Stopped, outcome);
            // Lock was released: a second producer gets through.
            let outcome = buf.push_unless(|| false, |slot| slot * 10);
            crate::assert_with_log!(
                outcome == Push::Stored { slot: 0 },
                "stored",
                Push::Stored { slot: 0 },
                outcome
            );

            let mut seen = None;
            let outcome = buf.pop_unless(|| false, |slot, value| seen = Some((slot, value)));
            assert_eq!(outcome, Pop::Taken { slot: 0 });
            assert_eq!(seen, Some((0, 0)));
        }
        crate::test_complete!("stop_releases_lock");
    }

    #[test]
    fn fifth_push_blocks_until_pop() {
        init_test("fifth_push_blocks_until_pop");
        for flavor in FLAVORS {
            let buf = Arc::new(BoundedBuffer::new(4, flavor));
            for value in [10, 20, 30, 40] {
                buf.push(value).expect("open");
            }

            let producer = {
                let buf = Arc::clone(&buf);
                thread::spawn(move || buf.push(50))
            };
            thread::sleep(Duration::from_millis(30));
            let finished = producer.is_finished();
            crate::assert_with_log!(!finished, "fifth push parked", false, finished);

            assert_eq!(buf.pop(), Some(10));
            let slot = producer.join().expect("producer panicked");
            crate::assert_with_log!(slot == Ok(0), "wrote into freed slot", Ok::<_, i32>(0), slot);

            let rest: Vec<_> = (0..4).filter_map(|_| buf.pop()).collect();
            assert_eq!(rest, [20, 30, 40, 50]);
        }
        crate::test_complete!("fifth_push_blocks_until_pop");
    }

    #[test]
    fn flood_releases_parked_consumer() {
        init_test("flood_releases_parked_consumer");
        for flavor in FLAVORS {
            let buf = Arc::new(BoundedBuffer::<u32>::new(1, flavor));
            let consumer = {
                let buf = Arc::clone(&buf);
                thread::spawn(move || buf.pop())
            };
            thread::sleep(Duration::from_millis(10));
            buf.flood();
            let got = consumer.join().expect("consumer panicked");
            crate::assert_with_log!(got.is_none(), "closed pop", None::<u32>, got);
            assert!(buf.is_closed());
            assert_eq!(buf.push(9), Err(9));
        }
        crate::test_complete!("flood_releases_parked_consumer");
    }

    #[test]
    fn leftover_values_are_dropped() {
        init_test("leftover_values_are_dropped");
        let marker = Arc::new(());
        {
            let buf = BoundedBuffer::new(2, SemaphoreFlavor::Blocking);
            buf.push(Arc::clone(&marker)).expect("open");
            buf.push(Arc::clone(&marker)).expect("open");
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        let count = Arc::strong_count(&marker);
        crate::assert_with_log!(count == 1, "slots dropped", 1, count);
        crate::test_complete!("leftover_values_are_dropped");
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_rejected() {
        let _ = BoundedBuffer::<u8>::new(0, SemaphoreFlavor::LockFree);
    }
}
