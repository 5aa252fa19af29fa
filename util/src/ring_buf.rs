//! # Ring buffer
//!
//! A fixed-capacity circular buffer for `Copy` items, designed for
//! single-producer single-consumer use across a thread (or interrupt)
//! boundary without a lock. The capacity must be a non-zero power of two so
//! that the wrap can be computed with a bitmask, which stays correct across
//! unsigned wraparound of the monotonically increasing head and tail
//! counters.
//!
//! The lock-free discipline is:
//!
//! - exactly one thread calls [`RingBuf::put`] (the producer),
//! - exactly one thread calls [`RingBuf::get`] (the consumer),
//! - [`RingBuf::put_overwrite`] and [`RingBuf::clear`] move both counters and
//!   therefore require `&mut self`, so the compiler enforces the exclusive
//!   access the original firmware got by masking interrupts.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fixed-capacity single-producer single-consumer ring buffer.
pub struct RingBuf<T> {
    /// Backing storage, length is always `capacity`.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,

    /// Capacity of the buffer, a non-zero power of two.
    capacity: usize,

    /// Monotonically increasing insert counter, owned by the producer.
    head: AtomicUsize,

    /// Monotonically increasing remove counter, owned by the consumer.
    tail: AtomicUsize,
}

// Safety: the SPSC discipline means a slot is only ever written by the
// producer before the matching head store, and only read by the consumer
// after observing that store.
unsafe impl<T: Copy + Send> Send for RingBuf<T> {}
unsafe impl<T: Copy + Send> Sync for RingBuf<T> {}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with ring buffer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufError {
    #[error("Ring buffer capacity must be a non-zero power of two, got {0}")]
    BadCapacity(usize),

    #[error("The ring buffer is full")]
    Full,

    #[error("The ring buffer is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: Copy> RingBuf<T> {
    /// Create a new empty buffer with the given capacity.
    ///
    /// Fails with `BadCapacity` if `capacity` is zero or not a power of two.
    pub fn new(capacity: usize) -> Result<Self, RingBufError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingBufError::BadCapacity(capacity));
        }

        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        Ok(Self {
            slots: slots.into_boxed_slice(),
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    /// Capacity the buffer was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently held.
    pub fn used(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    /// Number of free slots remaining.
    pub fn free(&self) -> usize {
        self.capacity - self.used()
    }

    /// True if the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// True if the buffer holds `capacity` items.
    pub fn is_full(&self) -> bool {
        self.used() == self.capacity
    }

    /// Insert an item at the head. Never blocks.
    ///
    /// Fails with `Full` without mutating the buffer if no slot is free. Must
    /// only be called from the single producer context.
    pub fn put(&self, item: T) -> Result<(), RingBufError> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) == self.capacity {
            return Err(RingBufError::Full);
        }

        // Safety: this slot is outside the tail..head window so the consumer
        // will not touch it until the head store below is visible.
        unsafe {
            (*self.slots[head & (self.capacity - 1)].get()).write(item);
        }

        self.head.store(head.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Remove the oldest item from the tail. Never blocks.
    ///
    /// Fails with `Empty` without mutating the buffer if no item is present.
    /// Must only be called from the single consumer context.
    pub fn get(&self) -> Result<T, RingBufError> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if head == tail {
            return Err(RingBufError::Empty);
        }

        // Safety: head is ahead of tail so this slot was fully written by the
        // producer before its head store.
        let item = unsafe { (*self.slots[tail & (self.capacity - 1)].get()).assume_init() };

        self.tail.store(tail.wrapping_add(1), Ordering::Release);

        Ok(item)
    }

    /// Insert an item at the head, dropping the oldest item if the buffer is
    /// full.
    ///
    /// Moves both counters, so requires exclusive access.
    pub fn put_overwrite(&mut self, item: T) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        if head.wrapping_sub(tail) == self.capacity {
            self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        }

        unsafe {
            (*self.slots[head & (self.capacity - 1)].get()).write(item);
        }

        self.head.store(head.wrapping_add(1), Ordering::Relaxed);
    }

    /// Discard all items.
    ///
    /// Moves both counters, so requires exclusive access.
    pub fn clear(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        self.tail.store(head, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bad_capacities_rejected() {
        for cap in [0usize, 3, 6, 12, 100].iter() {
            assert_eq!(
                RingBuf::<u8>::new(*cap).err(),
                Some(RingBufError::BadCapacity(*cap))
            );
        }

        assert!(RingBuf::<u8>::new(1).is_ok());
        assert!(RingBuf::<u8>::new(64).is_ok());
    }

    #[test]
    fn test_fifo_order() {
        let rb = RingBuf::new(8).unwrap();

        for i in 0u8..8 {
            rb.put(i).unwrap();
        }

        for i in 0u8..8 {
            assert_eq!(rb.get(), Ok(i));
        }
    }

    #[test]
    fn test_full_and_empty_do_not_mutate() {
        let rb = RingBuf::new(2).unwrap();

        assert_eq!(rb.get(), Err(RingBufError::Empty));
        assert_eq!(rb.used(), 0);

        rb.put(10u8).unwrap();
        rb.put(20u8).unwrap();
        assert_eq!(rb.put(30u8), Err(RingBufError::Full));

        assert_eq!(rb.used(), 2);
        assert_eq!(rb.get(), Ok(10));
        assert_eq!(rb.get(), Ok(20));
        assert_eq!(rb.get(), Err(RingBufError::Empty));
    }

    #[test]
    fn test_wrap_around() {
        let rb = RingBuf::new(4).unwrap();

        // Push the counters through several wraps of the backing storage
        for i in 0u32..1000 {
            rb.put(i).unwrap();
            assert_eq!(rb.get(), Ok(i));
        }

        assert!(rb.is_empty());
        assert_eq!(rb.free(), 4);
    }

    #[test]
    fn test_put_overwrite_drops_oldest() {
        let mut rb = RingBuf::new(4).unwrap();

        for i in 0u8..6 {
            rb.put_overwrite(i);
        }

        assert_eq!(rb.get(), Ok(2));
        assert_eq!(rb.get(), Ok(3));
        assert_eq!(rb.get(), Ok(4));
        assert_eq!(rb.get(), Ok(5));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut rb = RingBuf::new(8).unwrap();

        for i in 0u8..5 {
            rb.put(i).unwrap();
        }

        rb.clear();

        assert!(rb.is_empty());
        assert_eq!(rb.get(), Err(RingBufError::Empty));

        // Still usable after a clear
        rb.put(42u8).unwrap();
        assert_eq!(rb.get(), Ok(42));
    }

    #[test]
    fn test_spsc_across_threads() {
        let rb = Arc::new(RingBuf::new(16).unwrap());
        let producer_rb = rb.clone();

        let producer = std::thread::spawn(move || {
            let mut next = 0u32;
            while next < 10_000 {
                if producer_rb.put(next).is_ok() {
                    next += 1;
                }
            }
        });

        let mut expected = 0u32;
        while expected < 10_000 {
            if let Ok(v) = rb.get() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }

        producer.join().unwrap();
        assert!(rb.is_empty());
    }
}
