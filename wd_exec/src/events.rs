//! # Event queue
//!
//! Events are the only signal path from drivers into the main loop. The
//! queue is a single [`RingBuf`], and every [`EventSender::put`] happens on
//! the main loop thread: the ring buffer is single-producer by contract, so
//! the producer side must never be spread across concurrently running
//! threads.
//!
//! The timer thread therefore never touches the queue. It signals through a
//! [`TickCounter`], and the main loop converts the pending ticks into
//! [`Event::TimerTick`] at the top of each cycle. This mirrors the original
//! timer interrupt, which only set a flag for the main loop to act on.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use util::ring_buf::{RingBuf, RingBufError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The closed set of events the watchdog reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// One or more frames have arrived on the lander link.
    LanderData,

    /// One or more frames have arrived on the compute module link.
    CmData,

    /// The periodic timer has fired.
    TimerTick,

    /// An asynchronous I2C transaction has been issued.
    I2cStarted,

    /// The in-flight I2C transaction has finished (success or NACK).
    I2cDone,

    /// The battery thermistor has crossed the high temperature threshold.
    HighTemperature,

    /// A supply voltage has dropped below its threshold.
    PowerIssue,
}

/// All event tags, used by table-driven handler-totality tests.
pub const ALL_EVENTS: [Event; 7] = [
    Event::LanderData,
    Event::CmData,
    Event::TimerTick,
    Event::I2cStarted,
    Event::I2cDone,
    Event::HighTemperature,
    Event::PowerIssue,
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The process-wide event queue. One per execution, owned by the main loop.
pub struct EventQueue {
    ring: Arc<RingBuf<Event>>,
}

/// Producer handle onto the event queue.
///
/// Cheap to clone, but all clones of one queue's sender must put from the
/// same single thread: the ring buffer underneath is strictly
/// single-producer, and two threads putting concurrently can lose events.
/// Code running on another thread signals through a [`TickCounter`] (or an
/// equivalent atomic flag) and lets the main loop do the put.
#[derive(Clone)]
pub struct EventSender {
    ring: Arc<RingBuf<Event>>,
}

/// Tick signal shared between the timer thread and the main loop.
///
/// The timer thread increments, the main loop takes the accumulated count
/// and raises one `TimerTick` event per tick. Keeping the queue put on the
/// main loop side is what preserves the ring buffer's single-producer rule.
#[derive(Clone, Default)]
pub struct TickCounter {
    ticks: Arc<AtomicU32>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl EventQueue {
    /// Create the queue with the given capacity, which must be a non-zero
    /// power of two.
    pub fn new(capacity: usize) -> Result<Self, RingBufError> {
        Ok(Self {
            ring: Arc::new(RingBuf::new(capacity)?),
        })
    }

    /// Get a new producer handle.
    pub fn sender(&self) -> EventSender {
        EventSender {
            ring: self.ring.clone(),
        }
    }

    /// Take the oldest pending event, or `None` if the queue is empty. Main
    /// loop only.
    pub fn get(&self) -> Option<Event> {
        self.ring.get().ok()
    }

    /// True if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Discard all pending events.
    ///
    /// Draining from the consumer side is race-free under the queue's SPSC
    /// discipline, which is how this achieves what the original firmware did
    /// with interrupts masked.
    pub fn clear(&self) {
        while self.ring.get().is_ok() {}
    }
}

impl EventSender {
    /// Push an event. Never blocks, fails with `Full` if the queue is full.
    pub fn put(&self, event: Event) -> Result<(), RingBufError> {
        self.ring.put(event)
    }
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick. Safe from any thread.
    pub fn increment(&self) {
        self.ticks.fetch_add(1, Ordering::Release);
    }

    /// Take every tick recorded since the last call. Main loop only.
    pub fn take(&self) -> u32 {
        self.ticks.swap(0, Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fifo_ordering() {
        let queue = EventQueue::new(8).unwrap();
        let tx = queue.sender();

        tx.put(Event::LanderData).unwrap();
        tx.put(Event::TimerTick).unwrap();
        tx.put(Event::I2cDone).unwrap();

        assert_eq!(queue.get(), Some(Event::LanderData));
        assert_eq!(queue.get(), Some(Event::TimerTick));
        assert_eq!(queue.get(), Some(Event::I2cDone));
        assert_eq!(queue.get(), None);
    }

    #[test]
    fn test_ordering_with_interleaved_producer() {
        // Simulate an interrupt-context producer interleaved with the
        // consumer: ordering must be preserved end to end.
        let queue = EventQueue::new(4).unwrap();
        let tx = queue.sender();

        tx.put(Event::TimerTick).unwrap();
        tx.put(Event::LanderData).unwrap();

        assert_eq!(queue.get(), Some(Event::TimerTick));

        tx.put(Event::HighTemperature).unwrap();

        assert_eq!(queue.get(), Some(Event::LanderData));
        assert_eq!(queue.get(), Some(Event::HighTemperature));
        assert_eq!(queue.get(), None);
    }

    #[test]
    fn test_producer_thread() {
        let queue = EventQueue::new(16).unwrap();
        let tx = queue.sender();

        let producer = std::thread::spawn(move || {
            for _ in 0..100 {
                // Spin until there's room, the consumer is draining
                while tx.put(Event::TimerTick).is_err() {}
            }
        });

        let mut seen = 0;
        while seen < 100 {
            if queue.get().is_some() {
                seen += 1;
            }
        }

        producer.join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_tick_counter_loses_no_ticks() {
        // The timer thread increments while the main loop side drains
        // concurrently: the totals must balance exactly, every tick turned
        // into exactly one event.
        let ticks = TickCounter::new();
        let timer_ticks = ticks.clone();

        let timer = std::thread::spawn(move || {
            for _ in 0..10_000 {
                timer_ticks.increment();
            }
        });

        let queue = EventQueue::new(16).unwrap();
        let tx = queue.sender();

        let mut seen = 0u32;
        while seen < 10_000 {
            for _ in 0..ticks.take() {
                while tx.put(Event::TimerTick).is_err() {
                    while queue.get().is_some() {
                        seen += 1;
                    }
                }
            }
            while queue.get().is_some() {
                seen += 1;
            }
        }

        timer.join().unwrap();
        assert_eq!(seen, 10_000);
        assert_eq!(ticks.take(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = EventQueue::new(8).unwrap();
        let tx = queue.sender();

        for _ in 0..5 {
            tx.put(Event::PowerIssue).unwrap();
        }

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.get(), None);
    }
}
