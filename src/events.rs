//! Tick/gesture event system.
//!
//! Events are produced by the esp_timer callbacks (schedule tick,
//! heartbeat) and by button gesture classification; the main control loop
//! consumes them one at a time in FIFO order.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timer task  │────▶│              │     │              │
//! │ Button      │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Software    │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! The queue is a fixed ring over atomics: producers run in the timer
//! task, the single consumer is the control loop, and a full queue drops
//! the newest event (ticks are periodic, a dropped one is replaced a
//! second later).

use core::sync::atomic::{AtomicU8, Ordering};

/// Ring capacity.  Power of 2 so wrapping is a mask, not a division.
const RING_CAP: u8 = 16;
const RING_MASK: u8 = RING_CAP - 1;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// Schedule evaluation timer fired (1 Hz).
    ScheduleTick = 0,
    /// Heartbeat log timer fired (30 s).
    HeartbeatTick = 1,
    /// Debounced button click (manual feed).
    ButtonClick = 10,
    /// Button held past the calibration threshold.
    ButtonHold = 11,
}

impl Event {
    fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::ScheduleTick),
            1 => Some(Self::HeartbeatTick),
            10 => Some(Self::ButtonClick),
            11 => Some(Self::ButtonHold),
            _ => None,
        }
    }
}

static RING_HEAD: AtomicU8 = AtomicU8::new(0);
static RING_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: RING is accessed under the SPSC discipline — push_event writes
// slot `head` before publishing it with a Release store, pop_event reads
// only slots the matching Acquire load has made visible.
static mut RING: [u8; RING_CAP as usize] = [0; RING_CAP as usize];

/// Push an event.  Safe from timer-callback context (lock-free).
/// Returns `false` when the ring is full and the event was dropped.
pub fn push_event(event: Event) -> bool {
    let head = RING_HEAD.load(Ordering::Relaxed);
    let next = (head + 1) & RING_MASK;
    if next == RING_TAIL.load(Ordering::Acquire) {
        return false;
    }

    // SAFETY: slot `head` is unpublished until the store below.
    unsafe {
        RING[head as usize] = event as u8;
    }
    RING_HEAD.store(next, Ordering::Release);
    true
}

/// Pop the oldest pending event.  Main-loop (single consumer) only.
pub fn pop_event() -> Option<Event> {
    let tail = RING_TAIL.load(Ordering::Relaxed);
    if tail == RING_HEAD.load(Ordering::Acquire) {
        return None;
    }

    // SAFETY: slot `tail` was published by the producer's Release store.
    let raw = unsafe { RING[tail as usize] };
    RING_TAIL.store((tail + 1) & RING_MASK, Ordering::Release);
    Event::decode(raw)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}
