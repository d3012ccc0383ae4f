//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FeedService (domain)
//! ```
//!
//! Driven adapters (motor, clock, event sinks, storage) implement these
//! traits.  The [`FeedService`](super::service::FeedService) consumes them
//! via generics, so the domain core never touches hardware directly.

use crate::error::StorageError;
use crate::scheduler::TimeOfDay;

// ───────────────────────────────────────────────────────────────
// Feed actuator port (driven adapter: domain → motor)
// ───────────────────────────────────────────────────────────────

/// The single physical feeding mechanism.
///
/// One "unit" is one auger revolution.  `run_unit` blocks for the full
/// mechanical duration; the actuator has no queue, no progress callback
/// and no failure signal — a unit always completes.
pub trait FeedActuator {
    /// Perform one blocking unit of feeding.
    fn run_unit(&mut self);

    /// De-energise the motor coils after a run.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator gate — explicit critical section around the actuator
// ───────────────────────────────────────────────────────────────

/// Exclusive ownership wrapper for the feed actuator.
///
/// The control loop is single-threaded, so in practice `lock` never
/// contends; the gate exists to make the "exactly one feed at a time,
/// uninterruptible once started" guarantee explicit and testable rather
/// than an accident of the loop structure.
pub struct ActuatorGate<A> {
    inner: std::sync::Mutex<A>,
}

impl<A: FeedActuator> ActuatorGate<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            inner: std::sync::Mutex::new(actuator),
        }
    }

    /// Acquire the actuator for the duration of one feed.
    pub fn lock(&self) -> std::sync::MutexGuard<'_, A> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Non-blocking acquire.  `None` while a feed is in progress.
    pub fn try_lock(&self) -> Option<std::sync::MutexGuard<'_, A>> {
        self.inner.try_lock().ok()
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: wall-clock oracle → domain)
// ───────────────────────────────────────────────────────────────

/// A point-in-time local calendar reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: u16,
    /// 1–12.
    pub month: u8,
    /// 1–31.
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WallClock {
    /// The time-of-day portion used for schedule matching.
    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay {
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        }
    }
}

/// Read-only wall-clock oracle.  `None` until time synchronisation has
/// produced a plausible reading.
pub trait Clock {
    fn now(&self) -> Option<WallClock>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → notification)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT).
/// Delivery is best-effort: a sink that cannot deliver drops the event.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic per key — no partial writes on power
///   loss.  The ESP-IDF NVS API guarantees this natively; the in-memory
///   simulation achieves it trivially.
/// - There is no multi-key transaction; callers rely on the single-writer
///   control loop for consistency (last writer wins).
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Hold input (calibration gate)
// ───────────────────────────────────────────────────────────────

/// Live "is the button still held?" predicate, re-sampled every
/// calibration iteration.  The calibration loop stops the instant this
/// returns false.
pub trait HoldInput {
    fn is_held(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Feed delegate (decouples evaluator from the coordinator)
// ───────────────────────────────────────────────────────────────

/// Callback trait the schedule evaluator invokes for each due entry.
///
/// This decouples the [`ScheduleEvaluator`](crate::scheduler::ScheduleEvaluator)
/// from the feed path.  The service implements it by collecting due
/// entries and feeding them serially, but the evaluator itself knows
/// nothing about motors or event sinks.
pub trait FeedDelegate {
    /// Called once per due entry, in slot order.
    ///
    /// * `slot`   — table slot of the entry that became due.
    /// * `amount` — portion configured for that entry.
    fn on_entry_due(&mut self, slot: usize, amount: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullActuator;
    impl FeedActuator for NullActuator {
        fn run_unit(&mut self) {}
        fn release(&mut self) {}
    }

    #[test]
    fn gate_excludes_concurrent_access() {
        let gate = ActuatorGate::new(NullActuator);
        let held = gate.lock();
        assert!(gate.try_lock().is_none());
        drop(held);
        assert!(gate.try_lock().is_some());
    }

    #[test]
    fn wall_clock_time_of_day_projection() {
        let c = WallClock {
            year: 2024,
            month: 6,
            day: 1,
            hour: 8,
            minute: 30,
            second: 7,
        };
        let t = c.time_of_day();
        assert_eq!((t.hour, t.minute, t.second), (8, 30, 7));
    }
}
