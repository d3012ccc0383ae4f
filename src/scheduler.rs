//! Schedule evaluation engine.
//!
//! Polled once per tick, the evaluator compares the wall clock against the
//! schedule table and notifies a [`FeedDelegate`] for every entry that is
//! due.  The main loop implements the delegate to route due entries into
//! the feed coordinator.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Trigger Sources                          │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │  Button   │  │ Schedule  │  │   MQTT    │  │ HTTP API │   │
//! │  │ (gesture) │  │ Evaluator │  │  command  │  │          │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        │              │              │              │        │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  FeedService (coordinator)             │  │
//! │  │        one actuator, strictly serial feeding           │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Firing rule
//!
//! An enabled entry fires when its `(hour, minute)` matches the clock, its
//! `fired` latch is clear, and the second-of-minute is still inside the
//! admission window.  The latch guarantees at most one fire per entry per
//! wall-clock minute no matter how often the evaluator polls; it clears as
//! soon as the clock leaves the entry's minute.
//!
//! The admission window tolerates a slow or delayed tick while still
//! preventing a second firing within the same minute.  A tick cadence
//! slower than the window risks a missed firing — that is a documented
//! limitation of the polling design, not something to paper over here.

use log::info;

use crate::app::ports::FeedDelegate;
use crate::schedule::ScheduleTable;

/// Seconds after the top of a scheduled minute during which a late-polled
/// match still counts as on-time.
pub const ADMISSION_WINDOW_SECS: u8 = 10;

/// Local wall-clock time of day, as read from the clock oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// The schedule evaluator.
///
/// Holds no schedule state of its own — the per-entry `fired` latches live
/// in the table so they share its lifetime.  When an entry is due, the
/// evaluator invokes the [`FeedDelegate`] callback rather than feeding
/// directly, which keeps it independently testable.
pub struct ScheduleEvaluator {
    fires: u64,
}

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self { fires: 0 }
    }

    /// Evaluate every entry against the current clock reading.
    ///
    /// `now == None` (clock not yet synced) is a strict no-op: no firing,
    /// and no latch mutation — an entry that fired stays latched until a
    /// real clock reading moves past its minute.
    pub fn tick(
        &mut self,
        table: &mut ScheduleTable,
        now: Option<TimeOfDay>,
        delegate: &mut dyn FeedDelegate,
    ) {
        let Some(now) = now else {
            return;
        };

        for (slot, entry) in table.entries_mut().iter_mut().enumerate() {
            if !entry.enabled {
                continue;
            }

            let minute_matches = entry.hour == now.hour && entry.minute == now.minute;

            if minute_matches {
                if !entry.fired && now.second < ADMISSION_WINDOW_SECS {
                    info!(
                        "schedule #{} ({:02}:{:02}): {} revs due",
                        slot + 1,
                        entry.hour,
                        entry.minute,
                        entry.amount
                    );
                    delegate.on_entry_due(slot, entry.amount);
                    entry.fired = true;
                    self.fires += 1;
                }
            } else {
                entry.fired = false;
            }
        }
    }

    /// Total fires since boot.
    pub fn fire_count(&self) -> u64 {
        self.fires
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Test delegate that records due entries.
    struct RecordingDelegate {
        due: Vec<(usize, u32)>,
    }

    impl RecordingDelegate {
        fn new() -> Self {
            Self { due: Vec::new() }
        }
    }

    impl FeedDelegate for RecordingDelegate {
        fn on_entry_due(&mut self, slot: usize, amount: u32) {
            self.due.push((slot, amount));
        }
    }

    fn at(hour: u8, minute: u8, second: u8) -> Option<TimeOfDay> {
        Some(TimeOfDay {
            hour,
            minute,
            second,
        })
    }

    fn table_with(entries: &[(usize, u8, u8, u32, bool)]) -> ScheduleTable {
        let mut t = ScheduleTable::new(10);
        // Clear the seeded defaults so only the requested entries are live.
        for i in 0..t.capacity() {
            t.update_entry(i, 0, 0, 1, false).unwrap();
        }
        for &(i, h, m, a, e) in entries {
            t.update_entry(i, h, m, a, e).unwrap();
        }
        t
    }

    #[test]
    fn fires_once_inside_window() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 8, 0, 10, true)]);

        eval.tick(&mut t, at(8, 0, 3), &mut delegate);
        assert_eq!(delegate.due, vec![(0, 10)]);
        assert!(t.entries()[0].fired());

        // Same minute, repeated polls — no second fire.
        for sec in 4..60 {
            eval.tick(&mut t, at(8, 0, sec), &mut delegate);
        }
        assert_eq!(delegate.due.len(), 1);
        assert_eq!(eval.fire_count(), 1);
    }

    #[test]
    fn late_first_poll_misses_window() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 8, 0, 10, true)]);

        eval.tick(&mut t, at(8, 0, ADMISSION_WINDOW_SECS), &mut delegate);
        assert!(delegate.due.is_empty());
        assert!(!t.entries()[0].fired());
    }

    #[test]
    fn latch_resets_when_minute_passes() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 8, 0, 10, true)]);

        eval.tick(&mut t, at(8, 0, 0), &mut delegate);
        assert!(t.entries()[0].fired());

        eval.tick(&mut t, at(8, 1, 0), &mut delegate);
        assert!(!t.entries()[0].fired());
        assert_eq!(delegate.due.len(), 1);
    }

    #[test]
    fn clock_unavailable_is_a_strict_noop() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 8, 0, 10, true)]);

        eval.tick(&mut t, at(8, 0, 1), &mut delegate);
        assert!(t.entries()[0].fired());

        // Clock drops out mid-minute: the latch must survive.
        eval.tick(&mut t, None, &mut delegate);
        assert!(t.entries()[0].fired());
        assert_eq!(delegate.due.len(), 1);
    }

    #[test]
    fn disabled_entry_never_fires() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 8, 0, 10, true), (1, 8, 0, 5, false)]);

        eval.tick(&mut t, at(8, 0, 2), &mut delegate);
        assert_eq!(delegate.due, vec![(0, 10)]);
    }

    #[test]
    fn disabling_mid_match_stops_firing_others_unaffected() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 9, 30, 10, true), (1, 9, 30, 5, true)]);

        // Disable slot 0 just before its minute fires.
        t.toggle_entry(0).unwrap();
        eval.tick(&mut t, at(9, 30, 1), &mut delegate);
        assert_eq!(delegate.due, vec![(1, 5)]);
    }

    #[test]
    fn multiple_entries_same_minute_all_fire() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[(0, 12, 0, 7, true), (2, 12, 0, 9, true)]);

        eval.tick(&mut t, at(12, 0, 0), &mut delegate);
        assert_eq!(delegate.due, vec![(0, 7), (2, 9)]);
    }

    #[test]
    fn full_day_at_one_hertz_fires_each_entry_exactly_once() {
        let mut eval = ScheduleEvaluator::new();
        let mut delegate = RecordingDelegate::new();
        let mut t = table_with(&[
            (0, 0, 0, 3, true),
            (1, 6, 15, 4, true),
            (2, 12, 30, 5, true),
            (3, 23, 59, 6, true),
        ]);

        for hour in 0..24u8 {
            for minute in 0..60u8 {
                for second in 0..60u8 {
                    eval.tick(
                        &mut t,
                        at(hour, minute, second),
                        &mut delegate,
                    );
                }
            }
        }

        let mut counts = [0usize; 4];
        for (slot, _) in &delegate.due {
            counts[*slot] += 1;
        }
        assert_eq!(counts, [1, 1, 1, 1]);
    }
}
