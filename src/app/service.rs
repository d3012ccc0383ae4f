//! Feed coordinator — the hexagonal core.
//!
//! [`FeedService`] owns the schedule table (and with it the default
//! portion) and serialises every feed request — button, schedule, MQTT,
//! HTTP — against the single physical auger.  All I/O flows through port
//! traits injected at call sites, making the entire service testable with
//! mock adapters.
//!
//! ```text
//!      Clock ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                │       FeedService       │
//! ActuatorGate ◀─│  table · evaluator      │
//!                └────────────────────────┘
//!                          │
//!                     StoragePort
//! ```

use heapless::Vec;
use log::{info, warn};

use crate::schedule::{ScheduleTable, SCHEDULE_SLOTS};
use crate::scheduler::ScheduleEvaluator;

use super::commands::EntryUpdate;
use super::events::{AppEvent, FeedEvent, FeedSource};
use super::ports::{ActuatorGate, Clock, EventSink, FeedActuator, FeedDelegate, HoldInput, StoragePort};

/// Feed progress is logged every this many revolutions.
const PROGRESS_LOG_EVERY: u32 = 25;

/// Calibration progress is logged every this many revolutions.
const CALIBRATION_LOG_EVERY: u32 = 20;

/// Coordinator state, observable for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Feeding,
}

/// Collects due entries from one evaluator pass so they can be fed
/// serially afterwards without holding a table borrow.
#[derive(Default)]
struct DueEntries(Vec<(usize, u32), SCHEDULE_SLOTS>);

impl FeedDelegate for DueEntries {
    fn on_entry_due(&mut self, slot: usize, amount: u32) {
        // Capacity equals the table capacity, so this cannot overflow.
        let _ = self.0.push((slot, amount));
    }
}

// ───────────────────────────────────────────────────────────────
// FeedService
// ───────────────────────────────────────────────────────────────

/// Serialising gateway between feed-trigger sources and the actuator.
pub struct FeedService {
    table: ScheduleTable,
    evaluator: ScheduleEvaluator,
    state: FeedState,
    feeds_completed: u64,
}

impl FeedService {
    /// Construct around an already-populated table.
    pub fn new(table: ScheduleTable) -> Self {
        Self {
            table,
            evaluator: ScheduleEvaluator::new(),
            state: FeedState::Idle,
            feeds_completed: 0,
        }
    }

    /// Construct by loading the table from the persistent store.
    pub fn load(storage: &impl StoragePort, fallback_default: u32) -> Self {
        Self::new(ScheduleTable::load(storage, fallback_default))
    }

    // ── Feeding ───────────────────────────────────────────────

    /// Run one feed, blocking until the auger finishes.
    ///
    /// An absent or zero `requested` amount substitutes the default
    /// portion.  The actuator gate is held for the full duration — feeds
    /// are strictly serial and uninterruptible once started.  The
    /// completion event goes to the sink best-effort.
    pub fn request_feed<A: FeedActuator>(
        &mut self,
        requested: Option<u32>,
        source: FeedSource,
        gate: &ActuatorGate<A>,
        clock: &impl Clock,
        sink: &mut impl EventSink,
    ) -> FeedEvent {
        let amount = match requested {
            Some(a) if a > 0 => a,
            _ => self.table.default_amount(),
        };

        info!("feed start: {} revs ({})", amount, source.as_str());
        self.state = FeedState::Feeding;
        {
            let mut auger = gate.lock();
            for done in 0..amount {
                auger.run_unit();
                if done > 0 && done % PROGRESS_LOG_EVERY == 0 {
                    info!("feed progress: {}/{}", done, amount);
                }
            }
            auger.release();
        }
        self.state = FeedState::Idle;
        self.feeds_completed += 1;
        info!("feed complete: {} revs", amount);

        let event = FeedEvent {
            clock: clock.now(),
            amount,
            source,
        };
        sink.emit(&AppEvent::FeedCompleted(event));
        event
    }

    /// One schedule evaluation pass; every due entry feeds serially.
    pub fn tick<A: FeedActuator>(
        &mut self,
        clock: &impl Clock,
        gate: &ActuatorGate<A>,
        sink: &mut impl EventSink,
    ) {
        let now = clock.now().map(|c| c.time_of_day());

        let mut due = DueEntries::default();
        self.evaluator.tick(&mut self.table, now, &mut due);

        for (_, amount) in due.0 {
            self.request_feed(Some(amount), FeedSource::Scheduled, gate, clock, sink);
        }
    }

    // ── Configuration ─────────────────────────────────────────

    /// Set the default portion and persist.
    pub fn set_default_amount(
        &mut self,
        amount: u32,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> crate::error::Result<()> {
        self.table.set_default_amount(amount)?;
        self.table.save(storage)?;
        info!("default portion set: {} revs", amount);
        sink.emit(&AppEvent::DefaultAmountChanged(amount));
        Ok(())
    }

    /// Apply a bulk schedule update, slot 0 upward.
    ///
    /// The batch has already passed structural parsing at the transport;
    /// here each entry is range-validated independently — an entry with an
    /// out-of-range field is skipped and its slot left unmodified.
    /// Returns the number of slots applied.
    pub fn apply_schedules(
        &mut self,
        batch: &[EntryUpdate],
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> crate::error::Result<usize> {
        let mut applied = 0usize;
        for (i, u) in batch.iter().take(SCHEDULE_SLOTS).enumerate() {
            match self
                .table
                .update_entry(i, u.hour, u.minute, u.amount, u.enabled)
            {
                Ok(()) => applied += 1,
                Err(e) => warn!("schedule slot {} rejected: {}", i + 1, e),
            }
        }

        if applied > 0 {
            self.table.save(storage)?;
            sink.emit(&AppEvent::ScheduleChanged);
        }
        info!("schedule update: {}/{} slots applied", applied, batch.len());
        Ok(applied)
    }

    /// Flip one entry's enabled flag and persist.  Returns the new state.
    pub fn toggle_entry(
        &mut self,
        index: usize,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> crate::error::Result<bool> {
        let enabled = self.table.toggle_entry(index)?;
        self.table.save(storage)?;
        info!(
            "schedule #{} -> {}",
            index + 1,
            if enabled { "on" } else { "off" }
        );
        sink.emit(&AppEvent::ScheduleChanged);
        Ok(enabled)
    }

    // ── Calibration ───────────────────────────────────────────

    /// Count revolutions while the hold predicate stays true, then commit
    /// the count as the new default portion.
    ///
    /// The predicate is re-sampled before every revolution; releasing the
    /// hold stops the auger after the revolution in flight.  The result is
    /// committed only on release — a release before the first full
    /// revolution keeps the previous default (the portion must stay
    /// positive).  Returns the default in effect afterwards.
    pub fn calibrate<A: FeedActuator>(
        &mut self,
        hold: &mut impl HoldInput,
        gate: &ActuatorGate<A>,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> crate::error::Result<u32> {
        info!("calibration start");
        let mut count: u32 = 0;
        {
            let mut auger = gate.lock();
            while hold.is_held() {
                auger.run_unit();
                count += 1;
                if count % CALIBRATION_LOG_EVERY == 0 {
                    info!("calibration: {} revs", count);
                }
            }
            auger.release();
        }

        if count == 0 {
            info!("calibration released before one full rev; default unchanged");
            return Ok(self.table.default_amount());
        }

        self.table.set_default_amount(count)?;
        self.table.save(storage)?;
        info!("calibration complete: new default {} revs", count);
        sink.emit(&AppEvent::DefaultAmountChanged(count));
        Ok(count)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn table(&self) -> &ScheduleTable {
        &self.table
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Total feeds completed since boot.
    pub fn feeds_completed(&self) -> u64 {
        self.feeds_completed
    }

    /// Total scheduled fires since boot.
    pub fn schedule_fires(&self) -> u64 {
        self.evaluator.fire_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::WallClock;

    struct MockAuger {
        units: u32,
        released: u32,
    }
    impl MockAuger {
        fn new() -> Self {
            Self {
                units: 0,
                released: 0,
            }
        }
    }
    impl FeedActuator for &mut MockAuger {
        fn run_unit(&mut self) {
            self.units += 1;
        }
        fn release(&mut self) {
            self.released += 1;
        }
    }

    struct FixedClock(Option<WallClock>);
    impl Clock for FixedClock {
        fn now(&self) -> Option<WallClock> {
            self.0
        }
    }

    struct RecordingSink(std::vec::Vec<AppEvent>);
    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(*event);
        }
    }

    #[test]
    fn absent_amount_uses_default() {
        let mut service = FeedService::new(ScheduleTable::new(15));
        let mut auger = MockAuger::new();
        let gate = ActuatorGate::new(&mut auger);
        let mut sink = RecordingSink(vec![]);

        let event =
            service.request_feed(None, FeedSource::Manual, &gate, &FixedClock(None), &mut sink);
        assert_eq!(event.amount, 15);
        drop(gate);
        assert_eq!(auger.units, 15);
        assert_eq!(auger.released, 1);
    }

    #[test]
    fn zero_amount_uses_default_explicit_amount_wins() {
        let mut service = FeedService::new(ScheduleTable::new(15));
        let mut auger = MockAuger::new();
        let gate = ActuatorGate::new(&mut auger);
        let mut sink = RecordingSink(vec![]);

        let e0 = service.request_feed(
            Some(0),
            FeedSource::Manual,
            &gate,
            &FixedClock(None),
            &mut sink,
        );
        assert_eq!(e0.amount, 15);

        let e7 =
            service.request_feed(Some(7), FeedSource::Api, &gate, &FixedClock(None), &mut sink);
        assert_eq!(e7.amount, 7);
        assert_eq!(e7.source, FeedSource::Api);
    }

    #[test]
    fn completion_event_reaches_sink_with_clock() {
        let clock = FixedClock(Some(WallClock {
            year: 2024,
            month: 3,
            day: 9,
            hour: 8,
            minute: 0,
            second: 2,
        }));
        let mut service = FeedService::new(ScheduleTable::new(5));
        let mut auger = MockAuger::new();
        let gate = ActuatorGate::new(&mut auger);
        let mut sink = RecordingSink(vec![]);

        service.request_feed(Some(3), FeedSource::Remote, &gate, &clock, &mut sink);
        assert_eq!(sink.0.len(), 1);
        match sink.0[0] {
            AppEvent::FeedCompleted(e) => {
                assert_eq!(e.amount, 3);
                assert_eq!(e.source, FeedSource::Remote);
                assert!(e.clock.is_some());
            }
            ref other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(service.feeds_completed(), 1);
        assert_eq!(service.state(), FeedState::Idle);
    }

    struct CountedHold(u32);
    impl HoldInput for CountedHold {
        fn is_held(&mut self) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    struct NullStorage;
    impl StoragePort for NullStorage {
        fn read(
            &self,
            _ns: &str,
            _key: &str,
            _buf: &mut [u8],
        ) -> Result<usize, crate::error::StorageError> {
            Err(crate::error::StorageError::NotFound)
        }
        fn write(
            &mut self,
            _ns: &str,
            _key: &str,
            _data: &[u8],
        ) -> Result<(), crate::error::StorageError> {
            Ok(())
        }
        fn delete(&mut self, _ns: &str, _key: &str) -> Result<(), crate::error::StorageError> {
            Ok(())
        }
        fn exists(&self, _ns: &str, _key: &str) -> bool {
            false
        }
    }

    #[test]
    fn calibration_commits_count_on_release() {
        let mut service = FeedService::new(ScheduleTable::new(15));
        let mut auger = MockAuger::new();
        let gate = ActuatorGate::new(&mut auger);
        let mut sink = RecordingSink(vec![]);

        let committed = service
            .calibrate(
                &mut CountedHold(42),
                &gate,
                &mut NullStorage,
                &mut sink,
            )
            .unwrap();
        assert_eq!(committed, 42);
        assert_eq!(service.table().default_amount(), 42);
        drop(gate);
        assert_eq!(auger.units, 42);
        assert_eq!(auger.released, 1);
        assert!(sink
            .0
            .iter()
            .any(|e| matches!(e, AppEvent::DefaultAmountChanged(42))));
    }

    #[test]
    fn instant_release_keeps_previous_default() {
        let mut service = FeedService::new(ScheduleTable::new(15));
        let mut auger = MockAuger::new();
        let gate = ActuatorGate::new(&mut auger);
        let mut sink = RecordingSink(vec![]);

        let committed = service
            .calibrate(&mut CountedHold(0), &gate, &mut NullStorage, &mut sink)
            .unwrap();
        assert_eq!(committed, 15);
        assert_eq!(service.table().default_amount(), 15);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn apply_schedules_skips_invalid_entries() {
        let mut service = FeedService::new(ScheduleTable::new(10));
        let mut sink = RecordingSink(vec![]);
        let before = service.table().entries()[1];

        let batch = [
            EntryUpdate {
                hour: 6,
                minute: 30,
                amount: 8,
                enabled: true,
            },
            EntryUpdate {
                hour: 25, // invalid — slot 1 must stay untouched
                minute: 0,
                amount: 8,
                enabled: true,
            },
        ];
        let applied = service
            .apply_schedules(&batch, &mut NullStorage, &mut sink)
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(service.table().entries()[0].hour, 6);
        assert_eq!(service.table().entries()[1], before);
    }
}
