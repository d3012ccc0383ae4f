//! Integration tests: FeedService → evaluator → actuator, over mock ports.

use petfeeder::adapters::nvs::NvsAdapter;
use petfeeder::app::commands::EntryUpdate;
use petfeeder::app::events::{AppEvent, FeedSource};
use petfeeder::app::ports::{
    ActuatorGate, Clock, EventSink, FeedActuator, StoragePort, WallClock,
};
use petfeeder::app::service::FeedService;
use petfeeder::error::{ScheduleError, StorageError};
use petfeeder::schedule::{ScheduleTable, SCHEDULE_SLOTS};
use std::collections::HashMap;

// ── Mock implementations ──────────────────────────────────────

#[derive(Default)]
struct MockAuger {
    units: u32,
    releases: u32,
    feeds: Vec<u32>,
    in_progress: u32,
}

impl MockAuger {
    fn new() -> Self {
        Self::default()
    }
}

impl FeedActuator for MockAuger {
    fn run_unit(&mut self) {
        self.units += 1;
        self.in_progress += 1;
    }
    fn release(&mut self) {
        self.releases += 1;
        self.feeds.push(self.in_progress);
        self.in_progress = 0;
    }
}

struct TestClock {
    t: Option<WallClock>,
}

impl TestClock {
    fn unsynced() -> Self {
        Self { t: None }
    }
    fn at(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            t: Some(wall(hour, minute, second)),
        }
    }
    fn set(&mut self, hour: u8, minute: u8, second: u8) {
        self.t = Some(wall(hour, minute, second));
    }
}

impl Clock for TestClock {
    fn now(&self) -> Option<WallClock> {
        self.t
    }
}

fn wall(hour: u8, minute: u8, second: u8) -> WallClock {
    WallClock {
        year: 2024,
        month: 6,
        day: 1,
        hour,
        minute,
        second,
    }
}

struct RecordingSink {
    events: Vec<AppEvent>,
}

impl RecordingSink {
    fn new() -> Self {
        Self { events: Vec::new() }
    }
    fn feeds(&self) -> Vec<(u32, FeedSource)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::FeedCompleted(f) => Some((f.amount, f.source)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

struct MemStorage(HashMap<String, Vec<u8>>);

impl MemStorage {
    fn new() -> Self {
        Self(HashMap::new())
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.0.get(&format!("{ns}::{key}")) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }
    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0.insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }
    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.0.remove(&format!("{ns}::{key}"));
        Ok(())
    }
    fn exists(&self, ns: &str, key: &str) -> bool {
        self.0.contains_key(&format!("{ns}::{key}"))
    }
}

/// A table with all seeded defaults disabled, so tests control exactly
/// which entries are live.
fn blank_service(default_amount: u32) -> FeedService {
    let mut table = ScheduleTable::new(default_amount);
    for i in 0..table.capacity() {
        table.update_entry(i, 0, 0, 1, false).unwrap();
    }
    FeedService::new(table)
}

// ── Amount resolution ─────────────────────────────────────────

#[test]
fn manual_feed_without_amount_uses_default() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();

    service.request_feed(
        None,
        FeedSource::Manual,
        &gate,
        &TestClock::unsynced(),
        &mut sink,
    );

    assert_eq!(gate.lock().feeds, vec![15]);
    assert_eq!(sink.feeds(), vec![(15, FeedSource::Manual)]);
}

#[test]
fn api_feed_with_explicit_amount_ignores_default() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();

    service.request_feed(
        Some(7),
        FeedSource::Api,
        &gate,
        &TestClock::unsynced(),
        &mut sink,
    );

    assert_eq!(gate.lock().feeds, vec![7]);
    assert_eq!(sink.feeds(), vec![(7, FeedSource::Api)]);
}

// ── One enabled + one disabled entry sharing the 08:00 minute ──

#[test]
fn matching_minute_fires_once_within_window_then_resets() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();
    let mut clock = TestClock::at(8, 0, 3);

    // Slot 0 enabled at 08:00 for 10 revs; slot 1 same minute but disabled.
    {
        let mut storage = MemStorage::new();
        let batch = [
            EntryUpdate {
                hour: 8,
                minute: 0,
                amount: 10,
                enabled: true,
            },
            EntryUpdate {
                hour: 8,
                minute: 0,
                amount: 5,
                enabled: false,
            },
        ];
        service
            .apply_schedules(&batch, &mut storage, &mut sink)
            .unwrap();
        sink.events.clear();
    }

    // 08:00:03 — inside the admission window: exactly one feed of 10.
    service.tick(&clock, &gate, &mut sink);
    assert_eq!(sink.feeds(), vec![(10, FeedSource::Scheduled)]);
    assert!(service.table().entries()[0].fired());

    // 08:00:11 — window elapsed and already fired: nothing more.
    clock.set(8, 0, 11);
    service.tick(&clock, &gate, &mut sink);
    assert_eq!(sink.feeds().len(), 1);

    // 08:01:00 — the minute passed: the latch resets.
    clock.set(8, 1, 0);
    service.tick(&clock, &gate, &mut sink);
    assert!(!service.table().entries()[0].fired());
    assert_eq!(sink.feeds().len(), 1);

    assert_eq!(gate.lock().feeds, vec![10]);
}

#[test]
fn unsynced_clock_never_feeds() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();
    let mut storage = MemStorage::new();

    let batch = [EntryUpdate {
        hour: 0,
        minute: 0,
        amount: 10,
        enabled: true,
    }];
    service
        .apply_schedules(&batch, &mut storage, &mut sink)
        .unwrap();

    for _ in 0..120 {
        service.tick(&TestClock::unsynced(), &gate, &mut sink);
    }
    assert_eq!(gate.lock().units, 0);
}

#[test]
fn disabling_mid_match_stops_firing() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();
    let mut storage = MemStorage::new();

    let batch = [
        EntryUpdate {
            hour: 9,
            minute: 30,
            amount: 4,
            enabled: true,
        },
        EntryUpdate {
            hour: 9,
            minute: 30,
            amount: 6,
            enabled: true,
        },
    ];
    service
        .apply_schedules(&batch, &mut storage, &mut sink)
        .unwrap();

    // Disable slot 0 one second before its minute arrives.
    service.toggle_entry(0, &mut storage, &mut sink).unwrap();
    sink.events.clear();

    service.tick(&TestClock::at(9, 30, 1), &gate, &mut sink);
    assert_eq!(sink.feeds(), vec![(6, FeedSource::Scheduled)]);
}

// ── A full simulated day at 1 Hz ──────────────────────────────

#[test]
fn full_day_fires_each_enabled_entry_exactly_once() {
    let mut service = blank_service(15);
    let gate = ActuatorGate::new(MockAuger::new());
    let mut sink = RecordingSink::new();
    let mut storage = MemStorage::new();

    let batch = [
        EntryUpdate {
            hour: 0,
            minute: 0,
            amount: 2,
            enabled: true,
        },
        EntryUpdate {
            hour: 8,
            minute: 0,
            amount: 3,
            enabled: true,
        },
        EntryUpdate {
            hour: 8,
            minute: 1,
            amount: 4,
            enabled: true,
        },
        EntryUpdate {
            hour: 23,
            minute: 59,
            amount: 5,
            enabled: true,
        },
    ];
    service
        .apply_schedules(&batch, &mut storage, &mut sink)
        .unwrap();
    sink.events.clear();

    let mut clock = TestClock::unsynced();
    for hour in 0..24u8 {
        for minute in 0..60u8 {
            for second in 0..60u8 {
                clock.set(hour, minute, second);
                service.tick(&clock, &gate, &mut sink);
            }
        }
    }

    let feeds = sink.feeds();
    assert_eq!(feeds.len(), 4);
    let amounts: Vec<u32> = feeds.iter().map(|(a, _)| *a).collect();
    assert_eq!(amounts, vec![2, 3, 4, 5]);
    assert_eq!(gate.lock().units, 2 + 3 + 4 + 5);
    assert_eq!(service.schedule_fires(), 4);
}

// ── Persistence round-trips ───────────────────────────────────

#[test]
fn save_then_fresh_load_reproduces_table() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut table = ScheduleTable::new(15);
    table.update_entry(0, 7, 0, 20, true).unwrap();
    table.update_entry(3, 21, 15, 8, false).unwrap();
    table.set_default_amount(33).unwrap();
    table.save(&mut nvs).unwrap();

    let loaded = ScheduleTable::load(&nvs, 15);
    assert_eq!(loaded.default_amount(), 33);
    assert_eq!(loaded.entries(), table.entries());
}

#[test]
fn mutations_through_service_are_persisted() {
    let mut storage = MemStorage::new();
    let mut sink = RecordingSink::new();

    let mut service = FeedService::load(&storage, 15);
    service
        .set_default_amount(22, &mut storage, &mut sink)
        .unwrap();
    service.toggle_entry(4, &mut storage, &mut sink).unwrap();

    let reloaded = FeedService::load(&storage, 15);
    assert_eq!(reloaded.table().default_amount(), 22);
    assert!(reloaded.table().entries()[4].enabled);
}

#[test]
fn out_of_range_update_fails_without_side_effects() {
    let mut table = ScheduleTable::new(10);
    let before: Vec<_> = table.entries().to_vec();
    assert_eq!(
        table.update_entry(SCHEDULE_SLOTS, 8, 0, 10, true),
        Err(ScheduleError::IndexOutOfRange)
    );
    assert_eq!(table.entries(), before.as_slice());
}

#[test]
fn toggle_out_of_range_through_service_is_an_error() {
    let mut storage = MemStorage::new();
    let mut sink = RecordingSink::new();
    let mut service = FeedService::load(&storage, 15);
    assert!(service
        .toggle_entry(SCHEDULE_SLOTS, &mut storage, &mut sink)
        .is_err());
    assert!(sink.events.is_empty());
}

// ── Actuator exclusivity ──────────────────────────────────────

#[test]
fn gate_blocks_second_feed_while_one_runs() {
    use std::sync::Arc;

    let gate = Arc::new(ActuatorGate::new(MockAuger::new()));

    let worker_gate = Arc::clone(&gate);
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (done_tx, done_rx) = std::sync::mpsc::channel();

    let worker = std::thread::spawn(move || {
        let mut auger = worker_gate.lock();
        started_tx.send(()).unwrap();
        auger.run_unit();
        // Hold the actuator until the main thread has observed exclusion.
        done_rx.recv().unwrap();
        auger.release();
    });

    started_rx.recv().unwrap();
    assert!(
        gate.try_lock().is_none(),
        "actuator must be exclusive while a feed is in progress"
    );

    done_tx.send(()).unwrap();
    worker.join().unwrap();
    assert!(gate.try_lock().is_some());
}
