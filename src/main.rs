//! PetFeeder Firmware — Main Entry Point
//!
//! Hexagonal architecture with a single-threaded cooperative control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter     SystemClock    WifiAdapter                     │
//! │  (StoragePort)  (Clock)        (ConnectivityPort)              │
//! │  MqttAdapter    HTTP server    LogEventSink                    │
//! │  (EventSink +   (command       (EventSink)                     │
//! │   commands)      source)                                       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              FeedService (pure logic)                  │    │
//! │  │  schedule table · evaluator · calibration              │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  AugerDriver behind ActuatorGate (exclusive, blocking)         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every trigger source — button, schedule, MQTT, HTTP — is normalised
//! into the same coordinator calls and dispatched synchronously from one
//! loop; a feed runs to completion before any other source is serviced.
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
mod config;
mod error;
mod events;
mod pins;
mod schedule;
mod scheduler;

mod adapters;
mod app;
mod drivers;

// ── Imports ───────────────────────────────────────────────────
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use adapters::http::ScheduleDoc;
use adapters::log_sink::LogEventSink;
use adapters::mqtt::MqttAdapter;
use adapters::nvs::NvsAdapter;
use adapters::time::SystemClock;
use adapters::wifi::{ConnectivityPort, WifiAdapter};
use app::commands::{self, InboundCommand};
use app::events::{AppEvent, FeedSource};
use app::ports::{ActuatorGate, EventSink};
use app::service::FeedService;
use config::FeederConfig;
use drivers::auger::AugerDriver;
use drivers::button::{ButtonDriver, ButtonEvent};
use drivers::status_led::{boot_flash, StatusBeacon, StatusLed, SystemStatus};
use events::{push_event, Event};

// ── Event fanout ──────────────────────────────────────────────
//
// The coordinator takes one EventSink; this glue forwards every event to
// the serial log and, when the broker is up, to MQTT.

struct EventFanout {
    log: LogEventSink,
    mqtt: Option<MqttAdapter>,
}

impl EventSink for EventFanout {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.emit(event);
        }
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PetFeeder v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let feeder_config = FeederConfig::default();
    if let Err(e) = feeder_config.validate() {
        // Compiled-in defaults failing validation is a build defect.
        log::error!("config invalid: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }

    // ── 2. Hardware peripherals ───────────────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service() {
        log::error!("ISR service init failed: {} — continuing without button ISR", e);
    }

    let mut led = StatusLed::new();
    boot_flash(&mut led);

    // ── 3. Persistent state ───────────────────────────────────
    let mut nvs = NvsAdapter::new()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("NVS init failed")?;
    let mut service = FeedService::load(&nvs, feeder_config.default_feed_amount);

    // ── 4. Actuator + inputs ──────────────────────────────────
    let gate = ActuatorGate::new(AugerDriver::new(&feeder_config));
    let mut button = ButtonDriver::new(pins::BUTTON_GPIO, feeder_config.hold_threshold_ms);
    let clock = SystemClock::new();

    // ── 5. WiFi ───────────────────────────────────────────────
    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()?;
    let esp_wifi = esp_idf_svc::wifi::EspWifi::new(peripherals.modem, sysloop.clone(), None)?;
    let blocking = esp_idf_svc::wifi::BlockingWifi::wrap(esp_wifi, sysloop)?;
    let mut wifi = WifiAdapter::new(blocking);

    let ssid = option_env!("FEEDER_WIFI_SSID").unwrap_or("");
    let pass = option_env!("FEEDER_WIFI_PASS").unwrap_or("");
    if ssid.is_empty() {
        warn!("no WiFi credentials compiled in — running offline");
    } else {
        match wifi
            .set_credentials(ssid, pass)
            .and_then(|()| wifi.connect())
        {
            Ok(()) => {}
            Err(e) => warn!("WiFi unavailable ({}), running offline", e),
        }
    }
    let network_up = wifi.is_connected();

    // ── 6. Network services (only with a link) ────────────────
    let _sntp = if network_up {
        match esp_idf_svc::sntp::EspSntp::new_default() {
            Ok(sntp) => {
                info!("SNTP started");
                Some(sntp)
            }
            Err(e) => {
                warn!("SNTP start failed: {e} — schedules idle until time syncs");
                None
            }
        }
    } else {
        None
    };

    let snapshot = Arc::new(Mutex::new(ScheduleDoc::from_table(service.table())));

    let _http_server = if network_up {
        match adapters::http::start_server(Arc::clone(&snapshot)) {
            Ok(server) => Some(server),
            Err(e) => {
                warn!("HTTP server failed: {e} — API unavailable");
                None
            }
        }
    } else {
        None
    };

    let mqtt = if network_up {
        match MqttAdapter::new(&feeder_config) {
            Ok(mqtt) => Some(mqtt),
            Err(e) => {
                warn!("MQTT unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    // ── 7. Timers + control loop ──────────────────────────────
    drivers::hw_timer::start_timers(
        feeder_config.schedule_tick_ms,
        feeder_config.heartbeat_interval_secs,
    );

    let mut fanout = EventFanout {
        log: LogEventSink::new(),
        mqtt,
    };
    let mut beacon = StatusBeacon::new();

    info!("System ready. Entering control loop.");

    loop {
        std::thread::sleep(Duration::from_millis(10));
        let now_ms = clock.uptime_ms();

        // Button gesture detection feeds the event queue.
        if let Some(gesture) = button.tick(now_ms as u32) {
            match gesture {
                ButtonEvent::Click => {
                    push_event(Event::ButtonClick);
                }
                ButtonEvent::HoldStart => {
                    push_event(Event::ButtonHold);
                }
            }
        }

        // Process all pending events.  Button gestures are only latched
        // here — manual input is resolved after schedule and remote
        // commands, fixing the trigger-check order within one pass.
        let mut manual_feed = false;
        let mut calibration = false;
        let mut snapshot_dirty = false;

        events::drain_events(|event| match event {
            Event::ScheduleTick => {
                service.tick(&clock, &gate, &mut fanout);
            }

            Event::HeartbeatTick => {
                info!(
                    "uptime: {}s, wifi: {}, mqtt: {}, feeds: {}",
                    clock.uptime_secs(),
                    if wifi.is_connected() { "OK" } else { "FAIL" },
                    if fanout.mqtt.as_ref().is_some_and(MqttAdapter::is_connected) {
                        "OK"
                    } else {
                        "FAIL"
                    },
                    service.feeds_completed(),
                );
            }

            Event::ButtonClick => {
                manual_feed = true;
            }

            Event::ButtonHold => {
                calibration = true;
            }
        });

        // Drain inbound transport commands (HTTP / MQTT).
        while let Some(cmd) = commands::next() {
            match cmd {
                InboundCommand::Feed { amount, source } => {
                    service.request_feed(amount, source, &gate, &clock, &mut fanout);
                }
                InboundCommand::ApplySchedules(batch) => {
                    if let Err(e) = service.apply_schedules(&batch, &mut nvs, &mut fanout) {
                        warn!("schedule update failed: {}", e);
                    }
                    snapshot_dirty = true;
                }
                InboundCommand::ToggleEntry { index } => {
                    if let Err(e) = service.toggle_entry(index, &mut nvs, &mut fanout) {
                        warn!("toggle rejected: {}", e);
                    }
                    snapshot_dirty = true;
                }
                InboundCommand::SetDefaultAmount { amount } => {
                    if let Err(e) = service.set_default_amount(amount, &mut nvs, &mut fanout) {
                        warn!("set default rejected: {}", e);
                    }
                    snapshot_dirty = true;
                }
            }
        }

        // Manual input, checked last in the per-iteration poll order.
        if manual_feed {
            info!("button: click — manual feed");
            service.request_feed(None, FeedSource::Manual, &gate, &clock, &mut fanout);
        }
        if calibration {
            info!("button: hold — calibration");
            led.set_colour(0, 255, 0);
            match service.calibrate(&mut button, &gate, &mut nvs, &mut fanout) {
                Ok(amount) => info!("calibration done: default {} revs", amount),
                Err(e) => warn!("calibration not saved: {}", e),
            }
            led.off();
            snapshot_dirty = true;
        }

        // Refresh the HTTP read snapshot after mutations.
        if snapshot_dirty {
            let doc = ScheduleDoc::from_table(service.table());
            match snapshot.lock() {
                Ok(mut guard) => *guard = doc,
                Err(poisoned) => *poisoned.into_inner() = doc,
            }
        }

        // MQTT housekeeping: discovery after first connect, boot timestamp
        // once the clock is also ready.
        if let Some(mqtt) = fanout.mqtt.as_mut() {
            mqtt.maybe_announce();
            mqtt.maybe_publish_boot(&clock);
        }

        // WiFi reconnection poll (exponential backoff).
        wifi.poll(now_ms);

        // Status beacon.
        let status = if wifi.is_connected() {
            SystemStatus::Ok
        } else {
            SystemStatus::WifiIssue
        };
        if let Some((r, g, b)) = beacon.tick(now_ms as u32, status) {
            led.set_colour(r, g, b);
        }
    }
}
