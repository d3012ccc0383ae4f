//! System configuration parameters
//!
//! All tunable parameters for the feeder, plus the fixed MQTT topic map.
//! The default feed portion persisted in NVS lives with the schedule table
//! (`crate::schedule`); this struct carries the boot-time tunables.

use serde::{Deserialize, Serialize};

/// Firmware identification, reported over MQTT discovery.
pub const FIRMWARE_MODEL: &str = "ESP32 Feeder";

/// Fixed UTC offset applied to published timestamps (seconds east of UTC).
pub const UTC_OFFSET_SECS: i32 = 3 * 3600;

// ---------------------------------------------------------------------------
// MQTT topic map (Home Assistant conventions)
// ---------------------------------------------------------------------------

pub const MQTT_TOPIC_BOOT_TIME: &str = "homeassistant/sensor/feeder/boot_time/state";
pub const MQTT_TOPIC_FEED_CMD: &str = "homeassistant/button/feeder/feed/set";
pub const MQTT_TOPIC_LAST_FEEDING: &str = "homeassistant/sensor/feeder/last_feeding/state";
pub const MQTT_TOPIC_AVAILABILITY: &str = "homeassistant/binary_sensor/feeder/availability/state";

/// Core feeder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederConfig {
    // --- Feeding ---
    /// Default portion in auger revolutions, used until NVS overrides it.
    pub default_feed_amount: u32,

    // --- Auger stepping ---
    /// Delay between motor half-steps (microseconds).
    pub step_interval_us: u32,
    /// Forward steps per revolution.
    pub steps_forward: u32,
    /// Backward (anti-jam) steps per revolution.
    pub steps_backward: u32,

    // --- Button ---
    /// Hold duration that enters calibration mode (milliseconds).
    pub hold_threshold_ms: u32,

    // --- Timing ---
    /// Schedule evaluation interval (milliseconds).
    pub schedule_tick_ms: u32,
    /// Heartbeat log interval (seconds).
    pub heartbeat_interval_secs: u32,

    // --- MQTT ---
    /// Broker host (IP or hostname).
    pub mqtt_host: heapless::String<64>,
    /// Broker TCP port.
    pub mqtt_port: u16,
    /// Client identifier presented to the broker.
    pub mqtt_client_id: heapless::String<32>,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            // Feeding
            default_feed_amount: 15,

            // Auger stepping (28BYJ-48 geometry with anti-jam backoff)
            step_interval_us: 3_000,
            steps_forward: 19,
            steps_backward: 12,

            // Button
            hold_threshold_ms: 500,

            // Timing
            schedule_tick_ms: 1_000, // 1 Hz
            heartbeat_interval_secs: 30,

            // MQTT
            mqtt_host: heapless::String::try_from("192.168.1.1").unwrap_or_default(),
            mqtt_port: 1883,
            mqtt_client_id: heapless::String::try_from("ESP32-Feeder").unwrap_or_default(),
        }
    }
}

impl FeederConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.default_feed_amount == 0 {
            return Err("default_feed_amount must be positive");
        }
        if !(500..=20_000).contains(&self.step_interval_us) {
            return Err("step_interval_us must be 500–20000");
        }
        if self.steps_forward == 0 || self.steps_forward <= self.steps_backward {
            return Err("steps_forward must exceed steps_backward");
        }
        if !(100..=10_000).contains(&self.schedule_tick_ms) {
            return Err("schedule_tick_ms must be 100–10000");
        }
        if !(100..=10_000).contains(&self.hold_threshold_ms) {
            return Err("hold_threshold_ms must be 100–10000");
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("heartbeat_interval_secs must be positive");
        }
        if self.mqtt_host.is_empty() {
            return Err("mqtt_host must not be empty");
        }
        if self.mqtt_port == 0 {
            return Err("mqtt_port must be non-zero");
        }
        Ok(())
    }
}
