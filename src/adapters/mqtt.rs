//! MQTT adapter — home-automation integration.
//!
//! Inbound: the feed-command topic is normalised into
//! [`InboundCommand::Feed`](crate::app::commands::InboundCommand) and pushed
//! onto the command channel; the payload is the portion as integer text, and
//! anything non-positive or unparseable falls back to the default portion.
//!
//! Outbound (all retained, so late subscribers see the last value):
//! - `last_feeding`: `{timestamp, amount, source}` per completed feed,
//!   best-effort — dropped when the broker is unreachable, never queued.
//! - `boot_time`: published once, as soon as both the broker connection and
//!   the wall clock are ready.
//! - `availability`: `online`, with an `offline` last-will.
//!
//! Plus Home Assistant discovery configs on startup.
//!
//! Payload construction and parsing are plain functions so host tests cover
//! them without a broker; the `EspMqttClient` wiring is device-only.

use serde::Serialize;

use crate::app::events::FeedEvent;
use crate::app::ports::WallClock;
use crate::config::{
    FIRMWARE_MODEL, MQTT_TOPIC_AVAILABILITY, MQTT_TOPIC_BOOT_TIME, MQTT_TOPIC_FEED_CMD,
    MQTT_TOPIC_LAST_FEEDING, UTC_OFFSET_SECS,
};

/// Timestamp published when the wall clock is unavailable.
pub const SENTINEL_TIMESTAMP: &str = "1970-01-01T00:00:00+00:00";

/// Payloads above this size are dropped before parsing.
pub const MAX_PAYLOAD_BYTES: usize = 64;

// ───────────────────────────────────────────────────────────────
// Inbound payload parsing
// ───────────────────────────────────────────────────────────────

/// Parse a feed-command payload: the portion as integer text.
/// Non-positive or unparseable values yield `None` (use the default).
pub fn parse_feed_amount(payload: &[u8]) -> Option<u32> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return None;
    }
    let text = core::str::from_utf8(payload).ok()?.trim();
    let value: i64 = text.parse().ok()?;
    u32::try_from(value).ok().filter(|v| *v > 0)
}

// ───────────────────────────────────────────────────────────────
// Outbound payload construction
// ───────────────────────────────────────────────────────────────

fn offset_suffix(offset_secs: i32) -> String {
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.unsigned_abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// ISO-8601 local timestamp with the configured fixed UTC offset, or the
/// sentinel epoch when the clock is unavailable.
pub fn format_timestamp(clock: Option<WallClock>) -> String {
    match clock {
        Some(c) => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}",
            c.year,
            c.month,
            c.day,
            c.hour,
            c.minute,
            c.second,
            offset_suffix(UTC_OFFSET_SECS)
        ),
        None => SENTINEL_TIMESTAMP.to_string(),
    }
}

#[derive(Serialize)]
struct LastFeedingPayload<'a> {
    timestamp: String,
    amount: u32,
    source: &'a str,
}

/// JSON body for the last-feeding topic.
pub fn feed_payload(event: &FeedEvent) -> String {
    let payload = LastFeedingPayload {
        timestamp: format_timestamp(event.clock),
        amount: event.amount,
        source: event.source.as_str(),
    };
    // Serialisation of this shape cannot fail; fall back to empty object
    // rather than propagate.
    serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string())
}

/// Home Assistant MQTT discovery configs: `(topic, payload)` pairs.
pub fn discovery_messages() -> [(String, String); 4] {
    let device = serde_json::json!({
        "identifiers": ["esp32_feeder"],
        "name": "Pet Feeder",
        "model": FIRMWARE_MODEL,
        "manufacturer": "DIY",
        "sw_version": env!("CARGO_PKG_VERSION"),
    });

    let availability = serde_json::json!({
        "name": "Feeder Online",
        "unique_id": "feeder_availability",
        "state_topic": MQTT_TOPIC_AVAILABILITY,
        "payload_on": "online",
        "payload_off": "offline",
        "device_class": "connectivity",
        "device": device,
    });

    let boot_time = serde_json::json!({
        "name": "Boot Time",
        "unique_id": "feeder_boot_time",
        "state_topic": MQTT_TOPIC_BOOT_TIME,
        "device_class": "timestamp",
        "icon": "mdi:clock-start",
        "device": device,
    });

    let last_feeding = serde_json::json!({
        "name": "Last Feeding",
        "unique_id": "feeder_last_feeding",
        "state_topic": MQTT_TOPIC_LAST_FEEDING,
        "device_class": "timestamp",
        "icon": "mdi:food-drumstick",
        "value_template": "{{ value_json.timestamp }}",
        "json_attributes_topic": MQTT_TOPIC_LAST_FEEDING,
        "device": device,
    });

    let feed_button = serde_json::json!({
        "name": "Feed Now",
        "unique_id": "feeder_feed_button",
        "command_topic": MQTT_TOPIC_FEED_CMD,
        "icon": "mdi:cat",
        "payload_press": "",
        "device": device,
    });

    [
        (
            "homeassistant/binary_sensor/feeder/availability/config".to_string(),
            availability.to_string(),
        ),
        (
            "homeassistant/sensor/feeder/boot_time/config".to_string(),
            boot_time.to_string(),
        ),
        (
            "homeassistant/sensor/feeder/last_feeding/config".to_string(),
            last_feeding.to_string(),
        ),
        (
            "homeassistant/button/feeder/feed/config".to_string(),
            feed_button.to_string(),
        ),
    ]
}

// ───────────────────────────────────────────────────────────────
// Device client (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use espidf_impl::MqttAdapter;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use super::*;
    use log::{info, warn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration,
        MqttClientConfiguration, QoS,
    };

    use crate::app::commands::{self, InboundCommand};
    use crate::app::events::{AppEvent, FeedSource};
    use crate::app::ports::{Clock, EventSink};
    use crate::config::FeederConfig;
    use crate::error::CommsError;

    pub struct MqttAdapter {
        client: Arc<Mutex<EspMqttClient<'static>>>,
        connected: Arc<AtomicBool>,
        boot_published: bool,
        announced: bool,
    }

    impl MqttAdapter {
        /// Create the client and start the receive loop.  The feed-command
        /// subscription happens on every (re)connect inside the receiver;
        /// availability + discovery go out via [`maybe_announce`].
        ///
        /// [`maybe_announce`]: Self::maybe_announce
        pub fn new(config: &FeederConfig) -> Result<Self, CommsError> {
            let url = format!("mqtt://{}:{}", config.mqtt_host, config.mqtt_port);

            let conf = MqttClientConfiguration {
                client_id: Some(config.mqtt_client_id.as_str()),
                lwt: Some(LwtConfiguration {
                    topic: crate::config::MQTT_TOPIC_AVAILABILITY,
                    payload: b"offline",
                    qos: QoS::AtMostOnce,
                    retain: true,
                }),
                ..Default::default()
            };

            let (client, connection) = EspMqttClient::new(url.as_str(), &conf)
                .map_err(|_| CommsError::MqttConnectFailed)?;
            let client = Arc::new(Mutex::new(client));
            let connected = Arc::new(AtomicBool::new(false));

            spawn_receiver(connection, Arc::clone(&client), Arc::clone(&connected));

            info!(
                "MQTT: client '{}' -> {}",
                config.mqtt_client_id, url
            );

            Ok(Self {
                client,
                connected,
                boot_published: false,
                announced: false,
            })
        }

        pub fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }

        fn publish_retained(&self, topic: &str, payload: &[u8]) -> bool {
            let mut client = match self.client.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            match client.enqueue(topic, QoS::AtMostOnce, true, payload) {
                Ok(_) => true,
                Err(e) => {
                    warn!("MQTT: publish to '{}' failed: {:?}", topic, e);
                    false
                }
            }
        }

        /// Publish the boot timestamp once, as soon as both the broker and
        /// the wall clock are ready.
        pub fn maybe_publish_boot(&mut self, clock: &impl Clock) {
            if self.boot_published || !self.is_connected() {
                return;
            }
            let Some(now) = clock.now() else {
                return;
            };
            let stamp = format_timestamp(Some(now));
            if self.publish_retained(crate::config::MQTT_TOPIC_BOOT_TIME, stamp.as_bytes()) {
                self.boot_published = true;
                info!("MQTT: boot time published: {}", stamp);
            }
        }

        /// Announce `online` and push the Home Assistant discovery configs,
        /// once, after the first successful connection.
        pub fn maybe_announce(&mut self) {
            if self.announced || !self.is_connected() {
                return;
            }
            self.publish_retained(crate::config::MQTT_TOPIC_AVAILABILITY, b"online");
            for (topic, payload) in discovery_messages() {
                self.publish_retained(&topic, payload.as_bytes());
            }
            self.announced = true;
            info!("MQTT: availability + discovery configs published");
        }
    }

    impl EventSink for MqttAdapter {
        fn emit(&mut self, event: &AppEvent) {
            let AppEvent::FeedCompleted(feed) = event else {
                return;
            };
            if !self.is_connected() {
                // Best-effort contract: the feed already happened, the
                // notification is simply lost.
                warn!("MQTT: broker unreachable — feed event dropped");
                return;
            }
            let payload = feed_payload(feed);
            if self.publish_retained(crate::config::MQTT_TOPIC_LAST_FEEDING, payload.as_bytes()) {
                info!("MQTT: feed event published: {}", payload);
            }
        }
    }

    fn spawn_receiver(
        mut connection: EspMqttConnection,
        client: Arc<Mutex<EspMqttClient<'static>>>,
        connected: Arc<AtomicBool>,
    ) {
        let builder = std::thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(8 * 1024);
        let spawned = builder.spawn(move || loop {
            match connection.next() {
                Ok(event) => match event.payload() {
                    EventPayload::Connected(_) => {
                        connected.store(true, Ordering::Relaxed);
                        let mut c = match client.lock() {
                            Ok(c) => c,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        if let Err(e) =
                            c.subscribe(crate::config::MQTT_TOPIC_FEED_CMD, QoS::AtMostOnce)
                        {
                            warn!("MQTT: subscribe failed: {:?}", e);
                        }
                        info!("MQTT: connected, feed-command topic subscribed");
                    }
                    EventPayload::Disconnected => {
                        connected.store(false, Ordering::Relaxed);
                        warn!("MQTT: disconnected");
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } => {
                        if !matches!(details, Details::Complete) {
                            continue;
                        }
                        if topic == crate::config::MQTT_TOPIC_FEED_CMD {
                            let amount = parse_feed_amount(data);
                            info!("MQTT: feed command received (amount={:?})", amount);
                            commands::submit(InboundCommand::Feed {
                                amount,
                                source: FeedSource::Remote,
                            });
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("MQTT: receive loop error: {:?}", e);
                    std::thread::sleep(std::time::Duration::from_secs(2));
                }
            }
        });
        if let Err(e) = spawned {
            warn!("MQTT: receiver thread spawn failed: {}", e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::FeedSource;

    #[test]
    fn feed_amount_parsing_table() {
        assert_eq!(parse_feed_amount(b"7"), Some(7));
        assert_eq!(parse_feed_amount(b" 12 \n"), Some(12));
        assert_eq!(parse_feed_amount(b"0"), None);
        assert_eq!(parse_feed_amount(b"-5"), None);
        assert_eq!(parse_feed_amount(b"abc"), None);
        assert_eq!(parse_feed_amount(b""), None);
        assert_eq!(parse_feed_amount(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn oversized_payload_rejected() {
        let big = vec![b'1'; MAX_PAYLOAD_BYTES + 1];
        assert_eq!(parse_feed_amount(&big), None);
    }

    #[test]
    fn timestamp_formatting_with_clock() {
        let clock = WallClock {
            year: 2024,
            month: 3,
            day: 9,
            hour: 8,
            minute: 5,
            second: 2,
        };
        assert_eq!(format_timestamp(Some(clock)), "2024-03-09T08:05:02+03:00");
    }

    #[test]
    fn timestamp_sentinel_without_clock() {
        assert_eq!(format_timestamp(None), SENTINEL_TIMESTAMP);
    }

    #[test]
    fn offset_suffix_formats() {
        assert_eq!(offset_suffix(3 * 3600), "+03:00");
        assert_eq!(offset_suffix(0), "+00:00");
        assert_eq!(offset_suffix(-(5 * 3600 + 1800)), "-05:30");
    }

    #[test]
    fn feed_payload_shape() {
        let event = FeedEvent {
            clock: None,
            amount: 15,
            source: FeedSource::Scheduled,
        };
        let json: serde_json::Value = serde_json::from_str(&feed_payload(&event)).unwrap();
        assert_eq!(json["timestamp"], SENTINEL_TIMESTAMP);
        assert_eq!(json["amount"], 15);
        assert_eq!(json["source"], "schedule");
    }

    #[test]
    fn discovery_messages_are_valid_json() {
        for (topic, payload) in discovery_messages() {
            assert!(topic.starts_with("homeassistant/"));
            let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert!(parsed["device"]["identifiers"].is_array());
        }
    }
}
