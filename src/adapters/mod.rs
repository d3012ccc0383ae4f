//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements  | Connects to                      |
//! |------------|-------------|----------------------------------|
//! | `http`     | command source | ESP-IDF HTTP server           |
//! | `log_sink` | EventSink   | Serial log output                |
//! | `mqtt`     | EventSink   | MQTT broker (Home Assistant)     |
//! |            | command source |                               |
//! | `nvs`      | StoragePort | NVS / in-memory store            |
//! | `time`     | Clock       | ESP32 system clock (SNTP-synced) |
//! | `wifi`     | ConnectivityPort | ESP-IDF WiFi STA            |

pub mod http;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
