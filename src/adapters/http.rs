//! HTTP API adapter.
//!
//! Endpoints (mirroring the device's local web API):
//!
//! | Endpoint              | Method   | Action                                |
//! |-----------------------|----------|---------------------------------------|
//! | `/api/time`           | GET      | current wall-clock reading            |
//! | `/api/schedules`      | GET      | schedule table + default portion      |
//! | `/api/schedules`      | POST     | bulk schedule update (strict JSON)    |
//! | `/api/feed`           | GET      | feed, optional `amount` parameter     |
//! | `/api/toggle`         | GET      | flip entry by 1-based `id`            |
//! | `/api/setbase`        | GET      | set default portion via `amount`      |
//!
//! Handlers run on the HTTP server task, never on the control loop.  Reads
//! are served from a snapshot the control loop refreshes after every
//! mutation; every mutation is normalised into an
//! [`InboundCommand`](crate::app::commands::InboundCommand) and queued for
//! the control loop.  Bulk schedule bodies are parsed with a strict typed
//! schema — a structurally invalid document rejects the whole batch, and
//! field ordering is irrelevant.
//!
//! DTOs and parsing are plain functions so host tests cover them without a
//! server; the `EspHttpServer` wiring is device-only.

use serde::{Deserialize, Serialize};

use crate::app::commands::EntryUpdate;
use crate::schedule::{ScheduleTable, SCHEDULE_SLOTS};

/// Largest accepted schedule POST body.
pub const MAX_BODY_BYTES: usize = 2048;

// ───────────────────────────────────────────────────────────────
// DTOs
// ───────────────────────────────────────────────────────────────

/// One schedule entry on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntryDto {
    pub hour: u8,
    pub minute: u8,
    pub amount: u32,
    pub enabled: bool,
}

/// Response document for `GET /api/schedules` — also the control loop's
/// read snapshot shared with the server task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDoc {
    #[serde(rename = "feedAmount")]
    pub feed_amount: u32,
    pub schedules: Vec<ScheduleEntryDto>,
}

impl ScheduleDoc {
    pub fn from_table(table: &ScheduleTable) -> Self {
        Self {
            feed_amount: table.default_amount(),
            schedules: table
                .entries()
                .iter()
                .map(|e| ScheduleEntryDto {
                    hour: e.hour,
                    minute: e.minute,
                    amount: e.amount,
                    enabled: e.enabled,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Request document for `POST /api/schedules`.
#[derive(Debug, Deserialize)]
struct SchedulePostDoc {
    schedules: Vec<ScheduleEntryDto>,
}

/// Strictly parse a bulk schedule body.
///
/// Structural failure (malformed JSON, missing/mistyped fields) rejects
/// the whole batch.  Values that are well-typed but out of range (e.g.
/// hour 25) survive parsing and are rejected per-entry when applied, so
/// one bad entry does not block the rest.  Entries beyond the table
/// capacity are ignored.
pub fn parse_schedule_batch(
    body: &[u8],
) -> Result<heapless::Vec<EntryUpdate, SCHEDULE_SLOTS>, serde_json::Error> {
    let doc: SchedulePostDoc = serde_json::from_slice(body)?;
    let mut batch = heapless::Vec::new();
    for dto in doc.schedules.into_iter().take(SCHEDULE_SLOTS) {
        // Capacity matches the take() bound.
        let _ = batch.push(EntryUpdate {
            hour: dto.hour,
            minute: dto.minute,
            amount: dto.amount,
            enabled: dto.enabled,
        });
    }
    Ok(batch)
}

// ───────────────────────────────────────────────────────────────
// Query-string helpers
// ───────────────────────────────────────────────────────────────

/// Extract a query parameter value from a request URI.
pub fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next()?;
        let value = parts.next().unwrap_or_default();
        if name == key {
            return Some(value.replace('+', " "));
        }
    }
    None
}

/// Parse a positive integer query parameter.
pub fn positive_param(uri: &str, key: &str) -> Option<u32> {
    query_param(uri, key)?
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}

// ───────────────────────────────────────────────────────────────
// Device server (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use espidf_impl::start_server;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use super::*;
    use std::sync::{Arc, Mutex};

    use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
    use esp_idf_svc::http::Method;
    use esp_idf_svc::io::{Read, Write};
    use log::info;

    use crate::adapters::mqtt::format_timestamp;
    use crate::adapters::time::SystemClock;
    use crate::app::commands::{self, InboundCommand};
    use crate::app::events::FeedSource;
    use crate::app::ports::Clock;
    use crate::error::CommsError;

    use esp_idf_svc::http::server::{EspHttpConnection, Request};

    fn write_ok(req: Request<&mut EspHttpConnection<'_>>) -> anyhow::Result<()> {
        req.into_ok_response()?.write_all(b"OK")?;
        Ok(())
    }

    fn write_json(req: Request<&mut EspHttpConnection<'_>>, body: &str) -> anyhow::Result<()> {
        req.into_response(
            200,
            Some("OK"),
            &[("Content-Type", "application/json; charset=utf-8")],
        )?
        .write_all(body.as_bytes())?;
        Ok(())
    }

    fn write_error(
        req: Request<&mut EspHttpConnection<'_>>,
        status: u16,
        message: &str,
    ) -> anyhow::Result<()> {
        req.into_response(status, None, &[("Content-Type", "text/plain")])?
            .write_all(message.as_bytes())?;
        Ok(())
    }

    fn read_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> anyhow::Result<Option<Vec<u8>>> {
        let mut body = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = req.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_BODY_BYTES {
                return Ok(None); // oversized
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(Some(body))
    }

    /// Start the HTTP API server.
    ///
    /// `snapshot` is the control loop's read model: refreshed by the loop
    /// after every mutation, served here without touching domain state.
    pub fn start_server(
        snapshot: Arc<Mutex<ScheduleDoc>>,
    ) -> Result<EspHttpServer<'static>, CommsError> {
        let conf = HttpConfiguration {
            stack_size: 8 * 1024,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf).map_err(|_| CommsError::HttpServerFailed)?;

        server
            .fn_handler::<anyhow::Error, _>("/api/time", Method::Get, move |req| {
                let clock = SystemClock::new();
                let body = match clock.now() {
                    Some(now) => {
                        serde_json::json!({ "time": format_timestamp(Some(now)) }).to_string()
                    }
                    None => serde_json::json!({ "time": "unsynced" }).to_string(),
                };
                write_json(req, &body)
            })
            .map_err(|_| CommsError::HttpServerFailed)?;

        {
            let snapshot = Arc::clone(&snapshot);
            server
                .fn_handler::<anyhow::Error, _>("/api/schedules", Method::Get, move |req| {
                    let doc = {
                        let guard = match snapshot.lock() {
                            Ok(g) => g,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        guard.to_json()
                    };
                    write_json(req, &doc)
                })
                .map_err(|_| CommsError::HttpServerFailed)?;
        }

        server
            .fn_handler::<anyhow::Error, _>("/api/schedules", Method::Post, move |mut req| {
                let Some(body) = read_body(&mut req)? else {
                    return write_error(req, 413, "body too large");
                };
                match parse_schedule_batch(&body) {
                    Ok(batch) => {
                        commands::submit(InboundCommand::ApplySchedules(batch));
                        write_ok(req)
                    }
                    Err(e) => {
                        log::warn!("HTTP: schedule body rejected: {}", e);
                        write_error(req, 400, "bad schedule document")
                    }
                }
            })
            .map_err(|_| CommsError::HttpServerFailed)?;

        server
            .fn_handler::<anyhow::Error, _>("/api/feed", Method::Get, move |req| {
                let amount = positive_param(req.uri(), "amount");
                commands::submit(InboundCommand::Feed {
                    amount,
                    source: FeedSource::Api,
                });
                write_ok(req)
            })
            .map_err(|_| CommsError::HttpServerFailed)?;

        server
            .fn_handler::<anyhow::Error, _>("/api/toggle", Method::Get, move |req| {
                match positive_param(req.uri(), "id") {
                    Some(id) => {
                        commands::submit(InboundCommand::ToggleEntry {
                            index: (id - 1) as usize,
                        });
                        write_ok(req)
                    }
                    None => write_error(req, 400, "missing or invalid 'id'"),
                }
            })
            .map_err(|_| CommsError::HttpServerFailed)?;

        server
            .fn_handler::<anyhow::Error, _>("/api/setbase", Method::Get, move |req| {
                match positive_param(req.uri(), "amount") {
                    Some(amount) => {
                        commands::submit(InboundCommand::SetDefaultAmount { amount });
                        write_ok(req)
                    }
                    None => write_error(req, 400, "missing or invalid 'amount'"),
                }
            })
            .map_err(|_| CommsError::HttpServerFailed)?;

        info!("HTTP: API server started on port 80");
        Ok(server)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
