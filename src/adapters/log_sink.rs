//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production).  The MQTT adapter implements
//! the same trait for the home-automation side.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::FeedCompleted(e) => {
                info!(
                    "FEED  | {} revs | source={} | clock={}",
                    e.amount,
                    e.source.as_str(),
                    if e.clock.is_some() { "synced" } else { "unsynced" },
                );
            }
            AppEvent::DefaultAmountChanged(amount) => {
                info!("PORTION | default -> {} revs", amount);
            }
            AppEvent::ScheduleChanged => {
                info!("SCHED | table updated");
            }
        }
    }
}
