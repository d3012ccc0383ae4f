//! Outbound application events.
//!
//! The [`FeedService`](super::service::FeedService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them — log to serial, publish over MQTT, etc.
//! Events are ephemeral: constructed, handed to the sink, discarded.

use super::ports::WallClock;

/// Where a feed request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    /// Physical button click.
    Manual,
    /// Schedule evaluator.
    Scheduled,
    /// Message-bus command.
    Remote,
    /// HTTP API.
    Api,
}

impl FeedSource {
    /// Wire name used in published payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "button",
            Self::Scheduled => "schedule",
            Self::Remote => "mqtt",
            Self::Api => "web",
        }
    }
}

/// Record of one completed feed.  `clock` is `None` when the wall clock
/// was unavailable at completion time (sinks substitute a sentinel epoch
/// timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedEvent {
    pub clock: Option<WallClock>,
    pub amount: u32,
    pub source: FeedSource,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// A feed ran to completion.
    FeedCompleted(FeedEvent),

    /// The default portion changed (API call or calibration).
    DefaultAmountChanged(u32),

    /// One or more schedule entries were updated or toggled.
    ScheduleChanged,
}
