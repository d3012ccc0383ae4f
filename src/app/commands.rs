//! Inbound commands and the transport → control-loop bridge.
//!
//! HTTP handlers and the MQTT receiver run on their own tasks; they never
//! touch domain state directly.  Instead they normalise requests into
//! [`InboundCommand`]s and push them through a bounded channel that the
//! single-threaded control loop drains.  A full channel drops the command
//! (the transport layers are responsible for any retry).
//!
//! ```text
//! ┌──────────────┐  InboundCommand  ┌──────────────┐
//! │ HTTP / MQTT  │─────────────────▶│ Control Loop │
//! │  (own task)  │                  │   (sync)     │
//! └──────────────┘                  └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use super::events::FeedSource;
use crate::schedule::SCHEDULE_SLOTS;

/// One entry of a bulk schedule update, already range-parsed from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryUpdate {
    pub hour: u8,
    pub minute: u8,
    pub amount: u32,
    pub enabled: bool,
}

/// Commands that transports can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Run a feed.  `amount == None` means "use the default portion".
    Feed {
        amount: Option<u32>,
        source: FeedSource,
    },

    /// Bulk-replace schedule entries, slot 0 upward.
    ApplySchedules(Vec<EntryUpdate, SCHEDULE_SLOTS>),

    /// Flip one entry's enabled flag (0-based slot).
    ToggleEntry { index: usize },

    /// Set the default portion.
    SetDefaultAmount { amount: u32 },
}

/// Channel depth for inbound commands.
const CMD_DEPTH: usize = 8;

/// Inbound command channel: transports → control loop.
static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, InboundCommand, CMD_DEPTH> =
    Channel::new();

/// Enqueue a command from a transport task.
/// Returns `false` (and drops the command) when the channel is full.
pub fn submit(cmd: InboundCommand) -> bool {
    if COMMAND_CHANNEL.try_send(cmd).is_err() {
        warn!("command channel full — inbound command dropped");
        return false;
    }
    true
}

/// Take the next pending command, if any.  Called from the control loop.
pub fn next() -> Option<InboundCommand> {
    COMMAND_CHANNEL.try_receive().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trip_preserves_order() {
        // Drain anything a concurrently-run test might have left behind.
        while next().is_some() {}

        assert!(submit(InboundCommand::Feed {
            amount: Some(3),
            source: FeedSource::Api,
        }));
        assert!(submit(InboundCommand::ToggleEntry { index: 2 }));

        assert_eq!(
            next(),
            Some(InboundCommand::Feed {
                amount: Some(3),
                source: FeedSource::Api,
            })
        );
        assert_eq!(next(), Some(InboundCommand::ToggleEntry { index: 2 }));
        assert_eq!(next(), None);
    }
}
