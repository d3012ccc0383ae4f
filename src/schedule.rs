//! Feeding schedule table.
//!
//! A fixed-capacity array of time-of-day entries plus the default portion
//! size.  The table is the in-memory source of truth while running; every
//! mutation is flushed to the persistent store.  Slot index is stable
//! identity — entries are disabled, never removed.
//!
//! Persisted layout (namespace `"feeder"`):
//!
//! | key          | type    | meaning                    |
//! |--------------|---------|----------------------------|
//! | `feedAmount` | u32 LE  | default portion (revs)     |
//! | `sched{i}_h` | u8      | entry hour                 |
//! | `sched{i}_m` | u8      | entry minute               |
//! | `sched{i}_a` | u32 LE  | entry portion (revs)       |
//! | `sched{i}_e` | u8      | entry enabled (0/1)        |
//!
//! The `fired` latch is transient and never persisted.

use log::{info, warn};

use crate::app::ports::StoragePort;
use crate::error::{ScheduleError, StorageError};

/// Number of schedule slots (compile-time capacity).
pub const SCHEDULE_SLOTS: usize = 5;

/// NVS namespace holding all feeder state.
pub const STORE_NAMESPACE: &str = "feeder";

const FEED_AMOUNT_KEY: &str = "feedAmount";

/// How many of the seeded default entries start enabled.
const DEFAULT_ENABLED_SLOTS: usize = 3;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One configured time-of-day trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Trigger hour, local time (0–23).
    pub hour: u8,
    /// Trigger minute (0–59).
    pub minute: u8,
    /// Portion for this entry, in auger revolutions.
    pub amount: u32,
    /// Disabled entries are inert but keep their slot.
    pub enabled: bool,
    /// Latched once the entry fires within its matching minute.
    /// Cleared the moment the clock no longer matches.  Transient.
    pub(crate) fired: bool,
}

impl ScheduleEntry {
    /// Whether this entry already fired in the current matching minute.
    pub fn fired(&self) -> bool {
        self.fired
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// The schedule table plus the global default portion.
#[derive(Debug, Clone)]
pub struct ScheduleTable {
    entries: [ScheduleEntry; SCHEDULE_SLOTS],
    default_amount: u32,
}

impl ScheduleTable {
    /// Seed the table with first-boot defaults: entries spread evenly over
    /// the day at the default portion, the first few enabled.
    pub fn new(default_amount: u32) -> Self {
        let mut entries = [ScheduleEntry {
            hour: 0,
            minute: 0,
            amount: default_amount,
            enabled: false,
            fired: false,
        }; SCHEDULE_SLOTS];

        for (i, entry) in entries.iter_mut().enumerate() {
            entry.hour = ((i * 4) % 24) as u8; // 0, 4, 8, 12, 16
            entry.enabled = i < DEFAULT_ENABLED_SLOTS;
        }

        Self {
            entries,
            default_amount,
        }
    }

    /// Populate the table from the persistent store.
    ///
    /// Missing keys keep their seeded default — a blank store never fails
    /// boot.  Stored values outside the valid range also keep the default.
    pub fn load(storage: &impl StoragePort, fallback_default: u32) -> Self {
        let default_amount = read_u32(storage, FEED_AMOUNT_KEY)
            .filter(|a| *a > 0)
            .unwrap_or(fallback_default);

        let mut table = Self::new(default_amount);

        for i in 0..SCHEDULE_SLOTS {
            let entry = &mut table.entries[i];
            if let Some(h) = read_u8(storage, &format!("sched{i}_h")).filter(|h| *h <= 23) {
                entry.hour = h;
            }
            if let Some(m) = read_u8(storage, &format!("sched{i}_m")).filter(|m| *m <= 59) {
                entry.minute = m;
            }
            if let Some(a) = read_u32(storage, &format!("sched{i}_a")).filter(|a| *a > 0) {
                entry.amount = a;
            }
            if let Some(e) = read_bool(storage, &format!("sched{i}_e")) {
                entry.enabled = e;
            }
        }

        for (i, e) in table.entries.iter().enumerate() {
            if e.enabled {
                info!(
                    "schedule #{}: {:02}:{:02} — {} revs",
                    i + 1,
                    e.hour,
                    e.minute,
                    e.amount
                );
            }
        }
        info!("default portion: {} revs", table.default_amount);

        table
    }

    /// Write every entry field plus the default portion to the store.
    ///
    /// Called from the single control loop after each mutation; the store
    /// is per-key atomic and there is no concurrent writer, so the write
    /// sequence is one logical transaction from the caller's perspective.
    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        write_u32(storage, FEED_AMOUNT_KEY, self.default_amount)?;

        for (i, e) in self.entries.iter().enumerate() {
            write_u8(storage, &format!("sched{i}_h"), e.hour)?;
            write_u8(storage, &format!("sched{i}_m"), e.minute)?;
            write_u32(storage, &format!("sched{i}_a"), e.amount)?;
            write_u8(storage, &format!("sched{i}_e"), u8::from(e.enabled))?;
        }

        info!("schedule saved ({} slots)", SCHEDULE_SLOTS);
        Ok(())
    }

    /// Replace one entry's fields.  Rejects out-of-range values without
    /// touching the table.  The `fired` latch is cleared so the updated
    /// time is eligible immediately.
    pub fn update_entry(
        &mut self,
        index: usize,
        hour: u8,
        minute: u8,
        amount: u32,
        enabled: bool,
    ) -> Result<(), ScheduleError> {
        if index >= SCHEDULE_SLOTS {
            return Err(ScheduleError::IndexOutOfRange);
        }
        if hour > 23 {
            return Err(ScheduleError::InvalidHour);
        }
        if minute > 59 {
            return Err(ScheduleError::InvalidMinute);
        }
        if amount == 0 {
            return Err(ScheduleError::InvalidAmount);
        }

        self.entries[index] = ScheduleEntry {
            hour,
            minute,
            amount,
            enabled,
            fired: false,
        };
        Ok(())
    }

    /// Flip one entry's enabled flag.  Returns the new state.
    pub fn toggle_entry(&mut self, index: usize) -> Result<bool, ScheduleError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ScheduleError::IndexOutOfRange)?;
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    /// Portion used when a feed request carries no explicit amount.
    pub fn default_amount(&self) -> u32 {
        self.default_amount
    }

    /// Set the default portion.  Zero is rejected.
    pub fn set_default_amount(&mut self, amount: u32) -> Result<(), ScheduleError> {
        if amount == 0 {
            return Err(ScheduleError::InvalidAmount);
        }
        self.default_amount = amount;
        Ok(())
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ScheduleEntry] {
        &mut self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ScheduleEntry> {
        self.entries.get(index)
    }

    pub fn capacity(&self) -> usize {
        SCHEDULE_SLOTS
    }
}

// ---------------------------------------------------------------------------
// Typed key encoding over the byte-oriented store
// ---------------------------------------------------------------------------

fn read_u8(storage: &impl StoragePort, key: &str) -> Option<u8> {
    let mut buf = [0u8; 1];
    match storage.read(STORE_NAMESPACE, key, &mut buf) {
        Ok(1) => Some(buf[0]),
        Ok(_) => {
            warn!("store: key '{}' has unexpected length, ignoring", key);
            None
        }
        Err(_) => None,
    }
}

fn read_u32(storage: &impl StoragePort, key: &str) -> Option<u32> {
    let mut buf = [0u8; 4];
    match storage.read(STORE_NAMESPACE, key, &mut buf) {
        Ok(4) => Some(u32::from_le_bytes(buf)),
        Ok(_) => {
            warn!("store: key '{}' has unexpected length, ignoring", key);
            None
        }
        Err(_) => None,
    }
}

fn read_bool(storage: &impl StoragePort, key: &str) -> Option<bool> {
    read_u8(storage, key).map(|v| v != 0)
}

fn write_u8(storage: &mut impl StoragePort, key: &str, value: u8) -> Result<(), StorageError> {
    storage.write(STORE_NAMESPACE, key, &[value])
}

fn write_u32(storage: &mut impl StoragePort, key: &str, value: u32) -> Result<(), StorageError> {
    storage.write(STORE_NAMESPACE, key, &value.to_le_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
