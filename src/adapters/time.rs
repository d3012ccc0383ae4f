//! ESP32 time adapter.
//!
//! Two clocks live here:
//!
//! - **Monotonic uptime** for driver timing (button debounce, LED beacon).
//!   Wraps `esp_timer_get_time()` on device, `std::time::Instant` on host.
//! - **Wall clock** implementing the [`Clock`] port: local calendar time
//!   via `gettimeofday`/`localtime_r`, valid only after SNTP has synced.
//!   Readings before 2020 are rejected as unsynced.  On host targets the
//!   wall clock reads `None`; tests inject fakes instead.

use crate::app::ports::{Clock, WallClock};

/// System clock adapter for the ESP32 platform.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.uptime_ms() / 1_000
    }
}

impl Clock for SystemClock {
    /// Current local calendar time, or `None` until SNTP has produced a
    /// plausible reading.
    #[cfg(target_os = "espidf")]
    fn now(&self) -> Option<WallClock> {
        use core::ptr;

        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        // Reject obviously unsynced time (e.g. before 2020-01-01).
        const EPOCH_2020: i64 = 1_577_836_800;
        if i64::from(tv.tv_sec) < EPOCH_2020 {
            return None;
        }

        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        if !(0..=23).contains(&tm.tm_hour) || !(0..=59).contains(&tm.tm_min) {
            return None;
        }

        Some(WallClock {
            year: (tm.tm_year + 1900) as u16,
            month: (tm.tm_mon + 1) as u8,
            day: tm.tm_mday as u8,
            hour: tm.tm_hour as u8,
            minute: tm.tm_min as u8,
            // localtime_r can report 60 on a leap second; clamp into range.
            second: tm.tm_sec.min(59) as u8,
        })
    }

    /// On non-ESP targets (simulation) the wall clock is never synced.
    #[cfg(not(target_os = "espidf"))]
    fn now(&self) -> Option<WallClock> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.uptime_ms();
        let b = clock.uptime_ms();
        assert!(b >= a);
    }

    #[test]
    fn host_wall_clock_is_unsynced() {
        let clock = SystemClock::new();
        assert!(clock.now().is_none());
    }
}
