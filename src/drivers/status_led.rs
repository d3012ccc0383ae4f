//! RGB status LED driver and beacon indicator.
//!
//! Three LEDC PWM channels drive discrete R/G/B LEDs (or a common-cathode
//! RGB LED).  On top of the raw driver sits the beacon: a short dim flash
//! whose colour and interval encode system health, so the feeder is never
//! a bright light source in a dark room.
//!
//! | Status      | Colour | Interval |
//! |-------------|--------|----------|
//! | Ok          | green  | 30 s     |
//! | Wi-Fi issue | blue   | 10 s     |
//! | Error       | red    | 3 s      |
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives three LEDC PWM channels via hw_init.
//! On host/test: tracks state in-memory only.

use crate::drivers::hw_init;

// ───────────────────────────────────────────────────────────────
// Raw driver
// ───────────────────────────────────────────────────────────────

pub struct StatusLed {
    current: (u8, u8, u8),
}

impl StatusLed {
    pub fn new() -> Self {
        Self { current: (0, 0, 0) }
    }

    pub fn set_colour(&mut self, r: u8, g: u8, b: u8) {
        hw_init::ledc_set(hw_init::LEDC_CH_LED_R, r);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_G, g);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_B, b);
        self.current = (r, g, b);
    }

    pub fn off(&mut self) {
        self.set_colour(0, 0, 0);
    }

    pub fn current_colour(&self) -> (u8, u8, u8) {
        self.current
    }
}

/// Boot indication: alternate blue/red three times, then clear.
/// Blocking; runs once before the event loop starts.
pub fn boot_flash(led: &mut StatusLed) {
    for _ in 0..3 {
        led.set_colour(0, 0, 255);
        hw_init::delay_ms(200);
        led.set_colour(255, 0, 0);
        hw_init::delay_ms(200);
    }
    led.off();
}

// ───────────────────────────────────────────────────────────────
// Beacon
// ───────────────────────────────────────────────────────────────

/// System health reported through the beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Ok,
    WifiIssue,
    Error,
}

/// Flash brightness (dim — indicator, not illumination).
const FLASH_BRIGHTNESS: u8 = 15;

/// Flash duration in milliseconds.
const FLASH_DURATION_MS: u32 = 50;

fn beacon_params(status: SystemStatus) -> (u32, (u8, u8, u8)) {
    match status {
        SystemStatus::Ok => (30_000, (0, FLASH_BRIGHTNESS, 0)),
        SystemStatus::WifiIssue => (10_000, (0, 0, FLASH_BRIGHTNESS)),
        SystemStatus::Error => (3_000, (FLASH_BRIGHTNESS, 0, 0)),
    }
}

/// Pure flash-timing state machine.  `tick` returns the colour to apply
/// when a change is due (`(0,0,0)` ends a flash), or `None` to leave the
/// LED untouched.
pub struct StatusBeacon {
    last_flash_ms: u32,
    flash_started_ms: Option<u32>,
}

impl StatusBeacon {
    pub fn new() -> Self {
        Self {
            last_flash_ms: 0,
            flash_started_ms: None,
        }
    }

    pub fn tick(&mut self, now_ms: u32, status: SystemStatus) -> Option<(u8, u8, u8)> {
        let (interval_ms, colour) = beacon_params(status);

        match self.flash_started_ms {
            Some(start) => {
                if now_ms.wrapping_sub(start) >= FLASH_DURATION_MS {
                    self.flash_started_ms = None;
                    Some((0, 0, 0))
                } else {
                    None
                }
            }
            None => {
                if now_ms.wrapping_sub(self.last_flash_ms) >= interval_ms {
                    self.last_flash_ms = now_ms;
                    self.flash_started_ms = Some(now_ms);
                    Some(colour)
                } else {
                    None
                }
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Colour wheel (feeding animation)
// ───────────────────────────────────────────────────────────────

/// Map a 0–255 hue onto a fully-saturated RGB colour wheel.
pub fn hue_to_rgb(hue: u8) -> (u8, u8, u8) {
    let segment = hue / 85;
    let offset = (hue % 85) as u16 * 3;
    let ramp_up = offset.min(255) as u8;
    let ramp_down = 255 - ramp_up;

    match segment {
        0 => (ramp_down, ramp_up, 0),
        1 => (0, ramp_down, ramp_up),
        _ => (ramp_up, 0, ramp_down),
    }
}
