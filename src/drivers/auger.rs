//! Stepper auger driver (ULN2003 + 28BYJ-48 unipolar motor).
//!
//! One feeding unit is one auger revolution: a short backward run to
//! un-wedge any jammed kibble, then the forward run that dispenses.  The
//! phase coils are driven directly via GPIO in a half-step sequence with a
//! fixed inter-step delay; `release` drops all coils so the motor doesn't
//! heat up between feeds.
//!
//! ## Safety contract
//!
//! The driver is a dumb actuator: no stall or jam detection exists in the
//! hardware, so a unit always "completes".  Exclusive use is enforced one
//! level up by the actuator gate.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives real GPIO via hw_init helpers.
//! On host/test: tracks state in-memory only.

use crate::app::ports::FeedActuator;
use crate::config::FeederConfig;
use crate::drivers::hw_init;
use crate::drivers::status_led::{hue_to_rgb, StatusLed};
use crate::pins;

/// Half-step phase sequence (A1, A2, B1, B2 bit per pin).
const HALF_STEP_SEQUENCE: [u8; 4] = [0b1010, 0b0110, 0b0101, 0b1001];

/// Hue advance per revolution for the feeding animation.
const FEED_HUE_STEP: u8 = 7;

pub struct AugerDriver {
    step_interval_us: u32,
    steps_forward: u32,
    steps_backward: u32,
    /// Current position in the phase sequence (wraps).
    step_index: u8,
    /// Rolling hue for the feeding animation.
    hue: u8,
    led: StatusLed,
    energised: bool,
    units_run: u32,
}

impl AugerDriver {
    pub fn new(config: &FeederConfig) -> Self {
        Self {
            step_interval_us: config.step_interval_us,
            steps_forward: config.steps_forward,
            steps_backward: config.steps_backward,
            step_index: 0,
            hue: 0,
            led: StatusLed::new(),
            energised: false,
            units_run: 0,
        }
    }

    /// Advance one half-step in the given direction (+1 / -1).
    fn step(&mut self, dir: i8) {
        let phases = HALF_STEP_SEQUENCE[(self.step_index & 0b11) as usize];
        for (bit, &pin) in pins::MOTOR_PHASE_GPIOS.iter().enumerate() {
            hw_init::gpio_write(pin, phases & (1 << bit) != 0);
        }
        hw_init::delay_us(self.step_interval_us);
        self.step_index = self.step_index.wrapping_add(dir as u8);
    }

    /// Revolutions completed since boot.
    pub fn units_run(&self) -> u32 {
        self.units_run
    }

    pub fn is_energised(&self) -> bool {
        self.energised
    }
}

impl FeedActuator for AugerDriver {
    fn run_unit(&mut self) {
        self.energised = true;

        for _ in 0..self.steps_backward {
            self.step(-1);
        }
        for _ in 0..self.steps_forward {
            self.step(1);
        }

        self.hue = self.hue.wrapping_add(FEED_HUE_STEP);
        let (r, g, b) = hue_to_rgb(self.hue);
        self.led.set_colour(r, g, b);

        self.units_run += 1;
    }

    fn release(&mut self) {
        for &pin in &pins::MOTOR_PHASE_GPIOS {
            hw_init::gpio_write(pin, false);
        }
        self.led.off();
        self.energised = false;
    }
}
