//! ISR-debounced button driver with click and hold detection.
//!
//! ## Hardware
//!
//! Active-low momentary switch with internal pull-up. GPIO fires on
//! falling edge; the ISR records the raw timestamp into an atomic, and the
//! `tick()` method (called from the main loop) runs the debounce + gesture
//! state machine.
//!
//! ## Gesture detection
//!
//! | Gesture | Condition                              | Event       |
//! |---------|----------------------------------------|-------------|
//! | Click   | Release before the hold threshold      | `Click`     |
//! | Hold    | Still pressed at the hold threshold    | `HoldStart` |
//!
//! After `HoldStart` the caller owns the hold: the calibration loop polls
//! [`is_held`](ButtonDriver::is_held), which re-samples the pin level
//! every call and drops back to idle the instant the button releases.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::app::ports::HoldInput;

const DEBOUNCE_MS: u32 = 50;

/// Raw ISR timestamp (milliseconds since boot, truncated to u32).
/// Written by the ISR, read by the main loop.
static BUTTON_ISR_TIMESTAMP: AtomicU32 = AtomicU32::new(0);

/// Button events emitted after gesture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Click,
    HoldStart,
}

/// Internal state machine for gesture detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u32 },
    Pressed { since_ms: u32 },
    Holding,
}

pub struct ButtonDriver {
    gpio: i32,
    hold_threshold_ms: u32,
    state: GestureState,
    last_isr_ms: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_pressed: bool,
}

impl ButtonDriver {
    pub fn new(gpio: i32, hold_threshold_ms: u32) -> Self {
        Self {
            gpio,
            hold_threshold_ms,
            state: GestureState::Idle,
            last_isr_ms: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_pressed: false,
        }
    }

    /// GPIO pin this button is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Call from the main loop at each iteration.
    /// `now_ms` is the current monotonic time in milliseconds.
    /// Returns a classified gesture event, if any.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let isr_ms = BUTTON_ISR_TIMESTAMP.load(Ordering::Acquire);
        let new_press = isr_ms != self.last_isr_ms && isr_ms != 0;

        match self.state {
            GestureState::Idle => {
                if new_press {
                    self.last_isr_ms = isr_ms;
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            GestureState::DebounceWait { since_ms } => {
                // Contact-bounce edges re-fire the ISR; absorb them so a
                // stale timestamp cannot replay as a phantom press later.
                if new_press {
                    self.last_isr_ms = isr_ms;
                }
                if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = GestureState::Pressed { since_ms };
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                if new_press {
                    self.last_isr_ms = isr_ms;
                }
                let held_ms = now_ms.wrapping_sub(since_ms);

                if held_ms >= self.hold_threshold_ms && self.is_pressed_hw() {
                    self.state = GestureState::Holding;
                    return Some(ButtonEvent::HoldStart);
                }

                if !self.is_pressed_hw() {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::Click);
                }

                None
            }

            GestureState::Holding => {
                if new_press {
                    self.last_isr_ms = isr_ms;
                }
                if !self.is_pressed_hw() {
                    self.state = GestureState::Idle;
                }
                None
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn is_pressed_hw(&self) -> bool {
        // Active-low: pressed pulls the pin to ground.
        !crate::drivers::hw_init::gpio_read(self.gpio)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_pressed_hw(&self) -> bool {
        self.sim_pressed
    }

    /// Simulation hook for host tests: force the sampled pin level.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_pressed(&mut self, pressed: bool) {
        self.sim_pressed = pressed;
    }
}

impl HoldInput for ButtonDriver {
    /// Live hold predicate for the calibration loop.  Re-samples the pin
    /// on every call; a release is observed immediately, without waiting
    /// for the next `tick()`.
    fn is_held(&mut self) -> bool {
        if self.state != GestureState::Holding {
            return false;
        }
        if !self.is_pressed_hw() {
            self.state = GestureState::Idle;
            return false;
        }
        true
    }
}

/// ISR handler — register this on the button GPIO falling edge.
/// Safe to call from interrupt context (lock-free atomic store).
#[allow(unused)]
pub fn button_isr_handler(now_ms: u32) {
    BUTTON_ISR_TIMESTAMP.store(now_ms, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_isr() {
        BUTTON_ISR_TIMESTAMP.store(0, Ordering::SeqCst);
    }

    fn button() -> ButtonDriver {
        ButtonDriver::new(2, 500)
    }

    #[test]
    fn no_events_without_press() {
        reset_isr();
        let mut btn = button();
        assert_eq!(btn.tick(100), None);
        assert_eq!(btn.tick(200), None);
        assert!(!btn.is_held());
    }

    #[test]
    fn click_on_release_after_debounce() {
        reset_isr();
        let mut btn = button();
        btn.sim_set_pressed(true);
        button_isr_handler(100);

        assert_eq!(btn.tick(100), None); // debounce wait
        assert_eq!(btn.tick(130), None); // still within 50ms debounce
        assert_eq!(btn.tick(160), None); // debounce clears -> Pressed

        btn.sim_set_pressed(false);
        assert_eq!(btn.tick(200), Some(ButtonEvent::Click));
    }

    #[test]
    fn hold_start_at_threshold_then_live_release() {
        reset_isr();
        let mut btn = button();
        btn.sim_set_pressed(true);
        button_isr_handler(1000);

        btn.tick(1000); // ISR detected
        btn.tick(1060); // debounce clears -> Pressed
        assert_eq!(btn.tick(1600), Some(ButtonEvent::HoldStart));

        assert!(btn.is_held());
        assert!(btn.is_held()); // stable while pressed

        btn.sim_set_pressed(false);
        assert!(!btn.is_held()); // release observed without a tick()
        assert_eq!(btn.tick(1700), None); // no trailing click
    }
}
