//! GPIO / peripheral pin assignments for the feeder main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//!
//! Pin assignments match the ESP32-CAM carrier board layout.

// ---------------------------------------------------------------------------
// Auger stepper motor (ULN2003 darlington driver, unipolar 28BYJ-48)
// ---------------------------------------------------------------------------

/// Motor phase outputs, in half-step sequence order (A1, A2, B1, B2).
pub const MOTOR_PHASE_GPIOS: [i32; 4] = [12, 13, 15, 14];

// ---------------------------------------------------------------------------
// Status LED (discrete RGB via LEDC PWM)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 16;
pub const LED_G_GPIO: i32 = 4;
pub const LED_B_GPIO: i32 = 33;

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC frequency for the RGB status LED (1 kHz).
pub const LED_PWM_FREQ_HZ: u32 = 1_000;

// ---------------------------------------------------------------------------
// User button (active-low with internal pull-up)
// ---------------------------------------------------------------------------

/// Momentary push-button: click feeds, hold calibrates.
pub const BUTTON_GPIO: i32 = 2;
