//! Hardware timer module using ESP-IDF's esp_timer API.
//!
//! Creates periodic timers that push events into the lock-free SPSC queue.
//! On simulation targets the main loop drives ticks directly.
//!
//! Timer callbacks execute in the ESP timer task context (not ISR), so
//! they can safely call push_event() which uses atomics.

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
static mut SCHEDULE_TIMER: esp_timer_handle_t = core::ptr::null_mut();
#[cfg(target_os = "espidf")]
static mut HEARTBEAT_TIMER: esp_timer_handle_t = core::ptr::null_mut();

/// SAFETY: SCHEDULE_TIMER is written once in `start_timers()` before any
/// timer callbacks fire.  Only called from the single main task.
#[cfg(target_os = "espidf")]
unsafe fn schedule_timer() -> esp_timer_handle_t {
    unsafe { SCHEDULE_TIMER }
}

/// SAFETY: Same invariants as `schedule_timer()`.
#[cfg(target_os = "espidf")]
unsafe fn heartbeat_timer() -> esp_timer_handle_t {
    unsafe { HEARTBEAT_TIMER }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn schedule_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::ScheduleTick);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn heartbeat_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::HeartbeatTick);
}

/// Start the hardware tick timers.
///
/// - Schedule evaluation timer (`schedule_tick_ms`, design target 1 Hz)
/// - Heartbeat log timer (`heartbeat_secs`)
#[cfg(target_os = "espidf")]
pub fn start_timers(schedule_tick_ms: u32, heartbeat_secs: u32) {
    // SAFETY: SCHEDULE_TIMER and HEARTBEAT_TIMER are written here once at
    // boot from the single main-task context before any timer callbacks
    // fire.  The callbacks themselves only call push_event().
    unsafe {
        let schedule_args = esp_timer_create_args_t {
            callback: Some(schedule_tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"schedule\0".as_ptr() as *const _,
            skip_unhandled_events: false,
        };
        let ret = esp_timer_create(&schedule_args, &raw mut SCHEDULE_TIMER);
        if ret != ESP_OK {
            log::error!(
                "hw_timer: schedule timer create failed (rc={}) — schedules will not fire",
                ret
            );
            return;
        }
        let ret = esp_timer_start_periodic(SCHEDULE_TIMER, schedule_tick_ms as u64 * 1_000);
        if ret != ESP_OK {
            log::error!("hw_timer: schedule timer start failed (rc={})", ret);
            return;
        }

        let heartbeat_args = esp_timer_create_args_t {
            callback: Some(heartbeat_tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"heartbeat\0".as_ptr() as *const _,
            skip_unhandled_events: false,
        };
        let ret = esp_timer_create(&heartbeat_args, &raw mut HEARTBEAT_TIMER);
        if ret != ESP_OK {
            log::error!("hw_timer: heartbeat timer create failed (rc={})", ret);
            return;
        }
        let ret = esp_timer_start_periodic(HEARTBEAT_TIMER, heartbeat_secs as u64 * 1_000_000);
        if ret != ESP_OK {
            log::error!("hw_timer: heartbeat timer start failed (rc={})", ret);
            return;
        }

        info!(
            "hw_timer: schedule@{}ms + heartbeat@{}s started",
            schedule_tick_ms, heartbeat_secs
        );
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn start_timers(_schedule_tick_ms: u32, _heartbeat_secs: u32) {
    log::info!("hw_timer(sim): timers not started (events driven by sleep loop)");
}

/// Stop all hardware tick timers.
#[cfg(target_os = "espidf")]
pub fn stop_timers() {
    // SAFETY: handles are valid if start_timers() succeeded; null-check
    // prevents stopping a timer that never started.
    unsafe {
        // SAFETY: schedule_timer()/heartbeat_timer() contract — main task only.
        let st = schedule_timer();
        if !st.is_null() {
            esp_timer_stop(st);
        }
        let ht = heartbeat_timer();
        if !ht.is_null() {
            esp_timer_stop(ht);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn stop_timers() {}
