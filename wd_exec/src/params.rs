//! Watchdog executable parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the watchdog executable, loaded from `wd_exec.toml`.
///
/// The defaults are the flight values, used when no parameter file is
/// available (for example in unit tests).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WdParams {
    /// Target period of one main loop cycle in seconds.
    pub cycle_period_s: f64,

    /// Period of the timer tick interrupt in seconds.
    pub timer_tick_period_s: f64,

    /// Number of timer ticks between heartbeat telemetry frames.
    pub heartbeat_tick_interval: u32,

    /// Time budget for retrying fuel gauge initialisation in seconds.
    pub gauge_init_timeout_s: f64,

    /// Time to wait for the wireless link to come up in seconds. Readiness is
    /// not observable so this wait is timeout-only.
    pub link_ready_wait_s: f64,

    /// Number of timer ticks without a stroke after which the compute module
    /// is reset, when aliveness monitoring is enabled.
    pub cm_stroke_tick_limit: u32,

    /// Thermistor reading above which a high temperature event is raised.
    pub high_temp_threshold: u16,

    /// Battery voltage in millivolts below which a power issue event is
    /// raised.
    pub batt_low_threshold_mv: u16,

    /// Capacity of the event queue, must be a power of two.
    pub event_queue_capacity: usize,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for WdParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.01,
            timer_tick_period_s: 0.1,
            heartbeat_tick_interval: 3,
            gauge_init_timeout_s: 10.0,
            link_ready_wait_s: 25.0,
            cm_stroke_tick_limit: 600,
            high_temp_threshold: 3000,
            batt_low_threshold_mv: 3100,
            event_queue_capacity: 64,
        }
    }
}
