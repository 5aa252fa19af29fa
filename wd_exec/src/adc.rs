//! # ADC collaborator interface
//!
//! The watchdog's ADC samples the battery voltage, supply rails and the
//! battery thermistor. Conversions and channel reconfigurations are
//! non-instant: the caller starts one and polls `is_sample_done` until it
//! completes. The channel set differs between lander-attached operation and
//! free-roving mission operation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A complete set of ADC readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdcReadings {
    /// Battery voltage in millivolts.
    pub battery_mv: u16,

    /// Battery thermistor reading, raw counts. Higher is hotter.
    pub battery_therm: u16,

    /// 3V3 rail voltage in millivolts.
    pub rail_3v3_mv: u16,

    /// 5V rail voltage in millivolts.
    pub rail_5v_mv: u16,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// ADC channel configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcConfig {
    /// Channel set for operation while docked to the lander.
    LanderAttached,

    /// Channel set for free-roving mission operation.
    Mission,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The ADC collaborator.
pub trait Adc {
    /// True if no conversion or reconfiguration is in progress. Polling this
    /// advances the simulated hardware by one step.
    fn is_sample_done(&mut self) -> bool;

    /// Return the latest complete reading set, starting a new conversion if
    /// the ADC is idle. Returns `None` while a conversion is in progress.
    fn check_voltage_levels(&mut self) -> Option<AdcReadings>;

    /// Begin a (non-instant) reconfiguration for the given channel set.
    fn setup(&mut self, config: AdcConfig);

    /// The currently configured channel set.
    fn config(&self) -> AdcConfig;
}

// ---------------------------------------------------------------------------
// SIMULATION
// ---------------------------------------------------------------------------

/// Simulated ADC with configurable conversion latency, used on the bench and
/// in tests.
pub struct SimAdc {
    state: Rc<RefCell<SimAdcState>>,
}

/// Shared state of a [`SimAdc`], mutable through the test-side handle.
pub struct SimAdcState {
    /// Readings returned by every completed conversion.
    pub readings: AdcReadings,

    /// Number of polls a conversion or reconfiguration takes.
    pub latency_polls: u8,

    busy_polls_left: u8,
    config: AdcConfig,
}

impl SimAdc {
    pub fn new(latency_polls: u8) -> (Self, Rc<RefCell<SimAdcState>>) {
        let state = Rc::new(RefCell::new(SimAdcState {
            readings: AdcReadings {
                battery_mv: 3700,
                battery_therm: 1800,
                rail_3v3_mv: 3300,
                rail_5v_mv: 5000,
            },
            latency_polls,
            // Boot with a conversion in progress, as the hardware does after
            // its power-on self check
            busy_polls_left: latency_polls,
            config: AdcConfig::LanderAttached,
        }));

        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl Adc for SimAdc {
    fn is_sample_done(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.busy_polls_left > 0 {
            state.busy_polls_left -= 1;
            false
        } else {
            true
        }
    }

    fn check_voltage_levels(&mut self) -> Option<AdcReadings> {
        let mut state = self.state.borrow_mut();
        if state.busy_polls_left > 0 {
            state.busy_polls_left -= 1;
            None
        } else {
            // Conversion complete, hand out the readings and start the next
            state.busy_polls_left = state.latency_polls;
            Some(state.readings)
        }
    }

    fn setup(&mut self, config: AdcConfig) {
        let mut state = self.state.borrow_mut();
        state.config = config;
        state.busy_polls_left = state.latency_polls;
    }

    fn config(&self) -> AdcConfig {
        self.state.borrow().config
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_conversion_latency() {
        let (mut adc, _state) = SimAdc::new(2);

        // Boot conversion in progress
        assert!(!adc.is_sample_done());
        assert!(!adc.is_sample_done());
        assert!(adc.is_sample_done());

        // Next read completes immediately, then a new conversion starts
        assert!(adc.check_voltage_levels().is_some());
        assert!(adc.check_voltage_levels().is_none());
    }

    #[test]
    fn test_sim_setup_restarts_busy() {
        let (mut adc, _state) = SimAdc::new(1);

        while !adc.is_sample_done() {}

        adc.setup(AdcConfig::Mission);
        assert_eq!(adc.config(), AdcConfig::Mission);
        assert!(!adc.is_sample_done());
        assert!(adc.is_sample_done());
    }
}
