//! # Hardware control lines
//!
//! Control lines the watchdog drives directly from its own pins: native
//! resets, native rails, the heater switch, battery charging, the HDRM
//! deploy line, the RS422 transceiver enable and the diagnostic wake
//! interrupt. Lines multiplexed through the I2C I/O expander are *not* here,
//! they are written through the I2C action scheduler.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use log::{info, trace};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reset lines driven directly from watchdog pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetLine {
    /// Camera assembly reset.
    Cams,

    /// Wireless module reset.
    Wifi,
}

/// Voltage rails switched directly from watchdog pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    /// 3V3 peripheral rail.
    V3V3,

    /// 5V peripheral rail.
    V5,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The hardware control line collaborator.
pub trait HwCtrl {
    /// Assert or release a reset line.
    fn set_reset(&mut self, line: ResetLine, asserted: bool);

    /// Enable or disable a voltage rail.
    fn set_rail(&mut self, rail: Rail, enabled: bool);

    /// Switch the battery heater.
    fn set_heater(&mut self, on: bool);

    /// Start or stop battery charging from the lander supply.
    fn set_battery_charge(&mut self, on: bool);

    /// Drive the HDRM deploy line.
    fn set_deploy(&mut self, asserted: bool);

    /// Enable or disable the RS422 transceiver towards the lander.
    fn set_rs422(&mut self, enabled: bool);

    /// Enable or disable the edge-triggered diagnostic wake interrupt.
    fn set_wake_interrupt(&mut self, enabled: bool);
}

// ---------------------------------------------------------------------------
// SIMULATION
// ---------------------------------------------------------------------------

/// Simulated control lines: records the commanded level of every line so
/// tests and the bench build can inspect them.
pub struct SimHw {
    state: Rc<RefCell<SimHwState>>,
}

/// Line levels of a [`SimHw`], readable through the test-side handle.
#[derive(Debug, Clone, Default)]
pub struct SimHwState {
    pub cams_reset_asserted: bool,
    pub wifi_reset_asserted: bool,
    pub rail_3v3_on: bool,
    pub rail_5v_on: bool,
    pub heater_on: bool,
    pub battery_charge_on: bool,
    pub deploy_asserted: bool,
    pub rs422_enabled: bool,
    pub wake_interrupt_enabled: bool,
}

impl SimHw {
    pub fn new() -> (Self, Rc<RefCell<SimHwState>>) {
        let state = Rc::new(RefCell::new(SimHwState {
            // RS422 towards the lander is up from power-on
            rs422_enabled: true,
            ..SimHwState::default()
        }));

        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl HwCtrl for SimHw {
    fn set_reset(&mut self, line: ResetLine, asserted: bool) {
        trace!("HW reset {:?} asserted={}", line, asserted);
        let mut state = self.state.borrow_mut();
        match line {
            ResetLine::Cams => state.cams_reset_asserted = asserted,
            ResetLine::Wifi => state.wifi_reset_asserted = asserted,
        }
    }

    fn set_rail(&mut self, rail: Rail, enabled: bool) {
        trace!("HW rail {:?} enabled={}", rail, enabled);
        let mut state = self.state.borrow_mut();
        match rail {
            Rail::V3V3 => state.rail_3v3_on = enabled,
            Rail::V5 => state.rail_5v_on = enabled,
        }
    }

    fn set_heater(&mut self, on: bool) {
        trace!("HW heater on={}", on);
        self.state.borrow_mut().heater_on = on;
    }

    fn set_battery_charge(&mut self, on: bool) {
        trace!("HW battery charge on={}", on);
        self.state.borrow_mut().battery_charge_on = on;
    }

    fn set_deploy(&mut self, asserted: bool) {
        // Always worth a permanent record
        info!("HW deploy line asserted={}", asserted);
        self.state.borrow_mut().deploy_asserted = asserted;
    }

    fn set_rs422(&mut self, enabled: bool) {
        info!("HW RS422 transceiver enabled={}", enabled);
        self.state.borrow_mut().rs422_enabled = enabled;
    }

    fn set_wake_interrupt(&mut self, enabled: bool) {
        trace!("HW wake interrupt enabled={}", enabled);
        self.state.borrow_mut().wake_interrupt_enabled = enabled;
    }
}
