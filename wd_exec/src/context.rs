//! # Rover context
//!
//! The single shared mutable aggregate of the watchdog. It is owned by the
//! state machine driver and passed by mutable reference into every handler;
//! no other component holds a reference across an event boundary, and it is
//! only ever touched from the main loop, so no lock is needed around it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

// Internal
use crate::adc::{Adc, AdcReadings};
use crate::events::{Event, EventSender};
use crate::hw::HwCtrl;
use crate::i2c::{GaugeReadings, I2cAction, I2cBus, I2cPoll, I2cResult, I2cScheduler};
use crate::link::Link;
use crate::params::WdParams;
use comms_if::cm::CmMessage;
use comms_if::gnd::WdTelemetry;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Power fault bit: battery under-voltage.
pub const POWER_FAULT_BATT_UV: u8 = 1 << 0;

/// Power fault bit: peripheral rail under-voltage.
pub const POWER_FAULT_RAIL_UV: u8 = 1 << 1;

/// Name of the persistent configuration file.
const PERSISTENT_FILE_NAME: &str = "wd_persistent.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Configuration which survives a watchdog reset, backed by a JSON file
/// standing in for the flight unit's FRAM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistentConfig {
    /// Heater proportional gain.
    pub heater_kp: u16,

    /// Thermistor value below which the heater switches on.
    pub auto_heater_on_value: u16,

    /// Thermistor value above which the heater switches off.
    pub auto_heater_off_value: u16,

    /// Heater PWM duty cycle.
    pub heater_duty_cycle: u16,

    /// Heater PWM period.
    pub heater_duty_cycle_period: u16,

    /// True once a PrepForDeploy command has armed the deployment sequence.
    pub deploy_armed: bool,

    /// True once the HDRM has been fired.
    pub deployed: bool,

    /// True once the rover has entered Mission at least once.
    pub mission_entered: bool,
}

/// The persistent configuration plus where it lives on disk.
pub struct PersistentStore {
    pub config: PersistentConfig,
    path: Option<PathBuf>,
}

/// Compute module aliveness monitoring state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmMonitor {
    /// True if the watchdog resets the compute module when strokes stop.
    pub enabled: bool,

    /// Timer ticks since the last stroke was received.
    pub ticks_since_stroke: u32,

    /// True while a monitor-triggered reset pulse is waiting for its release
    /// write.
    pub reset_pending: bool,
}

/// The shared context threaded through every state handler.
pub struct RoverContext {
    pub params: WdParams,

    // Telemetry snapshots
    /// Latest ADC reading set.
    pub adc_readings: AdcReadings,

    /// Latest fuel gauge reading set.
    pub gauge_readings: GaugeReadings,

    // I2C
    pub i2c: I2cScheduler,
    pub i2c_bus: Box<dyn I2cBus>,

    /// Result of the most recently completed I2C action, consumed by
    /// [`RoverContext::complete_i2c`].
    pub last_i2c_result: Option<I2cResult>,

    /// Commanded I/O expander output register value.
    pub io_expander_out: u8,

    // Collaborators
    pub adc: Box<dyn Adc>,
    pub hw: Box<dyn HwCtrl>,
    pub lander_link: Box<dyn Link>,
    pub cm_link: Box<dyn Link>,

    // Received frames awaiting processing by the current state
    pub lander_frames: VecDeque<Vec<u8>>,
    pub cm_frames: VecDeque<Vec<u8>>,

    // Persistent configuration
    pub persistent: PersistentStore,

    // Monitoring
    pub monitor: CmMonitor,

    /// Active power fault bits (`POWER_FAULT_*`).
    pub power_fault_mask: u8,

    // Heater
    /// Master enable for the heater thermostat. Cleared on a high
    /// temperature event.
    pub heater_enabled: bool,

    /// Current commanded heater line level.
    pub heater_on: bool,

    /// Producer handle for completion events raised from the main loop's
    /// driver pumps.
    pub event_tx: EventSender,

    /// Sequence number for outgoing compute module frames.
    pub cm_seq: u8,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            heater_kp: 500,
            auto_heater_on_value: 1600,
            auto_heater_off_value: 2000,
            heater_duty_cycle: 8500,
            heater_duty_cycle_period: 10000,
            deploy_armed: false,
            deployed: false,
            mission_entered: false,
        }
    }
}

impl PersistentStore {
    /// Load the store from the persistent directory, falling back to the
    /// defaults if the file is missing or unreadable.
    pub fn load(persistent_root: &std::path::Path) -> Self {
        let path = persistent_root.join(PERSISTENT_FILE_NAME);

        let config = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(c) => {
                    info!("Persistent configuration restored from {:?}", path);
                    c
                }
                Err(e) => {
                    warn!(
                        "Persistent configuration at {:?} is corrupt ({}), using defaults",
                        path, e
                    );
                    PersistentConfig::default()
                }
            },
            Err(_) => {
                info!("No persistent configuration found, using defaults");
                PersistentConfig::default()
            }
        };

        Self {
            config,
            path: Some(path),
        }
    }

    /// An in-memory store which never touches disk, used in tests.
    pub fn in_memory() -> Self {
        Self {
            config: PersistentConfig::default(),
            path: None,
        }
    }

    /// Write the store back to disk. Failures are logged, not fatal: the
    /// rover must keep running without its non-volatile store.
    pub fn save(&self) {
        let path = match &self.path {
            Some(p) => p,
            None => return,
        };

        match serde_json::to_string_pretty(&self.config) {
            Ok(s) => {
                if let Err(e) = fs::write(path, s) {
                    warn!("Could not save persistent configuration: {}", e);
                }
            }
            Err(e) => warn!("Could not serialise persistent configuration: {}", e),
        }
    }
}

impl RoverContext {
    /// Advance the I2C driver by one main-loop cycle.
    ///
    /// Polls the in-flight action or dispatches the next pending one. Any
    /// event this raises goes onto the queue like every other signal, and is
    /// also returned for the caller's benefit.
    pub fn pump_i2c(&mut self) -> Option<Event> {
        let event = if self.i2c.is_active() {
            match self.i2c_bus.poll() {
                I2cPoll::Incomplete => None,
                I2cPoll::Done(result) => {
                    // Latch the result exactly once: poll keeps reporting
                    // Done until the action is cleared
                    if self.last_i2c_result.is_none() {
                        self.last_i2c_result = Some(result);
                        Some(Event::I2cDone)
                    } else {
                        None
                    }
                }
            }
        } else {
            match self
                .i2c
                .initiate_next_action(self.i2c_bus.as_mut(), self.io_expander_out)
            {
                Ok(Some(_)) => Some(Event::I2cStarted),
                Ok(None) => None,
                Err(e) => {
                    warn!("I2C dispatch failed: {}", e);
                    None
                }
            }
        };

        if let Some(event) = event {
            self.event_tx.put(event).ok();
        }

        event
    }

    /// Consume the completed I2C action: update telemetry snapshots, free the
    /// scheduler and acknowledge the bus. Handlers for `I2cDone` call this.
    pub fn complete_i2c(&mut self) -> Option<I2cResult> {
        let result = self.last_i2c_result.take()?;

        if result.success {
            if let Some(readings) = result.readings {
                self.gauge_readings = readings;
            }
        }

        self.i2c.complete();
        self.i2c_bus.clear_last_action();

        Some(result)
    }

    /// Set the commanded I/O expander register and queue the write action.
    pub fn write_io_expander(&mut self, value: u8) {
        self.io_expander_out = value;
        self.i2c.queue(I2cAction::WriteIoExpander);
    }

    /// Drive the heater line, recording the commanded level.
    pub fn set_heater(&mut self, on: bool) {
        self.heater_on = on;
        self.hw.set_heater(on);
    }

    /// Raise the given power fault bits.
    pub fn raise_power_fault(&mut self, bits: u8) {
        self.power_fault_mask |= bits;
    }

    /// Clear both power fault bits.
    pub fn clear_power_faults(&mut self) {
        self.power_fault_mask &= !(POWER_FAULT_BATT_UV | POWER_FAULT_RAIL_UV);
    }

    /// Send a frame on the lander link, logging on failure. The link is
    /// never allowed to take the state machine down.
    pub fn send_lander(&mut self, frame: &[u8]) {
        if let Err(e) = self.lander_link.send(frame) {
            warn!("Could not send on the lander link: {}", e);
        }
    }

    /// Send a message on the compute module link, stamping the sequence
    /// number.
    pub fn send_cm(&mut self, mut msg: CmMessage) {
        msg.header.seq = self.cm_seq;
        self.cm_seq = self.cm_seq.wrapping_add(1);

        if let Err(e) = self.cm_link.send(&msg.to_bytes()) {
            warn!("Could not send on the compute module link: {}", e);
        }
    }

    /// Build the heartbeat telemetry frame for the given state id.
    pub fn telemetry(&self, state_id: u8) -> WdTelemetry {
        WdTelemetry {
            state_id,
            battery_mv: self.adc_readings.battery_mv,
            battery_therm: self.adc_readings.battery_therm,
            heater_on: self.heater_on,
        }
    }
}

// ---------------------------------------------------------------------------
// TEST FIXTURES
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod fixtures {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::adc::{SimAdc, SimAdcState};
    use crate::events::EventQueue;
    use crate::hw::{SimHw, SimHwState};
    use crate::i2c::sim::{SimI2cBus, SimI2cState};
    use crate::link::{MemLink, MemLinkHandle};

    /// A fully simulated context plus the handles tests use to drive and
    /// inspect it.
    pub struct TestRig {
        pub ctx: RoverContext,
        pub queue: EventQueue,
        pub lander: MemLinkHandle,
        pub cm: MemLinkHandle,
        pub adc: Rc<RefCell<SimAdcState>>,
        pub i2c: Rc<RefCell<SimI2cState>>,
        pub hw: Rc<RefCell<SimHwState>>,
    }

    /// Build a rig with zero-latency simulated hardware and near-zero
    /// timeouts so sequences run to completion quickly.
    pub fn test_rig() -> TestRig {
        let queue = EventQueue::new(64).unwrap();
        let (adc, adc_state) = SimAdc::new(1);
        let (i2c_bus, i2c_state) = SimI2cBus::new(0);
        let (hw, hw_state) = SimHw::new();
        let (lander_link, lander) = MemLink::new();
        let (cm_link, cm) = MemLink::new();

        let mut params = WdParams::default();
        params.gauge_init_timeout_s = 0.2;
        params.link_ready_wait_s = 0.0;

        let ctx = RoverContext {
            params,
            adc_readings: AdcReadings::default(),
            gauge_readings: GaugeReadings::default(),
            i2c: I2cScheduler::new(),
            i2c_bus: Box::new(i2c_bus),
            last_i2c_result: None,
            io_expander_out: 0,
            adc: Box::new(adc),
            hw: Box::new(hw),
            lander_link: Box::new(lander_link),
            cm_link: Box::new(cm_link),
            lander_frames: VecDeque::new(),
            cm_frames: VecDeque::new(),
            persistent: PersistentStore::in_memory(),
            monitor: CmMonitor::default(),
            power_fault_mask: 0,
            heater_enabled: false,
            heater_on: false,
            event_tx: queue.sender(),
            cm_seq: 0,
        };

        TestRig {
            ctx,
            queue,
            lander,
            cm,
            adc: adc_state,
            i2c: i2c_state,
            hw: hw_state,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_persistent_round_trip() {
        let dir = std::env::temp_dir().join("wd_persistent_test");
        std::fs::create_dir_all(&dir).unwrap();
        // Start clean
        let _ = std::fs::remove_file(dir.join(PERSISTENT_FILE_NAME));

        let mut store = PersistentStore::load(&dir);
        assert_eq!(store.config, PersistentConfig::default());

        store.config.heater_kp = 750;
        store.config.deploy_armed = true;
        store.save();

        let restored = PersistentStore::load(&dir);
        assert_eq!(restored.config.heater_kp, 750);
        assert!(restored.config.deploy_armed);
    }

    #[test]
    fn test_clear_power_faults_clears_both_bits() {
        let mut rig = fixtures::test_rig();

        rig.ctx.raise_power_fault(POWER_FAULT_BATT_UV);
        rig.ctx.raise_power_fault(POWER_FAULT_RAIL_UV);
        assert_eq!(
            rig.ctx.power_fault_mask,
            POWER_FAULT_BATT_UV | POWER_FAULT_RAIL_UV
        );

        rig.ctx.clear_power_faults();
        assert_eq!(rig.ctx.power_fault_mask, 0);
    }

    #[test]
    fn test_pump_i2c_raises_started_then_done() {
        let mut rig = fixtures::test_rig();

        rig.ctx.write_io_expander(0x0F);

        assert_eq!(rig.ctx.pump_i2c(), Some(Event::I2cStarted));
        // Zero-latency bus: next pump observes completion
        assert_eq!(rig.ctx.pump_i2c(), Some(Event::I2cDone));
        // Result is latched once
        assert_eq!(rig.ctx.pump_i2c(), None);

        let result = rig.ctx.complete_i2c().unwrap();
        assert!(result.success);
        assert_eq!(rig.i2c.borrow().io_expander_reg, 0x0F);
        assert!(!rig.ctx.i2c.has_work());
    }
}
