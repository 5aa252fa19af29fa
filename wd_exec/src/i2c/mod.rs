//! # I2C action scheduler
//!
//! The watchdog shares one I2C bus between the battery fuel gauge and the
//! I/O expander. Every bus access is an asynchronous multi-step action:
//! callers queue actions into a pending bitmask, the scheduler drives exactly
//! one action at a time to completion, and completion is only ever observed
//! by polling the bus collaborator.
//!
//! Dispatch is round-robin over the fixed action set, starting from the
//! index after the last dispatched action, so a hot action cannot starve the
//! others.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// All actions in scheduler scan order.
pub const ALL_ACTIONS: [I2cAction; 7] = [
    I2cAction::GaugeReading,
    I2cAction::GaugeInit,
    I2cAction::WriteGaugeLowPower,
    I2cAction::ReadGaugeControl,
    I2cAction::InitIoExpander,
    I2cAction::WriteIoExpander,
    I2cAction::ReadIoExpander,
];

/// Bit assignments of the I/O expander output register.
pub mod io_exp {
    /// Radio rail enable.
    pub const RAIL_RADIO: u8 = 1 << 0;
    /// FPGA rail enable.
    pub const RAIL_FPGA: u8 = 1 << 1;
    /// Motor rail enable.
    pub const RAIL_MOTORS: u8 = 1 << 2;
    /// Compute module rail enable.
    pub const RAIL_CM: u8 = 1 << 3;
    /// Radio reset release (active-low reset, bit set = released).
    pub const RELEASE_RADIO_RESET: u8 = 1 << 4;
    /// FPGA reset release.
    pub const RELEASE_FPGA_RESET: u8 = 1 << 5;
    /// Compute module reset release.
    pub const RELEASE_CM_RESET: u8 = 1 << 6;
    /// Motor controller reset release.
    pub const RELEASE_MOTOR_RESETS: u8 = 1 << 7;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The fixed set of asynchronous I2C actions, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum I2cAction {
    /// Read the fuel gauge charge/current/voltage registers.
    GaugeReading = 1 << 0,

    /// Run the fuel gauge initialisation sequence.
    GaugeInit = 1 << 1,

    /// Put the fuel gauge into its low power mode.
    WriteGaugeLowPower = 1 << 2,

    /// Read back the fuel gauge control register.
    ReadGaugeControl = 1 << 3,

    /// Configure the I/O expander port directions.
    InitIoExpander = 1 << 4,

    /// Write the I/O expander output register.
    WriteIoExpander = 1 << 5,

    /// Read back the I/O expander output register.
    ReadIoExpander = 1 << 6,
}

/// Completion status of an action as reported by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cPoll {
    /// Still in flight.
    Incomplete,

    /// Finished, successfully or with NACKs.
    Done(I2cResult),
}

/// Errors associated with the bus collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum I2cBusError {
    #[error("An I2C action is already in flight")]
    Busy,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Fuel gauge sensor readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GaugeReadings {
    /// Remaining battery charge in mAh.
    pub charge_mah: u16,

    /// Battery current in mA, negative when discharging.
    pub current_ma: i16,

    /// Battery voltage in millivolts as seen by the gauge.
    pub voltage_mv: u16,
}

/// Terminal result of a completed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cResult {
    /// The action that finished.
    pub action: I2cAction,

    /// False if the device NACKed during the transaction.
    pub success: bool,

    /// Readings, for gauge read actions.
    pub readings: Option<GaugeReadings>,

    /// Raw register value, for register read actions.
    pub raw_value: u8,
}

/// The action scheduler: a pending bitmask, the in-flight action and the
/// round-robin scan position.
#[derive(Debug, Default)]
pub struct I2cScheduler {
    pending: u16,
    active: Option<I2cAction>,
    next_start: usize,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The I2C bus collaborator: issues one asynchronous action at a time.
pub trait I2cBus {
    /// Issue an action. Returns immediately; completion must be polled.
    ///
    /// `io_expander_value` is the output register value for
    /// [`I2cAction::WriteIoExpander`], ignored by other actions.
    fn initiate(&mut self, action: I2cAction, io_expander_value: u8) -> Result<(), I2cBusError>;

    /// Poll the in-flight action.
    fn poll(&mut self) -> I2cPoll;

    /// Acknowledge the completed action. Must be called before the next
    /// `initiate`.
    fn clear_last_action(&mut self);
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl I2cScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action. Queuing an already-pending action is a no-op, the
    /// mask accumulates until drained.
    pub fn queue(&mut self, action: I2cAction) {
        self.pending |= action as u16;
    }

    /// True if the given action is queued (not counting an in-flight one).
    pub fn is_pending(&self, action: I2cAction) -> bool {
        self.pending & (action as u16) != 0
    }

    /// The in-flight action, if any.
    pub fn active(&self) -> Option<I2cAction> {
        self.active
    }

    /// True if an action is in flight.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// True if anything is queued or in flight.
    pub fn has_work(&self) -> bool {
        self.pending != 0 || self.active.is_some()
    }

    /// True if the given action is queued or in flight.
    pub fn has_work_for(&self, action: I2cAction) -> bool {
        self.is_pending(action) || self.active == Some(action)
    }

    /// Dispatch the next pending action, if the bus is free.
    ///
    /// Scans the action set starting from the index after the last
    /// dispatched action, issues the first pending one, clears its bit and
    /// marks it active. Returns the dispatched action, or `None` if nothing
    /// was pending or an action is already in flight.
    pub fn initiate_next_action(
        &mut self,
        bus: &mut dyn I2cBus,
        io_expander_value: u8,
    ) -> Result<Option<I2cAction>, I2cBusError> {
        if self.active.is_some() {
            return Ok(None);
        }

        for offset in 0..ALL_ACTIONS.len() {
            let idx = (self.next_start + offset) % ALL_ACTIONS.len();
            let action = ALL_ACTIONS[idx];

            if self.pending & (action as u16) != 0 {
                bus.initiate(action, io_expander_value)?;

                self.pending &= !(action as u16);
                self.active = Some(action);
                self.next_start = (idx + 1) % ALL_ACTIONS.len();

                return Ok(Some(action));
            }
        }

        Ok(None)
    }

    /// Mark the in-flight action as finished. The caller must also clear the
    /// bus via [`I2cBus::clear_last_action`].
    pub fn complete(&mut self) {
        self.active = None;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::sim::SimI2cBus;
    use super::*;

    /// Drive the bus until the active action completes, then acknowledge it.
    fn run_to_completion(sched: &mut I2cScheduler, bus: &mut SimI2cBus) {
        loop {
            match bus.poll() {
                I2cPoll::Incomplete => (),
                I2cPoll::Done(_) => break,
            }
        }
        sched.complete();
        bus.clear_last_action();
    }

    #[test]
    fn test_one_action_at_a_time() {
        let (mut bus, state) = SimI2cBus::new(2);
        let mut sched = I2cScheduler::new();

        sched.queue(I2cAction::GaugeReading);
        sched.queue(I2cAction::WriteIoExpander);

        let first = sched.initiate_next_action(&mut bus, 0).unwrap();
        assert!(first.is_some());
        assert!(sched.is_active());

        // A second initiate while one is active dispatches nothing
        assert_eq!(sched.initiate_next_action(&mut bus, 0).unwrap(), None);
        assert_eq!(state.borrow().initiated.len(), 1);
    }

    #[test]
    fn test_round_robin_fairness() {
        let (mut bus, state) = SimI2cBus::new(0);
        let mut sched = I2cScheduler::new();

        // X = GaugeReading, Y = WriteIoExpander. Queue both, X dispatches
        // first.
        sched.queue(I2cAction::GaugeReading);
        sched.queue(I2cAction::WriteIoExpander);

        assert_eq!(
            sched.initiate_next_action(&mut bus, 0).unwrap(),
            Some(I2cAction::GaugeReading)
        );
        run_to_completion(&mut sched, &mut bus);

        // Requeue X while Y is still pending: Y must dispatch before X is
        // repeated.
        sched.queue(I2cAction::GaugeReading);

        assert_eq!(
            sched.initiate_next_action(&mut bus, 0).unwrap(),
            Some(I2cAction::WriteIoExpander)
        );
        run_to_completion(&mut sched, &mut bus);

        assert_eq!(
            sched.initiate_next_action(&mut bus, 0).unwrap(),
            Some(I2cAction::GaugeReading)
        );

        assert_eq!(
            state.borrow().initiated,
            vec![
                I2cAction::GaugeReading,
                I2cAction::WriteIoExpander,
                I2cAction::GaugeReading
            ]
        );
    }

    #[test]
    fn test_pending_mask_accumulates() {
        let (mut bus, _state) = SimI2cBus::new(0);
        let mut sched = I2cScheduler::new();

        sched.queue(I2cAction::GaugeInit);
        sched.queue(I2cAction::GaugeInit);
        sched.queue(I2cAction::ReadIoExpander);

        assert!(sched.has_work());

        // Duplicate queuing collapses into one dispatch
        assert_eq!(
            sched.initiate_next_action(&mut bus, 0).unwrap(),
            Some(I2cAction::GaugeInit)
        );
        run_to_completion(&mut sched, &mut bus);

        assert_eq!(
            sched.initiate_next_action(&mut bus, 0).unwrap(),
            Some(I2cAction::ReadIoExpander)
        );
        run_to_completion(&mut sched, &mut bus);

        assert_eq!(sched.initiate_next_action(&mut bus, 0).unwrap(), None);
        assert!(!sched.has_work());
    }

    #[test]
    fn test_io_expander_write_applies_value() {
        let (mut bus, state) = SimI2cBus::new(1);
        let mut sched = I2cScheduler::new();

        sched.queue(I2cAction::WriteIoExpander);
        sched
            .initiate_next_action(&mut bus, io_exp::RAIL_RADIO | io_exp::RELEASE_RADIO_RESET)
            .unwrap();

        run_to_completion(&mut sched, &mut bus);

        assert_eq!(
            state.borrow().io_expander_reg,
            io_exp::RAIL_RADIO | io_exp::RELEASE_RADIO_RESET
        );
    }
}
