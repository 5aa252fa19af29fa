//! # Simulated I2C bus
//!
//! Stands in for the fuel gauge and I/O expander hardware on the bench and
//! in tests. Latency and NACK behaviour are scriptable through the shared
//! state handle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use super::{GaugeReadings, I2cAction, I2cBus, I2cBusError, I2cPoll, I2cResult};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated bus, scriptable through the handle returned by [`SimI2cBus::new`].
pub struct SimI2cBus {
    state: Rc<RefCell<SimI2cState>>,
}

/// Shared state of a [`SimI2cBus`].
pub struct SimI2cState {
    /// Number of polls an action stays in flight before completing.
    pub latency_polls: u8,

    /// Number of gauge init attempts that will NACK before one succeeds.
    pub gauge_init_nacks: u32,

    /// Readings returned by gauge read actions.
    pub readings: GaugeReadings,

    /// Last value written to the I/O expander output register.
    pub io_expander_reg: u8,

    /// Log of every initiated action, in dispatch order.
    pub initiated: Vec<I2cAction>,

    in_flight: Option<InFlight>,
    done: Option<I2cResult>,
}

struct InFlight {
    action: I2cAction,
    polls_left: u8,
    io_value: u8,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl SimI2cBus {
    pub fn new(latency_polls: u8) -> (Self, Rc<RefCell<SimI2cState>>) {
        let state = Rc::new(RefCell::new(SimI2cState {
            latency_polls,
            gauge_init_nacks: 0,
            readings: GaugeReadings {
                charge_mah: 2000,
                current_ma: -150,
                voltage_mv: 3700,
            },
            io_expander_reg: 0,
            initiated: Vec::new(),
            in_flight: None,
            done: None,
        }));

        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl I2cBus for SimI2cBus {
    fn initiate(&mut self, action: I2cAction, io_expander_value: u8) -> Result<(), I2cBusError> {
        let mut state = self.state.borrow_mut();

        if state.in_flight.is_some() || state.done.is_some() {
            return Err(I2cBusError::Busy);
        }

        trace!("SimI2c initiate {:?}", action);
        state.initiated.push(action);
        let polls_left = state.latency_polls;
        state.in_flight = Some(InFlight {
            action,
            polls_left,
            io_value: io_expander_value,
        });

        Ok(())
    }

    fn poll(&mut self) -> I2cPoll {
        let mut state = self.state.borrow_mut();

        if let Some(done) = state.done {
            return I2cPoll::Done(done);
        }

        let (action, io_value) = match state.in_flight {
            Some(ref mut in_flight) => {
                if in_flight.polls_left > 0 {
                    in_flight.polls_left -= 1;
                    return I2cPoll::Incomplete;
                }
                (in_flight.action, in_flight.io_value)
            }
            None => return I2cPoll::Incomplete,
        };

        // Transaction complete, work out the outcome
        let success = if action == I2cAction::GaugeInit && state.gauge_init_nacks > 0 {
            state.gauge_init_nacks -= 1;
            false
        } else {
            true
        };

        if success && action == I2cAction::WriteIoExpander {
            state.io_expander_reg = io_value;
        }

        let readings = match (success, action) {
            (true, I2cAction::GaugeReading) => Some(state.readings),
            _ => None,
        };

        let raw_value = match action {
            I2cAction::ReadIoExpander => state.io_expander_reg,
            _ => 0,
        };

        let result = I2cResult {
            action,
            success,
            readings,
            raw_value,
        };

        state.in_flight = None;
        state.done = Some(result);

        I2cPoll::Done(result)
    }

    fn clear_last_action(&mut self) {
        self.state.borrow_mut().done = None;
    }
}
