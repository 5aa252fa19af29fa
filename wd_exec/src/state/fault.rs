//! # `Fault` state
//!
//! Terminal recovery state, reached from anywhere on an unrecoverable
//! condition. Everything is powered down on entry and the watchdog sits
//! waiting for ground diagnostics; only a reset of the watchdog itself
//! leaves this state.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::{error, warn};

use super::{disable_heater, power_down_for_lander, process_lander_frames, RoverStateId};
use crate::context::RoverContext;
use crate::events::Event;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct Fault;

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Fault {
    pub fn new() -> Self {
        Self
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        error!("Entering Fault, powering everything down");

        power_down_for_lander(ctx);
        ctx.hw.set_battery_charge(false);
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                // Ground can still issue the always-safe resets for
                // diagnosis, everything else is denied
                let mut hold = None;
                process_lander_frames(ctx, RoverStateId::Fault, &mut hold)
            }
            Event::I2cDone => {
                // An action issued before the fault may still finish
                ctx.complete_i2c();
                None
            }
            Event::HighTemperature => {
                disable_heater(ctx);
                None
            }
            Event::PowerIssue => {
                warn!("Power issue while in Fault");
                None
            }
            _ => None,
        }
    }
}
