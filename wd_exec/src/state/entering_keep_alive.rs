//! # `EnteringKeepAlive` state
//!
//! Transition state into KeepAlive: powers every subsystem down on entry,
//! then waits for any in-flight ADC conversion to finish before
//! reconfiguring the ADC for lander-attached readings and enabling the
//! heater and battery charging.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::warn;

use super::{
    advance_lander_setup, disable_heater, power_down_for_lander, process_lander_frames,
    EnterLanderStep, RoverStateId,
};
use crate::context::RoverContext;
use crate::events::Event;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct EnteringKeepAlive {
    step: EnterLanderStep,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl EnteringKeepAlive {
    pub fn new() -> Self {
        Self {
            step: EnterLanderStep::WaitAdcIdle,
        }
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        power_down_for_lander(ctx);
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                // Mode switches are denied mid-transition, safe resets still
                // work
                let mut hold = None;
                process_lander_frames(ctx, RoverStateId::EnteringKeepAlive, &mut hold)
            }
            Event::I2cDone => {
                ctx.complete_i2c();
                None
            }
            Event::HighTemperature => {
                disable_heater(ctx);
                None
            }
            Event::PowerIssue => {
                // Externally powered, charge the battery while we can
                warn!("Power issue while entering KeepAlive");
                ctx.hw.set_battery_charge(true);
                None
            }
            _ => None,
        }
    }

    pub fn spin(&mut self, ctx: &mut RoverContext) -> Option<RoverStateId> {
        if advance_lander_setup(ctx, &mut self.step) {
            Some(RoverStateId::KeepAlive)
        } else {
            None
        }
    }
}
