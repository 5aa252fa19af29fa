//! # `EnteringService` state
//!
//! Runs the same power-down and ADC reconfiguration as `EnteringKeepAlive`,
//! plus the edge-triggered wake interrupt used for diagnostic wake-ups while
//! docked.

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

pub struct EnteringService {
    step: EnterLanderStep,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl EnteringService {
    pub fn new() -> Self {
        Self {
            step: EnterLanderStep::WaitAdcIdle,
        }
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        power_down_for_lander(ctx);
        ctx.hw.set_wake_interrupt(true);
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                let mut hold = None;
                process_lander_frames(ctx, RoverStateId::EnteringService, &mut hold)
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
                warn!("Power issue while entering Service");
                ctx.hw.set_battery_charge(true);
                None
            }
            _ => None,
        }
    }

    pub fn spin(&mut self, ctx: &mut RoverContext) -> Option<RoverStateId> {
        if advance_lander_setup(ctx, &mut self.step) {
            Some(RoverStateId::Service)
        } else {
            None
        }
    }
}
