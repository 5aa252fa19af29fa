//! # `KeepAlive` state
//!
//! Steady state while docked to the lander: everything except the watchdog
//! itself is unpowered, the battery charges from the lander supply, and a
//! heartbeat goes out every few timer ticks so the ground knows the rover is
//! alive.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::{info, warn};

use super::{
    disable_heater, emit_heartbeat, process_lander_frames, run_thermostat, RoverStateId,
};
use crate::context::RoverContext;
use crate::events::Event;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct KeepAlive {
    ticks: u32,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl KeepAlive {
    pub fn new() -> Self {
        Self { ticks: 0 }
    }

    pub fn on_entry(&mut self, _ctx: &mut RoverContext) {
        info!("KeepAlive: docked and idle");
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                let mut hold = None;
                process_lander_frames(ctx, RoverStateId::KeepAlive, &mut hold)
            }
            Event::TimerTick => {
                self.ticks += 1;
                if self.ticks % ctx.params.heartbeat_tick_interval == 0 {
                    emit_heartbeat(ctx, RoverStateId::KeepAlive);
                }
                run_thermostat(ctx);
                None
            }
            Event::I2cDone => {
                ctx.complete_i2c();
                None
            }
            Event::HighTemperature => {
                // No reason to heat while externally powered
                disable_heater(ctx);
                None
            }
            Event::PowerIssue => {
                warn!("Power issue in KeepAlive");
                ctx.hw.set_battery_charge(true);
                None
            }
            _ => None,
        }
    }
}
