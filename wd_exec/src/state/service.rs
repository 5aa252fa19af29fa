//! # `Service` state
//!
//! Steady diagnostic state while docked. Behaves like KeepAlive but allows
//! the RS422 transceiver to be disabled for testing, and honours the
//! double-confirmation rule for returning to KeepAlive. Compute module
//! aliveness monitoring defaults to off here.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::{info, warn};

use super::{
    disable_heater, emit_heartbeat, process_lander_frames, run_thermostat, RoverStateId,
};
use crate::context::RoverContext;
use crate::events::Event;
use comms_if::gnd::CmdId;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct Service {
    ticks: u32,

    /// Double-confirmation latch for EnterKeepAlive.
    hold: Option<CmdId>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Service {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            hold: None,
        }
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        info!("Service: docked, diagnostics enabled");
        ctx.monitor.enabled = false;
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                process_lander_frames(ctx, RoverStateId::Service, &mut self.hold)
            }
            Event::TimerTick => {
                self.ticks += 1;
                if self.ticks % ctx.params.heartbeat_tick_interval == 0 {
                    emit_heartbeat(ctx, RoverStateId::Service);
                }
                run_thermostat(ctx);
                None
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
                warn!("Power issue in Service");
                ctx.hw.set_battery_charge(true);
                None
            }
            _ => None,
        }
    }
}
