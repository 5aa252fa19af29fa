//! # `Mission` state
//!
//! Steady free-roving state: every subsystem including the compute module is
//! powered. The watchdog keeps emitting heartbeats, samples the fuel gauge,
//! runs the heater thermostat and watches for compute module strokes,
//! resetting the module when they stop.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::{error, info};

use super::{
    disable_heater, emit_heartbeat, process_cm_frames, process_lander_frames, run_thermostat,
    step_cm_monitor, RoverStateId,
};
use crate::context::RoverContext;
use crate::events::Event;
use crate::i2c::I2cAction;
use comms_if::gnd::CmdId;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct Mission {
    ticks: u32,

    /// Double-confirmation latch for EnterKeepAlive.
    hold: Option<CmdId>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Mission {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            hold: None,
        }
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        info!("Mission: free-roving, compute module powered");

        // Aliveness monitoring defaults on while the module is powered
        ctx.monitor.enabled = true;
        ctx.monitor.ticks_since_stroke = 0;

        ctx.persistent.config.mission_entered = true;
        ctx.persistent.save();
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                process_lander_frames(ctx, RoverStateId::Mission, &mut self.hold)
            }
            Event::CmData => {
                process_cm_frames(ctx, RoverStateId::Mission);
                None
            }
            Event::TimerTick => {
                self.ticks += 1;
                if self.ticks % ctx.params.heartbeat_tick_interval == 0 {
                    emit_heartbeat(ctx, RoverStateId::Mission);
                    ctx.i2c.queue(I2cAction::GaugeReading);
                }
                run_thermostat(ctx);
                step_cm_monitor(ctx);
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
                // Battery under-voltage with no lander to fall back on
                error!("Power issue in Mission, entering Fault");
                Some(RoverStateId::Fault)
            }
            Event::I2cStarted => None,
        }
    }
}
