//! # `EnteringMission` state
//!
//! The seven step power-up sequence from a docked state into free-roving
//! Mission operation. Each step is re-entered from `spin` until its
//! prerequisite completes:
//!
//! 1. Wait for any prior I2C action to finish.
//! 2. Write the I/O expander: radio and FPGA rails on, their resets
//!    released.
//! 3. Wait for the ADC to go idle.
//! 4. Reconfigure the ADC for un-docked operation and enable the motor
//!    rail.
//! 5. Initialise the fuel gauge, retrying on NACK until success or the
//!    time budget runs out, then proceed without it.
//! 6. Wait out the wireless link bring-up. Readiness is not observable so
//!    this wait is timeout-only.
//! 7. Final I/O expander write: compute module powered, its reset and the
//!    motor resets released.
//!
//! Every I2C sub-action goes through the scheduler, never two at once.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{info, warn};

use super::{disable_heater, process_lander_frames, RoverStateId};
use crate::adc::AdcConfig;
use crate::context::RoverContext;
use crate::events::Event;
use crate::hw::{Rail, ResetLine};
use crate::i2c::{io_exp, I2cAction};

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    WaitI2cIdle,
    IoExpanderRails,
    WaitAdcIdle,
    AdcAndPower,
    GaugeInit,
    WaitLinkReady,
    FinalIoExpander,
}

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

pub struct EnteringMission {
    step: Step,

    /// Deadline for fuel gauge initialisation retries.
    gauge_deadline: Instant,

    /// End of the wireless link bring-up wait.
    link_deadline: Instant,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl EnteringMission {
    pub fn new() -> Self {
        Self {
            step: Step::WaitI2cIdle,
            gauge_deadline: Instant::now(),
            link_deadline: Instant::now(),
        }
    }

    pub fn on_entry(&mut self, ctx: &mut RoverContext) {
        info!("Beginning mission power-up sequence");

        // Undocking: no more charging from the lander, native peripherals up
        ctx.hw.set_battery_charge(false);
        ctx.hw.set_rail(Rail::V3V3, true);
        ctx.hw.set_rail(Rail::V5, true);
        ctx.hw.set_reset(ResetLine::Cams, false);
        ctx.hw.set_reset(ResetLine::Wifi, false);
    }

    pub fn handle(&mut self, ctx: &mut RoverContext, event: Event) -> Option<RoverStateId> {
        match event {
            Event::LanderData => {
                let mut hold = None;
                process_lander_frames(ctx, RoverStateId::EnteringMission, &mut hold)
            }
            Event::I2cDone => {
                let result = ctx.complete_i2c();

                if self.step == Step::GaugeInit {
                    if let Some(result) = result {
                        if result.action == I2cAction::GaugeInit {
                            if result.success {
                                info!("Fuel gauge initialised");
                                self.start_link_wait(ctx);
                            } else if Instant::now() < self.gauge_deadline {
                                // NACKed, try again inside the budget
                                ctx.i2c.queue(I2cAction::GaugeInit);
                            } else {
                                warn!("Fuel gauge init abandoned after timeout");
                                self.start_link_wait(ctx);
                            }
                        }
                    }
                }
                None
            }
            Event::HighTemperature => {
                disable_heater(ctx);
                None
            }
            Event::PowerIssue => {
                // A power issue mid-sequence leaves the rover half powered,
                // nothing sensible to resume to
                Some(RoverStateId::Fault)
            }
            _ => None,
        }
    }

    pub fn spin(&mut self, ctx: &mut RoverContext) -> Option<RoverStateId> {
        match self.step {
            Step::WaitI2cIdle => {
                if !ctx.i2c.has_work() {
                    ctx.write_io_expander(
                        io_exp::RAIL_RADIO
                            | io_exp::RAIL_FPGA
                            | io_exp::RELEASE_RADIO_RESET
                            | io_exp::RELEASE_FPGA_RESET,
                    );
                    self.step = Step::IoExpanderRails;
                }
                None
            }
            Step::IoExpanderRails => {
                if !ctx.i2c.has_work_for(I2cAction::WriteIoExpander) {
                    self.step = Step::WaitAdcIdle;
                }
                None
            }
            Step::WaitAdcIdle => {
                if ctx.adc.is_sample_done() {
                    ctx.adc.setup(AdcConfig::Mission);
                    let io = ctx.io_expander_out;
                    ctx.write_io_expander(io | io_exp::RAIL_MOTORS);
                    self.step = Step::AdcAndPower;
                }
                None
            }
            Step::AdcAndPower => {
                if ctx.adc.is_sample_done() && !ctx.i2c.has_work_for(I2cAction::WriteIoExpander) {
                    ctx.i2c.queue(I2cAction::GaugeInit);
                    self.gauge_deadline = Instant::now()
                        + Duration::from_secs_f64(ctx.params.gauge_init_timeout_s);
                    self.step = Step::GaugeInit;
                }
                None
            }
            Step::GaugeInit => {
                // Completion and retry are driven from the I2cDone handler,
                // this covers the budget running out between completions
                if Instant::now() >= self.gauge_deadline
                    && !ctx.i2c.has_work_for(I2cAction::GaugeInit)
                {
                    warn!("Fuel gauge init abandoned after timeout");
                    self.start_link_wait(ctx);
                }
                None
            }
            Step::WaitLinkReady => {
                if Instant::now() >= self.link_deadline {
                    let io = ctx.io_expander_out;
                    ctx.write_io_expander(
                        io | io_exp::RAIL_CM
                            | io_exp::RELEASE_CM_RESET
                            | io_exp::RELEASE_MOTOR_RESETS,
                    );
                    self.step = Step::FinalIoExpander;
                }
                None
            }
            Step::FinalIoExpander => {
                if !ctx.i2c.has_work_for(I2cAction::WriteIoExpander) {
                    Some(RoverStateId::Mission)
                } else {
                    None
                }
            }
        }
    }

    fn start_link_wait(&mut self, ctx: &mut RoverContext) {
        self.link_deadline =
            Instant::now() + Duration::from_secs_f64(ctx.params.link_ready_wait_s);
        self.step = Step::WaitLinkReady;
    }
}
