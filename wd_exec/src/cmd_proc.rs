//! # Ground command processing
//!
//! Deserialises command frames from the lander link, checks them against the
//! per-state permission matrix and the confirmation magics, executes the safe
//! ones and answers every attributable frame with exactly one response
//! (deployment additionally sends an unsolicited notification).
//!
//! Frames whose header cannot even be attributed to a command id are dropped
//! with a warning and no response.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use crate::context::RoverContext;
use crate::hw::ResetLine;
use crate::i2c::io_exp;
use crate::state::RoverStateId;
use comms_if::gnd::response::DEPLOY_NOTIFY_ID;
use comms_if::gnd::{
    CmdBody, CmdId, GndParseError, RespStatus, ResetId, WdCmdMessage, WdResponse, DEPLOY_MAGIC,
    MODE_SWITCH_MAGIC, PREP_DEPLOY_MAGIC,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The four independent gates of the reset permission matrix. Reset ids not
/// covered by any gate are always permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPerms {
    /// Power-on ids (compute module, radio, motors) are permitted.
    pub allow_power_on: bool,

    /// Disabling the RS422 transceiver towards the lander is permitted.
    pub allow_disable_rs422: bool,

    /// Firing the HDRM is permitted.
    pub allow_deploy: bool,

    /// Releasing the HDRM line is permitted.
    pub allow_undeploy: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The reset permission matrix, evaluated per state.
///
/// Mission is the only state which may power subsystems on, and the only one
/// which may fire or release the HDRM; firing additionally requires the
/// deployment sequence to have been armed. Service is the only state which
/// may drop the RS422 link, since the wired connection is redundant there.
pub fn reset_perms(state: RoverStateId, ctx: &RoverContext) -> ResetPerms {
    match state {
        RoverStateId::Mission => ResetPerms {
            allow_power_on: true,
            allow_disable_rs422: false,
            allow_deploy: ctx.persistent.config.deploy_armed,
            allow_undeploy: true,
        },
        RoverStateId::Service => ResetPerms {
            allow_power_on: false,
            allow_disable_rs422: true,
            allow_deploy: false,
            allow_undeploy: false,
        },
        _ => ResetPerms {
            allow_power_on: false,
            allow_disable_rs422: false,
            allow_deploy: false,
            allow_undeploy: false,
        },
    }
}

/// Process one frame from the lander link in the given state.
///
/// Returns the state to transition to, if the command requested one. `hold`
/// is the double-confirmation latch for EnterKeepAlive in Mission and
/// Service: the first command arms it, a repeat honours it, and any other
/// attributable command clears it.
pub fn process_lander_frame(
    ctx: &mut RoverContext,
    state: RoverStateId,
    hold: &mut Option<CmdId>,
    frame: &[u8],
) -> Option<RoverStateId> {
    let msg = match WdCmdMessage::from_bytes(frame) {
        Ok(msg) => msg,
        Err(e) => {
            return match e {
                GndParseError::UnknownMessageId(raw) => {
                    respond(ctx, raw as u8, RespStatus::UnknownMessageId);
                    *hold = None;
                    None
                }
                GndParseError::BadBodyLength { id, .. } => {
                    respond(ctx, id.low_byte(), RespStatus::DeserializationError);
                    *hold = None;
                    None
                }
                GndParseError::BadResetId(_) => {
                    respond(
                        ctx,
                        CmdId::ResetSpecific.low_byte(),
                        RespStatus::DeserializationError,
                    );
                    *hold = None;
                    None
                }
                // Header-level failures cannot be attributed to a command,
                // drop without a response
                _ => {
                    warn!("Dropping unattributable lander frame: {}", e);
                    None
                }
            };
        }
    };

    // Any attributable command other than a repeated EnterKeepAlive cancels
    // the hold
    if msg.id != CmdId::EnterKeepAlive {
        *hold = None;
    }

    let perms = reset_perms(state, ctx);

    match msg.body {
        CmdBody::ResetSpecific { reset_id } => {
            let status = exec_reset(ctx, &perms, reset_id);
            respond(ctx, msg.id.low_byte(), status);
            None
        }

        CmdBody::EnterKeepAlive { confirm } => {
            if confirm != MODE_SWITCH_MAGIC {
                *hold = None;
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandParameter);
                return None;
            }

            match state {
                RoverStateId::Mission | RoverStateId::Service => {
                    if *hold == Some(CmdId::EnterKeepAlive) {
                        *hold = None;
                        respond(ctx, msg.id.low_byte(), RespStatus::Success);
                        Some(RoverStateId::EnteringKeepAlive)
                    } else {
                        // First request arms the hold, a repeat is required
                        // before everything is depowered
                        info!("EnterKeepAlive held, repeat the command to confirm");
                        *hold = Some(CmdId::EnterKeepAlive);
                        respond(ctx, msg.id.low_byte(), RespStatus::Success);
                        None
                    }
                }
                _ => {
                    *hold = None;
                    respond(ctx, msg.id.low_byte(), RespStatus::BadCommandSequence);
                    None
                }
            }
        }

        CmdBody::EnterService { confirm } => {
            if confirm != MODE_SWITCH_MAGIC {
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandParameter);
                return None;
            }

            if state == RoverStateId::KeepAlive {
                respond(ctx, msg.id.low_byte(), RespStatus::Success);
                Some(RoverStateId::EnteringService)
            } else {
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandSequence);
                None
            }
        }

        CmdBody::PrepForDeploy { confirm } => {
            if confirm != PREP_DEPLOY_MAGIC {
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandParameter);
                return None;
            }

            match state {
                RoverStateId::KeepAlive | RoverStateId::Service => {
                    info!("Deployment armed, beginning transition to Mission");
                    ctx.persistent.config.deploy_armed = true;
                    ctx.persistent.save();
                    respond(ctx, msg.id.low_byte(), RespStatus::Success);
                    Some(RoverStateId::EnteringMission)
                }
                _ => {
                    respond(ctx, msg.id.low_byte(), RespStatus::BadCommandSequence);
                    None
                }
            }
        }

        CmdBody::Deploy { confirm } => {
            if confirm != DEPLOY_MAGIC {
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandParameter);
                return None;
            }
            if !perms.allow_deploy {
                respond(ctx, msg.id.low_byte(), RespStatus::BadCommandSequence);
                return None;
            }

            info!("Firing the HDRM");
            ctx.hw.set_deploy(true);
            ctx.persistent.config.deployed = true;
            ctx.persistent.save();

            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            // Unsolicited notification so the ground sees the one-shot event
            // even if the normal response is lost
            respond(ctx, DEPLOY_NOTIFY_ID, RespStatus::Success);
            None
        }

        CmdBody::SetHeaterKp { value } => {
            ctx.persistent.config.heater_kp = value;
            ctx.persistent.save();
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }

        CmdBody::SetAutoHeaterOnValue { value } => {
            ctx.persistent.config.auto_heater_on_value = value;
            ctx.persistent.save();
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }

        CmdBody::SetAutoHeaterOffValue { value } => {
            ctx.persistent.config.auto_heater_off_value = value;
            ctx.persistent.save();
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }

        CmdBody::SetHeaterDutyCycle { value } => {
            ctx.persistent.config.heater_duty_cycle = value;
            ctx.persistent.save();
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }

        CmdBody::SetHeaterDutyCyclePeriod { value } => {
            ctx.persistent.config.heater_duty_cycle_period = value;
            ctx.persistent.save();
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }

        CmdBody::SetCmMonitorOptions { flags } => {
            ctx.monitor.enabled = flags & 0x01 != 0;
            ctx.monitor.ticks_since_stroke = 0;
            respond(ctx, msg.id.low_byte(), RespStatus::Success);
            None
        }
    }
}

/// Execute a reset id against the permission gates.
///
/// A gated id whose gate is false performs no hardware action and returns
/// `BadCommandSequence`. Ungated ids always succeed.
pub fn exec_reset(ctx: &mut RoverContext, perms: &ResetPerms, reset_id: ResetId) -> RespStatus {
    use ResetId::*;

    // Gate check first so a denied command has no side effect at all
    let allowed = match reset_id {
        PowerOnCm | PowerOnRadio | PowerOnMotors => perms.allow_power_on,
        DisableRs422 => perms.allow_disable_rs422,
        HdrmOn => perms.allow_deploy,
        HdrmOff => perms.allow_undeploy,
        _ => true,
    };

    if !allowed {
        warn!("Reset id {:?} denied in the current state", reset_id);
        return RespStatus::BadCommandSequence;
    }

    let io = ctx.io_expander_out;

    match reset_id {
        NoOp => (),

        ResetCm => ctx.write_io_expander(io & !io_exp::RELEASE_CM_RESET),
        PowerOnCm => ctx.write_io_expander(io | io_exp::RAIL_CM | io_exp::RELEASE_CM_RESET),
        PowerOffCm => ctx.write_io_expander(io & !(io_exp::RAIL_CM | io_exp::RELEASE_CM_RESET)),

        ResetRadio => ctx.write_io_expander(io & !io_exp::RELEASE_RADIO_RESET),
        PowerOnRadio => {
            ctx.write_io_expander(io | io_exp::RAIL_RADIO | io_exp::RELEASE_RADIO_RESET)
        }
        PowerOffRadio => {
            ctx.write_io_expander(io & !(io_exp::RAIL_RADIO | io_exp::RELEASE_RADIO_RESET))
        }

        ResetCams => {
            // Native line, pulse synchronously
            ctx.hw.set_reset(ResetLine::Cams, true);
            ctx.hw.set_reset(ResetLine::Cams, false);
        }

        ResetMotors => ctx.write_io_expander(io & !io_exp::RELEASE_MOTOR_RESETS),
        PowerOnMotors => {
            ctx.write_io_expander(io | io_exp::RAIL_MOTORS | io_exp::RELEASE_MOTOR_RESETS)
        }
        PowerOffMotors => {
            ctx.write_io_expander(io & !(io_exp::RAIL_MOTORS | io_exp::RELEASE_MOTOR_RESETS))
        }

        DisableRs422 => ctx.hw.set_rs422(false),
        EnableRs422 => ctx.hw.set_rs422(true),

        HdrmOn => {
            info!("Firing the HDRM by reset id");
            ctx.hw.set_deploy(true);
            ctx.persistent.config.deployed = true;
            ctx.persistent.save();
        }
        HdrmOff => ctx.hw.set_deploy(false),

        BatteryChargeStart => ctx.hw.set_battery_charge(true),
        BatteryChargeStop => ctx.hw.set_battery_charge(false),

        HeaterEnable => ctx.heater_enabled = true,
        HeaterDisable => {
            ctx.heater_enabled = false;
            ctx.set_heater(false);
        }
    }

    RespStatus::Success
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Send a response envelope on the lander link.
fn respond(ctx: &mut RoverContext, command_id: u8, status: RespStatus) {
    let resp = WdResponse { command_id, status };
    ctx.send_lander(&resp.to_bytes());
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
