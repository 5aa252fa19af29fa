//! # Compute module frame processing
//!
//! Handles the three frame types the compute module can send: strokes
//! (liveness pings answered with telemetry), downlinks (payload forwarded to
//! the ground, then acked) and reset requests (mapped through the same
//! permission gates as ground resets, then acked). Malformed frames are
//! dropped with a warning.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use crate::cmd_proc::{exec_reset, reset_perms};
use crate::context::RoverContext;
use crate::state::RoverStateId;
use comms_if::cm::{CmMessage, CmOpcode};
use comms_if::gnd::{RespStatus, ResetId};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Process one frame from the compute module link in the given state.
pub fn process_cm_frame(ctx: &mut RoverContext, state: RoverStateId, frame: &[u8]) {
    let msg = match CmMessage::from_bytes(frame) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Dropping malformed compute module frame: {}", e);
            return;
        }
    };

    match msg.header.opcode {
        CmOpcode::Stroke => {
            ctx.monitor.ticks_since_stroke = 0;

            let telem = ctx.telemetry(state as u8);
            let reply = CmMessage::new(CmOpcode::Stroke, 0, 0, telem.to_bytes().to_vec());
            ctx.send_cm(reply);
        }

        CmOpcode::Downlink => {
            ctx.send_lander(&msg.payload);

            let ack = CmMessage::new(CmOpcode::Downlink, 0, 0, vec![]);
            ctx.send_cm(ack);
        }

        CmOpcode::Reset => {
            match ResetId::from_u8(msg.header.reset_val) {
                Some(reset_id) => {
                    let perms = reset_perms(state, ctx);
                    let status = exec_reset(ctx, &perms, reset_id);
                    if status != RespStatus::Success {
                        warn!(
                            "Compute module reset request {:?} denied: {:?}",
                            reset_id, status
                        );
                    } else {
                        info!("Compute module requested reset {:?}", reset_id);
                    }
                }
                None => warn!(
                    "Compute module requested unknown reset id 0x{:02X}",
                    msg.header.reset_val
                ),
            }

            // The ack confirms receipt, not permission
            let ack = CmMessage::new(CmOpcode::Reset, msg.header.reset_val, 0, vec![]);
            ctx.send_cm(ack);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::fixtures::test_rig;
    use comms_if::gnd::WdTelemetry;

    #[test]
    fn test_stroke_resets_monitor_and_replies_telemetry() {
        let mut rig = test_rig();
        rig.ctx.monitor.ticks_since_stroke = 55;
        rig.ctx.adc_readings.battery_mv = 3650;

        let frame = CmMessage::new(CmOpcode::Stroke, 0, 7, vec![]).to_bytes();
        process_cm_frame(&mut rig.ctx, RoverStateId::Mission, &frame);

        assert_eq!(rig.ctx.monitor.ticks_since_stroke, 0);

        let tx = rig.cm.take_tx();
        assert_eq!(tx.len(), 1);
        let reply = CmMessage::from_bytes(&tx[0]).unwrap();
        assert_eq!(reply.header.opcode, CmOpcode::Stroke);

        let telem = WdTelemetry::from_bytes(&reply.payload).unwrap();
        assert_eq!(telem.state_id, RoverStateId::Mission as u8);
        assert_eq!(telem.battery_mv, 3650);
    }

    #[test]
    fn test_downlink_forwarded_then_acked() {
        let mut rig = test_rig();

        let payload = vec![0x10, 0x20, 0x30];
        let frame = CmMessage::new(CmOpcode::Downlink, 0, 3, payload.clone()).to_bytes();
        process_cm_frame(&mut rig.ctx, RoverStateId::Mission, &frame);

        let gnd = rig.lander.take_tx();
        assert_eq!(gnd, vec![payload]);

        let tx = rig.cm.take_tx();
        assert_eq!(tx.len(), 1);
        let ack = CmMessage::from_bytes(&tx[0]).unwrap();
        assert_eq!(ack.header.opcode, CmOpcode::Downlink);
        assert!(ack.payload.is_empty());
    }

    #[test]
    fn test_reset_request_goes_through_gates() {
        let mut rig = test_rig();

        // Power-on is permitted in Mission, the write is queued and the
        // request is acked
        let frame =
            CmMessage::new(CmOpcode::Reset, ResetId::PowerOnRadio as u8, 0, vec![]).to_bytes();
        process_cm_frame(&mut rig.ctx, RoverStateId::Mission, &frame);

        assert!(rig
            .ctx
            .i2c
            .is_pending(crate::i2c::I2cAction::WriteIoExpander));
        assert_eq!(rig.cm.take_tx().len(), 1);
    }

    #[test]
    fn test_malformed_frame_dropped() {
        let mut rig = test_rig();

        process_cm_frame(&mut rig.ctx, RoverStateId::Mission, &[0xFF, 0x00]);

        assert!(rig.cm.take_tx().is_empty());
        assert!(rig.lander.take_tx().is_empty());
    }
}
