//! # Ground command definitions
//!
//! Command ids, per-command bodies and the reset id set. Bodies are held in a
//! tagged enum keyed by the command id so a body can never be read as the
//! wrong variant.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};

use super::GndParseError;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Ids of all commands the watchdog understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CmdId {
    /// Perform the reset or power action encoded in the body.
    ResetSpecific = 0x0001,

    /// Arm the deployment sequence and begin the transition to Mission.
    PrepForDeploy = 0x0002,

    /// Fire the HDRM. Only honoured when the current state allows it.
    Deploy = 0x0003,

    /// Switch to KeepAlive mode.
    EnterKeepAlive = 0x0004,

    /// Switch to Service mode.
    EnterService = 0x0005,

    /// Set the heater proportional gain.
    SetHeaterKp = 0x0010,

    /// Set the thermistor value below which the heater switches on.
    SetAutoHeaterOnValue = 0x0011,

    /// Set the thermistor value above which the heater switches off.
    SetAutoHeaterOffValue = 0x0012,

    /// Set the heater PWM duty cycle.
    SetHeaterDutyCycle = 0x0013,

    /// Set the heater PWM period.
    SetHeaterDutyCyclePeriod = 0x0014,

    /// Set the compute module aliveness monitoring options.
    SetCmMonitorOptions = 0x0020,
}

/// Body of a command, keyed by [`CmdId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdBody {
    ResetSpecific { reset_id: ResetId },
    PrepForDeploy { confirm: u8 },
    Deploy { confirm: u8 },
    EnterKeepAlive { confirm: u8 },
    EnterService { confirm: u8 },
    SetHeaterKp { value: u16 },
    SetAutoHeaterOnValue { value: u16 },
    SetAutoHeaterOffValue { value: u16 },
    SetHeaterDutyCycle { value: u16 },
    SetHeaterDutyCyclePeriod { value: u16 },
    SetCmMonitorOptions { flags: u8 },
}

/// Reset and power actions addressable through the ResetSpecific command.
///
/// Ids which only assert a reset or remove power are always safe and always
/// permitted. Power-on, RS422-disable and deploy/undeploy ids are gated by
/// the per-state permission table in the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResetId {
    NoOp = 0x00,
    ResetCm = 0x01,
    PowerOnCm = 0x02,
    PowerOffCm = 0x03,
    ResetRadio = 0x04,
    PowerOnRadio = 0x05,
    PowerOffRadio = 0x06,
    ResetCams = 0x07,
    ResetMotors = 0x08,
    PowerOnMotors = 0x09,
    PowerOffMotors = 0x0A,
    DisableRs422 = 0x0B,
    EnableRs422 = 0x0C,
    HdrmOn = 0x0D,
    HdrmOff = 0x0E,
    BatteryChargeStart = 0x0F,
    BatteryChargeStop = 0x10,
    HeaterEnable = 0x11,
    HeaterDisable = 0x12,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdId {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0x0001 => Some(CmdId::ResetSpecific),
            0x0002 => Some(CmdId::PrepForDeploy),
            0x0003 => Some(CmdId::Deploy),
            0x0004 => Some(CmdId::EnterKeepAlive),
            0x0005 => Some(CmdId::EnterService),
            0x0010 => Some(CmdId::SetHeaterKp),
            0x0011 => Some(CmdId::SetAutoHeaterOnValue),
            0x0012 => Some(CmdId::SetAutoHeaterOffValue),
            0x0013 => Some(CmdId::SetHeaterDutyCycle),
            0x0014 => Some(CmdId::SetHeaterDutyCyclePeriod),
            0x0020 => Some(CmdId::SetCmMonitorOptions),
            _ => None,
        }
    }

    /// Low byte of the id, used in the response envelope.
    pub fn low_byte(&self) -> u8 {
        (*self as u16) as u8
    }
}

impl CmdBody {
    /// Deserialise the body for the given command id.
    ///
    /// Each body validates its own minimum length before touching any bytes,
    /// so a truncated frame can never leak a partial read into state.
    pub fn from_bytes(id: CmdId, buf: &[u8]) -> Result<Self, GndParseError> {
        let need = Self::wire_len_for(id);
        if buf.len() < need {
            return Err(GndParseError::BadBodyLength {
                id,
                need,
                got: buf.len(),
            });
        }

        let body = match id {
            CmdId::ResetSpecific => CmdBody::ResetSpecific {
                reset_id: ResetId::from_u8(buf[0]).ok_or(GndParseError::BadResetId(buf[0]))?,
            },
            CmdId::PrepForDeploy => CmdBody::PrepForDeploy { confirm: buf[0] },
            CmdId::Deploy => CmdBody::Deploy { confirm: buf[0] },
            CmdId::EnterKeepAlive => CmdBody::EnterKeepAlive { confirm: buf[0] },
            CmdId::EnterService => CmdBody::EnterService { confirm: buf[0] },
            CmdId::SetHeaterKp => CmdBody::SetHeaterKp {
                value: LittleEndian::read_u16(&buf[0..2]),
            },
            CmdId::SetAutoHeaterOnValue => CmdBody::SetAutoHeaterOnValue {
                value: LittleEndian::read_u16(&buf[0..2]),
            },
            CmdId::SetAutoHeaterOffValue => CmdBody::SetAutoHeaterOffValue {
                value: LittleEndian::read_u16(&buf[0..2]),
            },
            CmdId::SetHeaterDutyCycle => CmdBody::SetHeaterDutyCycle {
                value: LittleEndian::read_u16(&buf[0..2]),
            },
            CmdId::SetHeaterDutyCyclePeriod => CmdBody::SetHeaterDutyCyclePeriod {
                value: LittleEndian::read_u16(&buf[0..2]),
            },
            CmdId::SetCmMonitorOptions => CmdBody::SetCmMonitorOptions { flags: buf[0] },
        };

        Ok(body)
    }

    /// The id this body belongs to.
    pub fn id(&self) -> CmdId {
        match self {
            CmdBody::ResetSpecific { .. } => CmdId::ResetSpecific,
            CmdBody::PrepForDeploy { .. } => CmdId::PrepForDeploy,
            CmdBody::Deploy { .. } => CmdId::Deploy,
            CmdBody::EnterKeepAlive { .. } => CmdId::EnterKeepAlive,
            CmdBody::EnterService { .. } => CmdId::EnterService,
            CmdBody::SetHeaterKp { .. } => CmdId::SetHeaterKp,
            CmdBody::SetAutoHeaterOnValue { .. } => CmdId::SetAutoHeaterOnValue,
            CmdBody::SetAutoHeaterOffValue { .. } => CmdId::SetAutoHeaterOffValue,
            CmdBody::SetHeaterDutyCycle { .. } => CmdId::SetHeaterDutyCycle,
            CmdBody::SetHeaterDutyCyclePeriod { .. } => CmdId::SetHeaterDutyCyclePeriod,
            CmdBody::SetCmMonitorOptions { .. } => CmdId::SetCmMonitorOptions,
        }
    }

    /// Serialised length of the body for the given id.
    pub fn wire_len_for(id: CmdId) -> usize {
        match id {
            CmdId::ResetSpecific
            | CmdId::PrepForDeploy
            | CmdId::Deploy
            | CmdId::EnterKeepAlive
            | CmdId::EnterService
            | CmdId::SetCmMonitorOptions => 1,
            CmdId::SetHeaterKp
            | CmdId::SetAutoHeaterOnValue
            | CmdId::SetAutoHeaterOffValue
            | CmdId::SetHeaterDutyCycle
            | CmdId::SetHeaterDutyCyclePeriod => 2,
        }
    }

    /// Serialised length of this body.
    pub fn wire_len(&self) -> usize {
        Self::wire_len_for(self.id())
    }

    /// Append the serialised body to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            CmdBody::ResetSpecific { reset_id } => out.push(*reset_id as u8),
            CmdBody::PrepForDeploy { confirm }
            | CmdBody::Deploy { confirm }
            | CmdBody::EnterKeepAlive { confirm }
            | CmdBody::EnterService { confirm } => out.push(*confirm),
            CmdBody::SetCmMonitorOptions { flags } => out.push(*flags),
            CmdBody::SetHeaterKp { value }
            | CmdBody::SetAutoHeaterOnValue { value }
            | CmdBody::SetAutoHeaterOffValue { value }
            | CmdBody::SetHeaterDutyCycle { value }
            | CmdBody::SetHeaterDutyCyclePeriod { value } => {
                let mut bytes = [0u8; 2];
                LittleEndian::write_u16(&mut bytes, *value);
                out.extend_from_slice(&bytes);
            }
        }
    }
}

impl ResetId {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(ResetId::NoOp),
            0x01 => Some(ResetId::ResetCm),
            0x02 => Some(ResetId::PowerOnCm),
            0x03 => Some(ResetId::PowerOffCm),
            0x04 => Some(ResetId::ResetRadio),
            0x05 => Some(ResetId::PowerOnRadio),
            0x06 => Some(ResetId::PowerOffRadio),
            0x07 => Some(ResetId::ResetCams),
            0x08 => Some(ResetId::ResetMotors),
            0x09 => Some(ResetId::PowerOnMotors),
            0x0A => Some(ResetId::PowerOffMotors),
            0x0B => Some(ResetId::DisableRs422),
            0x0C => Some(ResetId::EnableRs422),
            0x0D => Some(ResetId::HdrmOn),
            0x0E => Some(ResetId::HdrmOff),
            0x0F => Some(ResetId::BatteryChargeStart),
            0x10 => Some(ResetId::BatteryChargeStop),
            0x11 => Some(ResetId::HeaterEnable),
            0x12 => Some(ResetId::HeaterDisable),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_body_min_length_checked_per_id() {
        assert_eq!(
            CmdBody::from_bytes(CmdId::SetHeaterKp, &[0x01]),
            Err(GndParseError::BadBodyLength {
                id: CmdId::SetHeaterKp,
                need: 2,
                got: 1
            })
        );

        assert_eq!(
            CmdBody::from_bytes(CmdId::Deploy, &[]),
            Err(GndParseError::BadBodyLength {
                id: CmdId::Deploy,
                need: 1,
                got: 0
            })
        );
    }

    #[test]
    fn test_unknown_reset_id_rejected() {
        assert_eq!(
            CmdBody::from_bytes(CmdId::ResetSpecific, &[0x7F]),
            Err(GndParseError::BadResetId(0x7F))
        );
    }

    #[test]
    fn test_u16_bodies_little_endian() {
        let body = CmdBody::from_bytes(CmdId::SetAutoHeaterOnValue, &[0x34, 0x12]).unwrap();
        assert_eq!(body, CmdBody::SetAutoHeaterOnValue { value: 0x1234 });
    }
}
