//! # Ground link responses
//!
//! Every ground command is answered with the same three-byte envelope
//! regardless of which command produced it, so the ground side never needs
//! context to interpret a response. The watchdog also emits periodic
//! heartbeat telemetry frames on the same link, distinguished by their own
//! magic byte.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Magic byte at the start of every response frame.
pub const RESPONSE_MAGIC: u8 = 0xA7;

/// Magic byte at the start of every heartbeat telemetry frame.
pub const HEARTBEAT_MAGIC: u8 = 0xE1;

/// Command id carried by the unsolicited deployment notification response.
pub const DEPLOY_NOTIFY_ID: u8 = 0xEA;

/// Length of a serialised response frame.
pub const RESPONSE_LEN: usize = 3;

/// Length of a serialised heartbeat frame.
pub const HEARTBEAT_LEN: usize = 7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Response to a single ground command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WdResponse {
    /// Low byte of the command id being answered.
    pub command_id: u8,

    /// Outcome of the command.
    pub status: RespStatus,
}

/// Heartbeat telemetry emitted on the lander link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WdTelemetry {
    /// Numeric id of the current rover state.
    pub state_id: u8,

    /// Battery voltage in millivolts.
    pub battery_mv: u16,

    /// Battery thermistor reading, raw ADC counts.
    pub battery_therm: u16,

    /// True if the heater line is currently driven.
    pub heater_on: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Status codes carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RespStatus {
    /// The command was accepted and executed (or, for multi-step commands,
    /// started).
    Success = 0x00,

    /// The command could not be deserialised.
    DeserializationError = 0x01,

    /// A required parameter (usually a confirmation magic) was wrong.
    BadCommandParameter = 0x02,

    /// The command is structurally valid but not permitted in the current
    /// state.
    BadCommandSequence = 0x03,

    /// The command id is not recognised.
    UnknownMessageId = 0x04,
}

/// Errors raised while parsing a response frame, used by ground tooling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespParseError {
    #[error("The response buffer is too small, need {need} bytes but got {got}")]
    BufferTooSmall { need: usize, got: usize },

    #[error("Bad response magic: 0x{0:02X}")]
    BadMagic(u8),

    #[error("Unknown response status: 0x{0:02X}")]
    UnknownStatus(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WdResponse {
    pub fn to_bytes(&self) -> [u8; RESPONSE_LEN] {
        [RESPONSE_MAGIC, self.command_id, self.status as u8]
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, RespParseError> {
        if buf.len() < RESPONSE_LEN {
            return Err(RespParseError::BufferTooSmall {
                need: RESPONSE_LEN,
                got: buf.len(),
            });
        }
        if buf[0] != RESPONSE_MAGIC {
            return Err(RespParseError::BadMagic(buf[0]));
        }

        Ok(Self {
            command_id: buf[1],
            status: RespStatus::from_u8(buf[2]).ok_or(RespParseError::UnknownStatus(buf[2]))?,
        })
    }
}

impl RespStatus {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(RespStatus::Success),
            0x01 => Some(RespStatus::DeserializationError),
            0x02 => Some(RespStatus::BadCommandParameter),
            0x03 => Some(RespStatus::BadCommandSequence),
            0x04 => Some(RespStatus::UnknownMessageId),
            _ => None,
        }
    }
}

impl WdTelemetry {
    pub fn to_bytes(&self) -> [u8; HEARTBEAT_LEN] {
        let mut bytes = [0u8; HEARTBEAT_LEN];
        bytes[0] = HEARTBEAT_MAGIC;
        bytes[1] = self.state_id;
        LittleEndian::write_u16(&mut bytes[2..4], self.battery_mv);
        LittleEndian::write_u16(&mut bytes[4..6], self.battery_therm);
        bytes[6] = self.heater_on as u8;
        bytes
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, RespParseError> {
        if buf.len() < HEARTBEAT_LEN {
            return Err(RespParseError::BufferTooSmall {
                need: HEARTBEAT_LEN,
                got: buf.len(),
            });
        }
        if buf[0] != HEARTBEAT_MAGIC {
            return Err(RespParseError::BadMagic(buf[0]));
        }

        Ok(Self {
            state_id: buf[1],
            battery_mv: LittleEndian::read_u16(&buf[2..4]),
            battery_therm: LittleEndian::read_u16(&buf[4..6]),
            heater_on: buf[6] != 0,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_response_round_trip() {
        let resp = WdResponse {
            command_id: 0x03,
            status: RespStatus::BadCommandSequence,
        };

        let parsed = WdResponse::from_bytes(&resp.to_bytes()).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_response_bad_magic() {
        assert_eq!(
            WdResponse::from_bytes(&[0x00, 0x01, 0x00]),
            Err(RespParseError::BadMagic(0x00))
        );
    }

    #[test]
    fn test_telemetry_round_trip() {
        let tm = WdTelemetry {
            state_id: 2,
            battery_mv: 3712,
            battery_therm: 1880,
            heater_on: true,
        };

        let parsed = WdTelemetry::from_bytes(&tm.to_bytes()).unwrap();
        assert_eq!(parsed, tm);
    }
}
