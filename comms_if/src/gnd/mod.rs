//! # Ground link module
//!
//! Byte-exact definitions of the command frames sent by the ground station
//! (relayed through the lander) and of the response frames the watchdog
//! answers with. Every frame starts with a common header so the ground side
//! can always attribute a response without knowing which command produced it.
//!
//! Frame layout (all multi-byte fields little-endian):
//!
//! ```text
//! | seq: u8 | data_len: u16 | checksum: u8 | type_magic: u32 | cmd_id: u16 | body... |
//! ```
//!
//! `data_len` counts the bytes following the header (command id plus body).
//! The checksum is the XOR of every header and payload byte, with the
//! checksum field itself taken as zero.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod cmd;
pub mod response;

pub use cmd::{CmdBody, CmdId, ResetId};
pub use response::{RespStatus, WdResponse, WdTelemetry};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of the common command header in bytes.
pub const CMD_HEADER_LEN: usize = 8;

/// Type magic carried by every command frame.
pub const COMMAND_TYPE_MAGIC: u32 = 0x0021_B007;

/// Confirmation magic required by mode-switch commands.
pub const MODE_SWITCH_MAGIC: u8 = 0x5A;

/// Confirmation magic required by deployment-adjacent commands.
pub const PREP_DEPLOY_MAGIC: u8 = 0x77;

/// Confirmation magic required by the HDRM fire command.
pub const DEPLOY_MAGIC: u8 = 0xEE;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Common header at the start of every command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdHeader {
    /// Ground-side sequence number, echoed for bookkeeping only.
    pub seq: u8,

    /// Number of bytes following the header.
    pub data_len: u16,

    /// XOR checksum over the whole frame (checksum byte taken as zero).
    pub checksum: u8,

    /// Frame type magic, must equal [`COMMAND_TYPE_MAGIC`].
    pub type_magic: u32,
}

/// A fully deserialised command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WdCmdMessage {
    pub header: CmdHeader,
    pub id: CmdId,
    pub body: CmdBody,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while deserialising a ground command frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GndParseError {
    #[error("The command buffer is empty")]
    EmptyBuffer,

    #[error("The command buffer is too small, need {need} bytes but got {got}")]
    BufferTooSmall { need: usize, got: usize },

    #[error("Bad frame type magic: 0x{0:08X}")]
    BadTypeMagic(u32),

    #[error("Bad frame checksum: expected 0x{expected:02X}, found 0x{found:02X}")]
    BadChecksum { expected: u8, found: u8 },

    #[error("Unknown command id: 0x{0:04X}")]
    UnknownMessageId(u16),

    #[error("Body of command {id:?} is too short, need {need} bytes but got {got}")]
    BadBodyLength { id: CmdId, need: usize, got: usize },

    #[error("Unknown reset id: 0x{0:02X}")]
    BadResetId(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdHeader {
    /// Deserialise the common header from the start of `buf`.
    ///
    /// Only structural validation is performed here, the checksum must be
    /// verified at the frame level since it covers the payload too.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, GndParseError> {
        if buf.is_empty() {
            return Err(GndParseError::EmptyBuffer);
        }
        if buf.len() < CMD_HEADER_LEN {
            return Err(GndParseError::BufferTooSmall {
                need: CMD_HEADER_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            seq: buf[0],
            data_len: LittleEndian::read_u16(&buf[1..3]),
            checksum: buf[3],
            type_magic: LittleEndian::read_u32(&buf[4..8]),
        })
    }

    /// Serialise the header, writing the checksum field as given.
    pub fn to_bytes(&self) -> [u8; CMD_HEADER_LEN] {
        let mut bytes = [0u8; CMD_HEADER_LEN];
        bytes[0] = self.seq;
        LittleEndian::write_u16(&mut bytes[1..3], self.data_len);
        bytes[3] = self.checksum;
        LittleEndian::write_u32(&mut bytes[4..8], self.type_magic);
        bytes
    }
}

impl WdCmdMessage {
    /// Build a command message around the given id and body, ready to
    /// serialise. Used by ground-side tooling and tests.
    pub fn new(seq: u8, id: CmdId, body: CmdBody) -> Self {
        let data_len = (2 + body.wire_len()) as u16;

        Self {
            header: CmdHeader {
                seq,
                data_len,
                checksum: 0,
                type_magic: COMMAND_TYPE_MAGIC,
            },
            id,
            body,
        }
    }

    /// Deserialise a full command frame.
    ///
    /// Validation order is strict and fails fast: header structure, type
    /// magic, declared length, checksum, command id, then the command body.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, GndParseError> {
        let header = CmdHeader::from_bytes(buf)?;

        if header.type_magic != COMMAND_TYPE_MAGIC {
            return Err(GndParseError::BadTypeMagic(header.type_magic));
        }

        let frame_len = CMD_HEADER_LEN + header.data_len as usize;
        if buf.len() < frame_len {
            return Err(GndParseError::BufferTooSmall {
                need: frame_len,
                got: buf.len(),
            });
        }

        let payload = &buf[CMD_HEADER_LEN..frame_len];

        let expected = frame_checksum(&buf[..CMD_HEADER_LEN], payload);
        if expected != header.checksum {
            return Err(GndParseError::BadChecksum {
                expected,
                found: header.checksum,
            });
        }

        // The command id always follows the header
        if payload.len() < 2 {
            return Err(GndParseError::BufferTooSmall {
                need: CMD_HEADER_LEN + 2,
                got: buf.len(),
            });
        }

        let raw_id = LittleEndian::read_u16(&payload[0..2]);
        let id = CmdId::from_u16(raw_id).ok_or(GndParseError::UnknownMessageId(raw_id))?;

        let body = CmdBody::from_bytes(id, &payload[2..])?;

        Ok(Self { header, id, body })
    }

    /// Serialise the frame, computing the length and checksum fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.body.wire_len());
        let mut id_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut id_bytes, self.id as u16);
        payload.extend_from_slice(&id_bytes);
        self.body.write_bytes(&mut payload);

        let mut header = self.header;
        header.data_len = payload.len() as u16;
        header.checksum = 0;

        let mut frame = header.to_bytes().to_vec();
        frame.extend_from_slice(&payload);
        frame[3] = frame_checksum(&frame[..CMD_HEADER_LEN], &payload);

        frame
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// XOR checksum over a frame, with the header checksum byte taken as zero.
pub fn frame_checksum(header_bytes: &[u8], payload: &[u8]) -> u8 {
    let mut sum = 0u8;

    for (i, b) in header_bytes.iter().enumerate() {
        if i != 3 {
            sum ^= b;
        }
    }
    for b in payload {
        sum ^= b;
    }

    sum
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        let msg = WdCmdMessage::new(7, CmdId::SetHeaterKp, CmdBody::SetHeaterKp { value: 512 });
        let bytes = msg.to_bytes();

        let parsed = WdCmdMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.header.seq, 7);
        assert_eq!(parsed.id, CmdId::SetHeaterKp);
        assert_eq!(parsed.body, CmdBody::SetHeaterKp { value: 512 });
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(
            WdCmdMessage::from_bytes(&[]),
            Err(GndParseError::EmptyBuffer)
        );

        assert_eq!(
            WdCmdMessage::from_bytes(&[1, 2, 3]),
            Err(GndParseError::BufferTooSmall { need: 8, got: 3 })
        );

        // Valid frame with the magic corrupted
        let mut bytes =
            WdCmdMessage::new(0, CmdId::ResetSpecific, CmdBody::ResetSpecific { reset_id: ResetId::NoOp })
                .to_bytes();
        bytes[7] = 0xFF;
        assert!(matches!(
            WdCmdMessage::from_bytes(&bytes),
            Err(GndParseError::BadTypeMagic(_))
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut bytes = WdCmdMessage::new(
            0,
            CmdId::EnterKeepAlive,
            CmdBody::EnterKeepAlive {
                confirm: MODE_SWITCH_MAGIC,
            },
        )
        .to_bytes();

        // Corrupt the body
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        assert!(matches!(
            WdCmdMessage::from_bytes(&bytes),
            Err(GndParseError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_unknown_id_rejected() {
        let msg = WdCmdMessage::new(0, CmdId::ResetSpecific, CmdBody::ResetSpecific { reset_id: ResetId::NoOp });
        let mut bytes = msg.to_bytes();

        // Overwrite the command id with one that doesn't exist and fix up the
        // checksum
        bytes[8] = 0xFE;
        bytes[9] = 0xFF;
        let (head, payload) = bytes.split_at(CMD_HEADER_LEN);
        let sum = frame_checksum(head, payload);
        bytes[3] = sum;

        assert_eq!(
            WdCmdMessage::from_bytes(&bytes),
            Err(GndParseError::UnknownMessageId(0xFFFE))
        );
    }

    #[test]
    fn test_truncated_body_rejected() {
        let bytes = WdCmdMessage::new(
            0,
            CmdId::SetAutoHeaterOnValue,
            CmdBody::SetAutoHeaterOnValue { value: 1000 },
        )
        .to_bytes();

        // Rebuild the frame with the body truncated to one byte and a
        // consistent length and checksum, so only the body check can fire
        let mut truncated = bytes[..CMD_HEADER_LEN + 3].to_vec();
        truncated[1] = 3;
        truncated[2] = 0;
        truncated[3] = 0;
        let (head, payload) = truncated.split_at(CMD_HEADER_LEN);
        let sum = frame_checksum(head, payload);
        truncated[3] = sum;

        assert_eq!(
            WdCmdMessage::from_bytes(&truncated),
            Err(GndParseError::BadBodyLength {
                id: CmdId::SetAutoHeaterOnValue,
                need: 2,
                got: 1
            })
        );
    }
}
