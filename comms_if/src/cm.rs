//! # Compute module link
//!
//! Message definitions for the serial link between the watchdog and the
//! rover's main compute module. The framing is distinct from the ground link:
//! four fixed magic bytes, then payload length, reset value, sequence number
//! and op-code, closed with a parity byte chosen so the XOR of the whole
//! header is zero.
//!
//! ```text
//! | magic: [u8; 4] | payload_len: u16 | reset_val: u8 | seq: u8 | opcode: u8 | parity: u8 | payload... |
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Fixed magic bytes at the start of every compute module frame.
pub const CM_MAGIC: [u8; 4] = [0xD0, 0x5E, 0xC0, 0x4E];

/// Length of the compute module header in bytes.
pub const CM_HEADER_LEN: usize = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Header of a compute module frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmHeader {
    /// Number of payload bytes following the header.
    pub payload_len: u16,

    /// Reset id for [`CmOpcode::Reset`] frames, zero otherwise.
    pub reset_val: u8,

    /// Low sequence number.
    pub seq: u8,

    /// Low op-code.
    pub opcode: CmOpcode,
}

/// A full compute module frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmMessage {
    pub header: CmHeader,
    pub payload: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Op-codes of the compute module link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmOpcode {
    /// Liveness ping from the compute module, expects a telemetry reply.
    Stroke = 0x01,

    /// Payload to be forwarded to the ground, expects an ack.
    Downlink = 0x02,

    /// Request for the watchdog to perform the encoded reset, expects an ack.
    Reset = 0x04,
}

/// Errors raised while parsing a compute module frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CmParseError {
    #[error("The frame buffer is too small, need {need} bytes but got {got}")]
    BufferTooSmall { need: usize, got: usize },

    #[error("Bad frame magic bytes: {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("Bad header parity: expected 0x{expected:02X}, found 0x{found:02X}")]
    BadParity { expected: u8, found: u8 },

    #[error("Unknown op-code: 0x{0:02X}")]
    UnknownOpcode(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmOpcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(CmOpcode::Stroke),
            0x02 => Some(CmOpcode::Downlink),
            0x04 => Some(CmOpcode::Reset),
            _ => None,
        }
    }
}

impl CmMessage {
    /// Build a frame with the given op-code, reset value and payload.
    pub fn new(opcode: CmOpcode, reset_val: u8, seq: u8, payload: Vec<u8>) -> Self {
        Self {
            header: CmHeader {
                payload_len: payload.len() as u16,
                reset_val,
                seq,
                opcode,
            },
            payload,
        }
    }

    /// Deserialise a frame, validating magic, parity, op-code and payload
    /// length in that order.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CmParseError> {
        if buf.len() < CM_HEADER_LEN {
            return Err(CmParseError::BufferTooSmall {
                need: CM_HEADER_LEN,
                got: buf.len(),
            });
        }

        if buf[0..4] != CM_MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&buf[0..4]);
            return Err(CmParseError::BadMagic(magic));
        }

        let expected = header_parity(&buf[..CM_HEADER_LEN - 1]);
        if expected != buf[9] {
            return Err(CmParseError::BadParity {
                expected,
                found: buf[9],
            });
        }

        let opcode = CmOpcode::from_u8(buf[8]).ok_or(CmParseError::UnknownOpcode(buf[8]))?;

        let payload_len = LittleEndian::read_u16(&buf[4..6]) as usize;
        let frame_len = CM_HEADER_LEN + payload_len;
        if buf.len() < frame_len {
            return Err(CmParseError::BufferTooSmall {
                need: frame_len,
                got: buf.len(),
            });
        }

        Ok(Self {
            header: CmHeader {
                payload_len: payload_len as u16,
                reset_val: buf[6],
                seq: buf[7],
                opcode,
            },
            payload: buf[CM_HEADER_LEN..frame_len].to_vec(),
        })
    }

    /// Serialise the frame, computing the parity byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(CM_HEADER_LEN + self.payload.len());

        frame.extend_from_slice(&CM_MAGIC);

        let mut len_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut len_bytes, self.payload.len() as u16);
        frame.extend_from_slice(&len_bytes);

        frame.push(self.header.reset_val);
        frame.push(self.header.seq);
        frame.push(self.header.opcode as u8);
        frame.push(header_parity(&frame));

        frame.extend_from_slice(&self.payload);

        frame
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parity byte over the magic bytes and header fields, chosen so the XOR of
/// the complete header (parity included) is zero.
pub fn header_parity(header_without_parity: &[u8]) -> u8 {
    header_without_parity.iter().fold(0u8, |acc, b| acc ^ b)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        let msg = CmMessage::new(CmOpcode::Downlink, 0, 42, vec![0xAA, 0xBB, 0xCC]);
        let bytes = msg.to_bytes();

        // Whole-header XOR must cancel to zero
        let xor = bytes[..CM_HEADER_LEN].iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(xor, 0);

        let parsed = CmMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_bad_parity_rejected() {
        let mut bytes = CmMessage::new(CmOpcode::Stroke, 0, 1, vec![]).to_bytes();
        bytes[6] ^= 0xFF;

        assert!(matches!(
            CmMessage::from_bytes(&bytes),
            Err(CmParseError::BadParity { .. })
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = CmMessage::new(CmOpcode::Stroke, 0, 1, vec![]).to_bytes();
        bytes[0] = 0x00;

        assert!(matches!(
            CmMessage::from_bytes(&bytes),
            Err(CmParseError::BadMagic(_))
        ));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut bytes = CmMessage::new(CmOpcode::Reset, 3, 1, vec![]).to_bytes();
        bytes[8] = 0x09;
        // Fix up the parity so only the op-code check can fire
        bytes[9] = header_parity(&bytes[..CM_HEADER_LEN - 1]);

        assert_eq!(
            CmMessage::from_bytes(&bytes),
            Err(CmParseError::UnknownOpcode(0x09))
        );
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = CmMessage::new(CmOpcode::Downlink, 0, 9, vec![1, 2, 3, 4]).to_bytes();

        assert_eq!(
            CmMessage::from_bytes(&bytes[..CM_HEADER_LEN + 2]),
            Err(CmParseError::BufferTooSmall { need: 14, got: 12 })
        );
    }
}
