//! # Packet Types
//!
//! Control-channel opcodes and session identifiers.
//!
//! The first byte of every packet carries the opcode in its high five bits
//! and the key id in its low three bits:
//!
//! ```text
//! ┌───────────────┬─────────┐
//! │ opcode (5)    │ key (3) │
//! └───────────────┴─────────┘
//! ```

use std::fmt;

use crate::constants::SESSION_ID_SIZE;
use crate::error::ProtocolError;

const OPCODE_SHIFT: u8 = 3;
const KEY_ID_MASK: u8 = 0x07;

/// Control-channel opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Renegotiate keys on an established session
    SoftResetV1 = 3,
    /// Reliable, ciphertext-bearing control message
    ControlV1 = 4,
    /// Standalone acknowledgement
    AckV1 = 5,
    HardResetClientV2 = 7,
    HardResetServerV2 = 8,
}

impl Opcode {
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            3 => Ok(Opcode::SoftResetV1),
            4 => Ok(Opcode::ControlV1),
            5 => Ok(Opcode::AckV1),
            7 => Ok(Opcode::HardResetClientV2),
            8 => Ok(Opcode::HardResetServerV2),
            _ => Err(ProtocolError::InvalidOpcode(value)),
        }
    }

    /// Hard resets travel through the reliability layer without going
    /// through the secure session.
    pub fn is_raw(self) -> bool {
        matches!(self, Opcode::HardResetClientV2 | Opcode::HardResetServerV2)
    }

    /// Every opcode except a standalone ACK carries a message id
    pub fn has_message_id(self) -> bool {
        self != Opcode::AckV1
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::SoftResetV1 => "P_CONTROL_SOFT_RESET_V1",
            Opcode::ControlV1 => "P_CONTROL_V1",
            Opcode::AckV1 => "P_ACK_V1",
            Opcode::HardResetClientV2 => "P_CONTROL_HARD_RESET_CLIENT_V2",
            Opcode::HardResetServerV2 => "P_CONTROL_HARD_RESET_SERVER_V2",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Combine opcode and key id into the leading packet byte
#[inline]
pub fn op_compose(opcode: Opcode, key_id: u8) -> u8 {
    ((opcode as u8) << OPCODE_SHIFT) | (key_id & KEY_ID_MASK)
}

/// Split the leading packet byte into opcode and key id
#[inline]
pub fn op_decompose(byte: u8) -> Result<(Opcode, u8), ProtocolError> {
    let opcode = Opcode::from_u8(byte >> OPCODE_SHIFT)?;
    Ok((opcode, byte & KEY_ID_MASK))
}

/// 64-bit session identifier chosen at random by each peer
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    pub const fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        SessionId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }

    /// All-zero ids are never chosen by a peer
    pub fn is_defined(&self) -> bool {
        self.0 != [0u8; SESSION_ID_SIZE]
    }

    /// Read from the front of `buf`, advancing it
    pub fn read(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < SESSION_ID_SIZE {
            return Err(ProtocolError::PacketTooSmall {
                min: SESSION_ID_SIZE,
                got: buf.len(),
            });
        }
        let (head, rest) = buf.split_at(SESSION_ID_SIZE);
        let mut bytes = [0u8; SESSION_ID_SIZE];
        bytes.copy_from_slice(head);
        *buf = rest;
        Ok(SessionId(bytes))
    }

    pub fn prepend(&self, buf: &mut Vec<u8>) {
        buf.splice(0..0, self.0.iter().copied());
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self)
    }
}
