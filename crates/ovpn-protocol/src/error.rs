//! # Error Module
//!
//! Unified error handling for the control and data channels.

use std::fmt;
use std::io;

use crate::stats::ErrorKind;

#[derive(Debug)]
pub enum VpnError {
    Io(io::Error),
    Crypto(CryptoError),
    Protocol(ProtocolError),
    Replay(ReplayError),
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    InvalidKeyLength { expected: usize, got: usize },
    InvalidNonceLength { expected: usize, got: usize },
    EncryptionFailed,
    AuthenticationFailed,
    KeyDerivationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidOpcode(u8),
    PacketTooSmall { min: usize, got: usize },
    PacketTooLarge { max: usize, got: usize },
    CorruptedPacket(String),
    UnexpectedPacket(String),
    SessionMismatch,
    AuthFailed,
    Replay(ReplayError),
    PacketIdWrap,
}

/// Why a packet id was refused by a replay window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// Packet id zero
    Invalid,
    /// Time stamp older than the highest seen
    TimeBacktrack,
    /// Backtrack outside the tracked window
    Backtrack,
    /// Backtrack at or below the expired floor
    Expire,
    /// Already accepted
    Replay,
}

impl ReplayError {
    /// Statistics bucket for this rejection
    pub fn kind(self) -> ErrorKind {
        match self {
            ReplayError::Invalid => ErrorKind::PktidInvalid,
            ReplayError::TimeBacktrack => ErrorKind::PktidTimeBacktrack,
            ReplayError::Backtrack => ErrorKind::PktidBacktrack,
            ReplayError::Expire => ErrorKind::PktidExpire,
            ReplayError::Replay => ErrorKind::PktidReplay,
        }
    }
}

impl ProtocolError {
    /// Statistics bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::AuthFailed => ErrorKind::HmacError,
            ProtocolError::Replay(e) => e.kind(),
            ProtocolError::PacketIdWrap => ErrorKind::PktidWrap,
            ProtocolError::SessionMismatch => ErrorKind::SessionMismatch,
            _ => ErrorKind::BufferError,
        }
    }
}

impl std::error::Error for VpnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VpnError::Io(e) => Some(e),
            VpnError::Crypto(e) => Some(e),
            VpnError::Protocol(e) => Some(e),
            VpnError::Replay(e) => Some(e),
            VpnError::Config(_) => None,
        }
    }
}

impl std::error::Error for CryptoError {}
impl std::error::Error for ProtocolError {}
impl std::error::Error for ReplayError {}

impl fmt::Display for VpnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VpnError::Io(e) => write!(f, "I/O error: {}", e),
            VpnError::Crypto(e) => write!(f, "Crypto error: {}", e),
            VpnError::Protocol(e) => write!(f, "Protocol error: {}", e),
            VpnError::Replay(e) => write!(f, "Replay error: {}", e),
            VpnError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKeyLength { expected, got } => {
                write!(f, "invalid key length: expected {}, got {}", expected, got)
            }
            CryptoError::InvalidNonceLength { expected, got } => {
                write!(f, "invalid nonce length: expected {}, got {}", expected, got)
            }
            CryptoError::EncryptionFailed => write!(f, "encryption failed"),
            CryptoError::AuthenticationFailed => write!(f, "authentication failed"),
            CryptoError::KeyDerivationFailed(msg) => write!(f, "key derivation failed: {}", msg),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidOpcode(op) => write!(f, "invalid opcode {}", op),
            ProtocolError::PacketTooSmall { min, got } => {
                write!(f, "packet too small: need {} bytes, got {}", min, got)
            }
            ProtocolError::PacketTooLarge { max, got } => {
                write!(f, "packet too large: max {} bytes, got {}", max, got)
            }
            ProtocolError::CorruptedPacket(msg) => write!(f, "corrupted packet: {}", msg),
            ProtocolError::UnexpectedPacket(msg) => write!(f, "unexpected packet: {}", msg),
            ProtocolError::SessionMismatch => write!(f, "session id mismatch"),
            ProtocolError::AuthFailed => write!(f, "packet authentication failed"),
            ProtocolError::Replay(e) => write!(f, "{}", e),
            ProtocolError::PacketIdWrap => write!(f, "packet id wrapped, renegotiation required"),
        }
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ReplayError::Invalid => "packet id is zero",
            ReplayError::TimeBacktrack => "packet id time moved backwards",
            ReplayError::Backtrack => "packet id backtrack outside window",
            ReplayError::Expire => "packet id backtrack expired",
            ReplayError::Replay => "packet id replayed",
        };
        f.write_str(msg)
    }
}

impl From<io::Error> for VpnError {
    fn from(e: io::Error) -> Self {
        VpnError::Io(e)
    }
}

impl From<CryptoError> for VpnError {
    fn from(e: CryptoError) -> Self {
        VpnError::Crypto(e)
    }
}

impl From<ProtocolError> for VpnError {
    fn from(e: ProtocolError) -> Self {
        VpnError::Protocol(e)
    }
}

impl From<ReplayError> for VpnError {
    fn from(e: ReplayError) -> Self {
        VpnError::Replay(e)
    }
}

impl From<ReplayError> for ProtocolError {
    fn from(e: ReplayError) -> Self {
        ProtocolError::Replay(e)
    }
}

pub type Result<T> = std::result::Result<T, VpnError>;
