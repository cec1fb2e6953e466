//! # ovpn-protocol
//!
//! Wire-level building blocks for the VPN control and data channels.
//!
//! This crate provides:
//! - Protocol constants (window sizes, field sizes, defaults)
//! - Error types and the [`ErrorKind`] statistics taxonomy
//! - Reliable delivery windows and the outgoing ACK list
//! - Control- and data-channel packet ids with replay protection
//! - Control opcodes and session ids

mod constants;
mod error;
mod packet;
mod packet_id;
mod packet_id_data;
mod replay;
mod stats;
pub mod reliable;

pub use constants::*;
pub use error::{CryptoError, ProtocolError, ReplayError, Result, VpnError};
pub use packet::{op_compose, op_decompose, Opcode, SessionId};
pub use packet_id::{PacketId, PacketIdForm, PacketIdReceive, PacketIdSend};
pub use packet_id_data::{
    PacketIdData, PacketIdDataReceive, PacketIdDataSend, EPOCH_PACKET_ID_MASK, EPOCH_PACKET_ID_MAX,
};
pub use reliable::{Id, RecvOutcome, ReliableAck, ReliableRecv, ReliableSend};
pub use replay::{ReplayConfig, ReplayWindow};
pub use stats::{ErrorKind, SessionStats, Stat};
