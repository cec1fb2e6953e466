//! # Reliable Delivery
//!
//! Windows that turn an unreliable datagram path into an ordered,
//! acknowledged message stream for the control channel.
//!
//! - [`ReliableSend`] holds messages until the peer acknowledges them and
//!   tracks their retransmission deadlines.
//! - [`ReliableRecv`] buffers messages that arrive out of order and releases
//!   them in id order.
//! - [`ReliableAck`] collects the ids we owe the peer an ACK for.
//!
//! None of these know anything about encryption or transport.

mod ack;
mod recv;
mod send;
mod window;

/// Reliable message id, one counter per direction
pub type Id = u32;

pub use ack::ReliableAck;
pub use recv::{RecvMessage, RecvOutcome, ReliableRecv};
pub use send::{ReliableSend, SendMessage};
pub use window::MessageWindow;
