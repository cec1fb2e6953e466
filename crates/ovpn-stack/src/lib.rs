//! # ovpn-stack
//!
//! Protocol stack engine for the ovpn control channel.
//!
//! This crate provides:
//! - [`ProtoStack`], which sequences control messages through a secure
//!   session over an unreliable transport
//! - The [`StackParent`] and [`StackPacket`] traits that supply framing
//! - [`ControlChannel`], an OpenVPN-style framing with packet
//!   authentication and replay protection

pub mod control;
pub mod proto_stack;

// Re-export commonly used types
pub use control::{ControlChannel, ControlPacket, SendCounters};
pub use ovpn_core::session::{SecureSession, SslError, SslIo};
pub use proto_stack::{
    Decapsulated, NetSendType, ProtoStack, StackConfig, StackError, StackPacket, StackParent,
    StackState,
};
