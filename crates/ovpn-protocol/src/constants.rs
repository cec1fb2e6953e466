//! # Constants
//!
//! Shared constants for the control channel and the data-channel replay
//! protection.

// ═══════════════════════════════════════════════════════════════════════════
// RELIABILITY LAYER
// ═══════════════════════════════════════════════════════════════════════════

/// Default reliability window (maximum unacknowledged control messages)
pub const DEFAULT_SPAN: u32 = 8;

/// Default control-packet retransmit timeout in milliseconds
pub const DEFAULT_RETRANSMIT_TIMEOUT_MS: u64 = 2000;

/// Default bound on pending ACK obligations
pub const DEFAULT_MAX_ACK_LIST: usize = 16;

/// Maximum ACKs piggy-backed on a control packet carrying a message
pub const MAX_ACKS_CONTROL: usize = 4;

/// Maximum ACKs carried by a standalone ACK packet
pub const MAX_ACKS_ACK_ONLY: usize = 8;

/// Number of recently sent ACKs remembered for re-sending
pub const RE_ACK_MEMORY: usize = MAX_ACKS_ACK_ONLY;

/// Size of a reliable message id on the wire
pub const MESSAGE_ID_SIZE: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════
// CONTROL PACKET FRAMING
// ═══════════════════════════════════════════════════════════════════════════

/// Session id size in bytes
pub const SESSION_ID_SIZE: usize = 8;

/// Truncated control-packet authentication tag size
pub const PACKET_AUTH_TAG_SIZE: usize = 16;

/// Opcode/key-id byte size
pub const OPCODE_SIZE: usize = 1;

/// Maximum control packet size accepted from the wire
pub const MAX_PACKET_SIZE: usize = 1500;

/// Worst-case framing around one control message: header, long-form
/// packet id, a full ACK array with the echoed session id, and the message id
pub const CONTROL_OVERHEAD: usize = OPCODE_SIZE
    + SESSION_ID_SIZE
    + PACKET_AUTH_TAG_SIZE
    + LONG_PACKET_ID_SIZE
    + 1
    + MAX_ACKS_CONTROL * MESSAGE_ID_SIZE
    + SESSION_ID_SIZE
    + MESSAGE_ID_SIZE;

/// Buffer size used when reading cleartext out of the secure session
pub const CLEARTEXT_READ_SIZE: usize = 2048;

// ═══════════════════════════════════════════════════════════════════════════
// PACKET ID / REPLAY PROTECTION
// ═══════════════════════════════════════════════════════════════════════════

/// Default replay window size in bytes (2048-bit window)
pub const DEFAULT_REPLAY_WINDOW_BYTES: usize = 256;

/// Default backtrack expiry in seconds
pub const DEFAULT_REPLAY_EXPIRE_SECS: u64 = 30;

/// Sender ids at or above this value should trigger renegotiation
pub const PACKET_ID_WRAP_WARNING: u32 = 0xFF00_0000;

/// Short-form packet id size (id only)
pub const SHORT_PACKET_ID_SIZE: usize = 4;

/// Long-form packet id size (id + 32-bit time)
pub const LONG_PACKET_ID_SIZE: usize = 8;

// ═══════════════════════════════════════════════════════════════════════════
// SYMMETRIC ENCRYPTION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

/// AEAD key size in bytes (ChaCha20-Poly1305 / AES-256-GCM)
pub const AEAD_KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes
pub const AEAD_NONCE_SIZE: usize = 12;

/// AEAD authentication tag size in bytes
pub const AEAD_TAG_SIZE: usize = 16;
