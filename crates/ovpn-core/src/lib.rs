//! # ovpn-core
//!
//! Core functionality for the ovpn control channel.
//!
//! This crate provides:
//! - Configuration handling (TOML-based)
//! - Cryptographic primitives (ChaCha20-Poly1305, AES-256-GCM, HKDF, keyed BLAKE2s)
//! - Data-channel packet protection with replay checking
//! - The secure session driven by the protocol stack

pub mod config;
pub mod crypto;
pub mod session;

// Re-export commonly used types
pub use config::{
    example_config, hex_to_key, key_to_hex, CipherSuite, ConfigError, KeySource,
    LoggingSection, ProtoConfig, ReliabilitySection, ReplaySection, SessionSection,
    SimulationSection,
};
pub use crypto::{
    create_cipher, AeadCipher, Aes256Gcm, ChaCha20Poly1305, Cipher, DataCrypto, HkdfSha256,
    PacketAuth,
};
pub use session::{
    PskSession, Role, SecureSession, SessionState, SslError, SslIo, RECORD_OVERHEAD,
};
