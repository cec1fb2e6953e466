//! # Cryptographic Module
//!
//! RustCrypto-backed primitives used by the secure session, the control
//! channel and the data channel.
//!
//! ## Symmetric Encryption
//! - ChaCha20-Poly1305 (RFC 8439)
//! - AES-256-GCM (NIST SP 800-38D)
//!
//! ## Key Derivation
//! - HKDF-SHA256
//!
//! ## Packet Authentication
//! - Keyed BLAKE2s, truncated to 16 bytes

mod aead;
mod auth;
mod data;

pub mod kdf;

pub use aead::{AeadAlgorithm, AeadCipher, Aes256Gcm, ChaCha20Poly1305};
pub use auth::PacketAuth;
pub use data::DataCrypto;
pub use kdf::HkdfSha256;

use crate::config::CipherSuite;
use ovpn_protocol::{Result, AEAD_KEY_SIZE, AEAD_NONCE_SIZE};

/// Unified AEAD cipher interface
pub trait Cipher: Send + Sync {
    fn encrypt(&self, nonce: &[u8; AEAD_NONCE_SIZE], plaintext: &[u8], aad: &[u8])
        -> Result<Vec<u8>>;
    fn decrypt(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
}

/// Create cipher from config
pub fn create_cipher(cipher_type: CipherSuite, key: &[u8; AEAD_KEY_SIZE]) -> Box<dyn Cipher> {
    match cipher_type {
        CipherSuite::ChaCha20Poly1305 => Box::new(ChaCha20Poly1305::new(key)),
        CipherSuite::Aes256Gcm => Box::new(Aes256Gcm::new(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cipher_names() {
        let key = [3u8; 32];
        assert_eq!(create_cipher(CipherSuite::ChaCha20Poly1305, &key).name(), "ChaCha20-Poly1305");
        assert_eq!(create_cipher(CipherSuite::Aes256Gcm, &key).name(), "AES-256-GCM");
    }

    #[test]
    fn test_ciphers_not_interchangeable() {
        let key = [3u8; 32];
        let nonce = [0u8; AEAD_NONCE_SIZE];
        let chacha = create_cipher(CipherSuite::ChaCha20Poly1305, &key);
        let aes = create_cipher(CipherSuite::Aes256Gcm, &key);
        let ct = chacha.encrypt(&nonce, b"data", b"").unwrap();
        assert!(aes.decrypt(&nonce, &ct, b"").is_err());
    }
}
