//! # AEAD Ciphers
//!
//! ChaCha20-Poly1305 (RFC 8439) and AES-256-GCM (NIST SP 800-38D) from
//! RustCrypto behind one wrapper. Both take a 256-bit key and a 96-bit nonce
//! and append a 16-byte tag.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit, Nonce, Payload};

use ovpn_protocol::{CryptoError, Result, AEAD_KEY_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE};

use super::Cipher;

/// A RustCrypto AEAD with a display name
pub trait AeadAlgorithm: Aead + KeyInit + Send + Sync {
    const NAME: &'static str;
}

impl AeadAlgorithm for chacha20poly1305::ChaCha20Poly1305 {
    const NAME: &'static str = "ChaCha20-Poly1305";
}

impl AeadAlgorithm for aes_gcm::Aes256Gcm {
    const NAME: &'static str = "AES-256-GCM";
}

pub struct AeadCipher<C> {
    inner: C,
}

pub type ChaCha20Poly1305 = AeadCipher<chacha20poly1305::ChaCha20Poly1305>;
pub type Aes256Gcm = AeadCipher<aes_gcm::Aes256Gcm>;

impl<C: AeadAlgorithm> AeadCipher<C> {
    pub fn new(key: &[u8; AEAD_KEY_SIZE]) -> Self {
        AeadCipher {
            inner: C::new(GenericArray::from_slice(key)),
        }
    }
}

impl<C: AeadAlgorithm> Cipher for AeadCipher<C> {
    fn encrypt(&self, nonce: &[u8; AEAD_NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt(Nonce::<C>::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed.into())
    }

    fn decrypt(&self, nonce: &[u8; AEAD_NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed.into());
        }
        self.inner
            .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::AuthenticationFailed.into())
    }

    fn name(&self) -> &'static str {
        C::NAME
    }
}
