//! # Key Derivation
//!
//! HKDF-SHA256 for turning a pre-shared key and the two handshake nonces
//! into per-direction session keys.
//!
//! ```text
//! salt     = client_nonce || server_nonce
//! c2s_key  = HKDF-Expand(HKDF-Extract(salt, psk), LABEL_CLIENT_TO_SERVER)
//! s2c_key  = HKDF-Expand(HKDF-Extract(salt, psk), LABEL_SERVER_TO_CLIENT)
//! ```

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use ovpn_protocol::CryptoError;

/// Size of derived keys in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

pub const LABEL_CLIENT_TO_SERVER: &[u8] = b"ovpn session client->server";
pub const LABEL_SERVER_TO_CLIENT: &[u8] = b"ovpn session server->client";

/// HKDF using SHA-256
pub struct HkdfSha256;

impl HkdfSha256 {
    /// Derive a single 32-byte key
    pub fn derive_key(
        salt: &[u8],
        ikm: &[u8],
        info: &[u8],
    ) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);

        let mut okm = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        hkdf.expand(info, &mut okm[..])
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

        Ok(okm)
    }

    /// Derive the (client->server, server->client) key pair
    pub fn derive_directional_keys(
        salt: &[u8],
        psk: &[u8],
    ) -> Result<(Zeroizing<[u8; DERIVED_KEY_SIZE]>, Zeroizing<[u8; DERIVED_KEY_SIZE]>), CryptoError>
    {
        let c2s = Self::derive_key(salt, psk, LABEL_CLIENT_TO_SERVER)?;
        let s2c = Self::derive_key(salt, psk, LABEL_SERVER_TO_CLIENT)?;
        Ok((c2s, s2c))
    }
}
