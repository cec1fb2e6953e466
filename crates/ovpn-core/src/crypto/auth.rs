//! # Control Packet Authentication
//!
//! Keyed BLAKE2s over the whole control packet, truncated to a 16-byte tag.
//! Packets failing verification are dropped before any parsing beyond the
//! fixed header.

use blake2::digest::consts::U32;
use blake2::digest::generic_array::GenericArray;
use blake2::digest::{FixedOutput, KeyInit, Update};
use blake2::Blake2sMac;
use zeroize::Zeroizing;

use ovpn_protocol::PACKET_AUTH_TAG_SIZE;

use super::kdf::HkdfSha256;

const LABEL_PACKET_AUTH: &[u8] = b"ovpn control auth";

/// Control-channel packet authenticator
pub struct PacketAuth {
    key: Zeroizing<[u8; 32]>,
}

impl PacketAuth {
    pub fn new(key: &[u8; 32]) -> Self {
        PacketAuth {
            key: Zeroizing::new(*key),
        }
    }

    /// Authenticator keyed by a sub-key of `psk`, so the session cipher and
    /// the packet tag never share key material.
    pub fn from_psk(psk: &[u8; 32]) -> Result<Self, ovpn_protocol::CryptoError> {
        let key = HkdfSha256::derive_key(b"", psk, LABEL_PACKET_AUTH)?;
        Ok(PacketAuth { key })
    }

    pub fn compute(&self, data: &[u8]) -> [u8; PACKET_AUTH_TAG_SIZE] {
        let mut mac = <Blake2sMac<U32> as KeyInit>::new(GenericArray::from_slice(&self.key[..]));
        mac.update(data);
        let full = mac.finalize_fixed();

        let mut tag = [0u8; PACKET_AUTH_TAG_SIZE];
        tag.copy_from_slice(&full[..PACKET_AUTH_TAG_SIZE]);
        tag
    }

    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        tags_equal(&self.compute(data), tag)
    }
}

/// Compare without an early exit on the first differing byte
#[inline(never)]
fn tags_equal(expected: &[u8], got: &[u8]) -> bool {
    expected.len() == got.len()
        && expected
            .iter()
            .zip(got)
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
