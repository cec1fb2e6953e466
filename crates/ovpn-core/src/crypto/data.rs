//! # Data Channel Crypto
//!
//! AEAD protection for data-channel packets, with the packet id doubling as
//! the nonce and as additional authenticated data.
//!
//! ```text
//! ┌──────────────────┬─────────────────────────────┐
//! │ packet id (4/8)  │ ciphertext + tag (N + 16)   │
//! └──────────────────┴─────────────────────────────┘
//!   └── AAD
//! ```
//!
//! On receive the packet id is checked against the replay window without
//! recording it, the packet is authenticated, and only then is the id
//! committed. A forged packet therefore can never advance the window.

use std::sync::Arc;

use ovpn_protocol::{
    CryptoError, ErrorKind, PacketId, PacketIdForm, PacketIdReceive, PacketIdSend, ProtocolError,
    ReplayConfig, Result, SessionStats, AEAD_KEY_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE,
};

use super::{create_cipher, Cipher};
use crate::config::CipherSuite;

pub struct DataCrypto {
    encryptor: Box<dyn Cipher>,
    decryptor: Box<dyn Cipher>,
    send: PacketIdSend,
    recv: PacketIdReceive,
    form: PacketIdForm,
    stats: Arc<SessionStats>,
}

impl DataCrypto {
    pub fn new(
        suite: CipherSuite,
        tx_key: &[u8; AEAD_KEY_SIZE],
        rx_key: &[u8; AEAD_KEY_SIZE],
        form: PacketIdForm,
        stats: Arc<SessionStats>,
        replay: ReplayConfig,
    ) -> Self {
        DataCrypto {
            encryptor: create_cipher(suite, tx_key),
            decryptor: create_cipher(suite, rx_key),
            send: PacketIdSend::new(form),
            recv: PacketIdReceive::new(form, "data", 0, Arc::clone(&stats), replay),
            form,
            stats,
        }
    }

    /// Encrypt `payload`; `now` is the current time in seconds
    pub fn encrypt(&mut self, payload: &[u8], now: u64) -> Result<Vec<u8>> {
        let pid = self.send.next(now).map_err(|e| {
            self.stats.error(e.kind());
            e
        })?;

        let mut packet = Vec::with_capacity(self.form.size() + payload.len() + AEAD_TAG_SIZE);
        pid.write(&mut packet, self.form, false);

        let ciphertext = self.encryptor.encrypt(&nonce_for(&pid), payload, &packet)?;
        packet.extend_from_slice(&ciphertext);
        Ok(packet)
    }

    /// Authenticate, replay-check and decrypt a packet from the peer
    pub fn decrypt(&mut self, packet: &[u8], now: u64) -> Result<Vec<u8>> {
        let mut cursor = packet;
        let pid = self.recv.read_next(&mut cursor).map_err(|e| {
            self.stats.error(ErrorKind::BufferError);
            e
        })?;
        let header_len = packet.len() - cursor.len();

        if let Err(e) = self.recv.do_test_add(&pid, now, false) {
            self.stats.error(e.kind());
            return Err(ProtocolError::Replay(e).into());
        }

        let plaintext = self
            .decryptor
            .decrypt(&nonce_for(&pid), cursor, &packet[..header_len])
            .map_err(|e| {
                self.stats.error(ErrorKind::HmacError);
                e
            })?;

        if !self.recv.test_add(&pid, now, true) {
            return Err(CryptoError::AuthenticationFailed.into());
        }

        Ok(plaintext)
    }

    /// The sender is close to exhausting its packet id space
    pub fn renegotiation_due(&self) -> bool {
        self.send.wrap_warning()
    }

    pub fn cipher_name(&self) -> &'static str {
        self.encryptor.name()
    }
}

/// 96-bit nonce: packet id, then the low 32 bits of its time stamp, then
/// zero padding.
fn nonce_for(pid: &PacketId) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[0..4].copy_from_slice(&pid.id.to_be_bytes());
    nonce[4..8].copy_from_slice(&(pid.time as u32).to_be_bytes());
    nonce
}
