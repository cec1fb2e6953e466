//! # Secure Session
//!
//! The TLS-like session driven by the protocol stack, and a small
//! pre-shared-key implementation of it.
//!
//! The stack feeds the session ciphertext records received from the peer and
//! drains ciphertext records to send; the application side writes and reads
//! cleartext. Record framing:
//!
//! ```text
//! hello:  ┌──────┬──────┬────────────────┐
//!         │ 0x01 │ role │ nonce (32)     │
//!         └──────┴──────┴────────────────┘
//! data:   ┌──────┬────────────┬───────────────────────────┐
//!         │ 0x02 │ seq (8,BE) │ AEAD(cleartext) + tag (16)│
//!         └──────┴────────────┴───────────────────────────┘
//! close:  ┌──────┬────────────┬───────────┐
//!         │ 0x03 │ seq (8,BE) │ tag (16)  │
//!         └──────┴────────────┴───────────┘
//! ```
//!
//! Both peers send a hello with a fresh random nonce. Once both nonces are
//! known the directional keys are derived with HKDF-SHA256 from the
//! pre-shared key. The record sequence number is the AEAD nonce, so records
//! must arrive in order, which the reliability layer guarantees.

use std::collections::VecDeque;
use std::fmt;

use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use ovpn_protocol::{CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE};

use crate::config::CipherSuite;
use crate::crypto::{create_cipher, Cipher, HkdfSha256};

// ═══════════════════════════════════════════════════════════════════════════
// TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of a non-fatal session I/O call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslIo {
    /// This many bytes were consumed or produced
    Done(usize),
    /// Nothing can be done right now
    ShouldRetry,
    /// The peer closed the session
    PeerCloseNotify,
}

/// Fatal secure-session failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SslError {
    Crypto(CryptoError),
    BadRecord(String),
    OutOfOrder { expected: u64, got: u64 },
    Closed,
}

impl fmt::Display for SslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslError::Crypto(e) => write!(f, "session crypto error: {}", e),
            SslError::BadRecord(msg) => write!(f, "bad session record: {}", msg),
            SslError::OutOfOrder { expected, got } => {
                write!(f, "record out of order: expected {}, got {}", expected, got)
            }
            SslError::Closed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for SslError {}

impl From<CryptoError> for SslError {
    fn from(e: CryptoError) -> Self {
        SslError::Crypto(e)
    }
}

impl From<ovpn_protocol::VpnError> for SslError {
    fn from(e: ovpn_protocol::VpnError) -> Self {
        match e {
            ovpn_protocol::VpnError::Crypto(c) => SslError::Crypto(c),
            other => SslError::BadRecord(other.to_string()),
        }
    }
}

/// The encrypted session the protocol stack sequences records for
pub trait SecureSession {
    fn start_handshake(&mut self);

    fn is_established(&self) -> bool;

    /// Encrypt up to `data.len()` bytes of cleartext, reporting how many
    /// were taken.
    fn write_cleartext_unbuffered(&mut self, data: &[u8]) -> Result<SslIo, SslError>;

    fn read_cleartext_ready(&self) -> bool;

    fn read_cleartext(&mut self, buf: &mut [u8]) -> Result<SslIo, SslError>;

    fn read_ciphertext_ready(&self) -> bool;

    fn read_ciphertext(&mut self) -> Option<Vec<u8>>;

    /// Queue a record received from the peer; errors surface from
    /// [`read_cleartext`](Self::read_cleartext).
    fn write_ciphertext(&mut self, record: Vec<u8>);
}

// ═══════════════════════════════════════════════════════════════════════════
// PRE-SHARED KEY SESSION
// ═══════════════════════════════════════════════════════════════════════════

const RECORD_HELLO: u8 = 0x01;
const RECORD_DATA: u8 = 0x02;
const RECORD_CLOSE: u8 = 0x03;

const NONCE_SIZE: usize = 32;
const SEQ_SIZE: usize = 8;

/// Bytes a data record adds to its cleartext: type, sequence number, tag
pub const RECORD_OVERHEAD: usize = 1 + SEQ_SIZE + AEAD_TAG_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn to_u8(self) -> u8 {
        match self {
            Role::Client => 0,
            Role::Server => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    HelloSent,
    Established,
    Closed,
}

struct Keys {
    tx: Box<dyn Cipher>,
    rx: Box<dyn Cipher>,
}

/// Pre-shared-key secure session
pub struct PskSession {
    role: Role,
    psk: Zeroizing<[u8; 32]>,
    suite: CipherSuite,
    max_fragment: usize,
    state: SessionState,
    local_nonce: [u8; NONCE_SIZE],
    peer_nonce: Option<[u8; NONCE_SIZE]>,
    keys: Option<Keys>,
    tx_seq: u64,
    rx_seq: u64,
    outgoing: VecDeque<Vec<u8>>,
    incoming: VecDeque<Vec<u8>>,
    cleartext: VecDeque<u8>,
    peer_closed: bool,
}

impl PskSession {
    pub fn new(role: Role, psk: &[u8; 32], suite: CipherSuite, max_fragment: usize) -> Self {
        let mut local_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut local_nonce);

        PskSession {
            role,
            psk: Zeroizing::new(*psk),
            suite,
            max_fragment: max_fragment.max(1),
            state: SessionState::Idle,
            local_nonce,
            peer_nonce: None,
            keys: None,
            tx_seq: 0,
            rx_seq: 0,
            outgoing: VecDeque::new(),
            incoming: VecDeque::new(),
            cleartext: VecDeque::new(),
            peer_closed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Queue an authenticated close record. Only meaningful once
    /// established; earlier calls just mark the session closed.
    pub fn send_close_notify(&mut self) -> Result<(), SslError> {
        if let Some(keys) = &self.keys {
            let header = record_header(RECORD_CLOSE, self.tx_seq);
            let tag = keys.tx.encrypt(&seq_nonce(self.tx_seq), &[], &header)?;
            self.tx_seq += 1;

            let mut record = header.to_vec();
            record.extend_from_slice(&tag);
            self.outgoing.push_back(record);
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    fn try_establish(&mut self) -> Result<(), SslError> {
        let peer_nonce = match (self.state, self.peer_nonce) {
            (SessionState::HelloSent, Some(nonce)) => nonce,
            _ => return Ok(()),
        };

        let (client_nonce, server_nonce) = match self.role {
            Role::Client => (self.local_nonce, peer_nonce),
            Role::Server => (peer_nonce, self.local_nonce),
        };
        let mut salt = [0u8; NONCE_SIZE * 2];
        salt[..NONCE_SIZE].copy_from_slice(&client_nonce);
        salt[NONCE_SIZE..].copy_from_slice(&server_nonce);

        let (c2s, s2c) = HkdfSha256::derive_directional_keys(&salt, &self.psk[..])?;
        let (tx, rx) = match self.role {
            Role::Client => (c2s, s2c),
            Role::Server => (s2c, c2s),
        };
        self.keys = Some(Keys {
            tx: create_cipher(self.suite, &tx),
            rx: create_cipher(self.suite, &rx),
        });
        self.state = SessionState::Established;
        log::info!("{:?} session established ({})", self.role, self.suite);
        Ok(())
    }

    fn process_record(&mut self, record: &[u8]) -> Result<(), SslError> {
        let (&kind, body) = record
            .split_first()
            .ok_or_else(|| SslError::BadRecord("empty record".into()))?;

        match kind {
            RECORD_HELLO => self.process_hello(body),
            RECORD_DATA | RECORD_CLOSE => self.process_sealed(kind, record),
            other => Err(SslError::BadRecord(format!("unknown record type {:#04x}", other))),
        }
    }

    fn process_hello(&mut self, body: &[u8]) -> Result<(), SslError> {
        if body.len() != 1 + NONCE_SIZE {
            return Err(SslError::BadRecord(format!("hello of {} bytes", body.len())));
        }
        if body[0] == self.role.to_u8() {
            return Err(SslError::BadRecord("hello from a peer with our role".into()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&body[1..]);
        match self.peer_nonce {
            Some(existing) if existing == nonce => return Ok(()),
            Some(_) => return Err(SslError::BadRecord("second hello with a new nonce".into())),
            None => self.peer_nonce = Some(nonce),
        }
        self.try_establish()
    }

    fn process_sealed(&mut self, kind: u8, record: &[u8]) -> Result<(), SslError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| SslError::BadRecord("sealed record before handshake".into()))?;

        if record.len() < 1 + SEQ_SIZE {
            return Err(SslError::BadRecord("truncated record".into()));
        }
        let (header, sealed) = record.split_at(1 + SEQ_SIZE);
        let mut seq_bytes = [0u8; SEQ_SIZE];
        seq_bytes.copy_from_slice(&header[1..]);
        let seq = u64::from_be_bytes(seq_bytes);
        if seq != self.rx_seq {
            return Err(SslError::OutOfOrder {
                expected: self.rx_seq,
                got: seq,
            });
        }

        let plaintext = keys.rx.decrypt(&seq_nonce(seq), sealed, header)?;
        self.rx_seq += 1;

        if kind == RECORD_CLOSE {
            log::debug!("{:?} session: close notify received", self.role);
            self.peer_closed = true;
        } else {
            self.cleartext.extend(plaintext);
        }
        Ok(())
    }
}

impl SecureSession for PskSession {
    fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    fn start_handshake(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }
        let mut hello = Vec::with_capacity(2 + NONCE_SIZE);
        hello.push(RECORD_HELLO);
        hello.push(self.role.to_u8());
        hello.extend_from_slice(&self.local_nonce);
        self.outgoing.push_back(hello);
        self.state = SessionState::HelloSent;
        log::debug!("{:?} session: hello queued", self.role);
    }

    fn write_cleartext_unbuffered(&mut self, data: &[u8]) -> Result<SslIo, SslError> {
        if self.state == SessionState::Closed {
            return Err(SslError::Closed);
        }
        let keys = match &self.keys {
            Some(keys) => keys,
            None => return Ok(SslIo::ShouldRetry),
        };

        let n = data.len().min(self.max_fragment);
        let header = record_header(RECORD_DATA, self.tx_seq);
        let sealed = keys.tx.encrypt(&seq_nonce(self.tx_seq), &data[..n], &header)?;
        self.tx_seq += 1;

        let mut record = header.to_vec();
        record.extend_from_slice(&sealed);
        self.outgoing.push_back(record);
        Ok(SslIo::Done(n))
    }

    fn read_cleartext_ready(&self) -> bool {
        !self.cleartext.is_empty() || !self.incoming.is_empty() || self.peer_closed
    }

    fn read_cleartext(&mut self, buf: &mut [u8]) -> Result<SslIo, SslError> {
        loop {
            if !self.cleartext.is_empty() {
                let n = buf.len().min(self.cleartext.len());
                for (dst, src) in buf.iter_mut().zip(self.cleartext.drain(..n)) {
                    *dst = src;
                }
                return Ok(SslIo::Done(n));
            }
            if self.peer_closed {
                return Ok(SslIo::PeerCloseNotify);
            }
            match self.incoming.pop_front() {
                Some(record) => self.process_record(&record)?,
                None => return Ok(SslIo::ShouldRetry),
            }
        }
    }

    fn read_ciphertext_ready(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn read_ciphertext(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    fn write_ciphertext(&mut self, record: Vec<u8>) {
        self.incoming.push_back(record);
    }
}

impl fmt::Debug for PskSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("tx_seq", &self.tx_seq)
            .field("rx_seq", &self.rx_seq)
            .finish()
    }
}

fn record_header(kind: u8, seq: u64) -> [u8; 1 + SEQ_SIZE] {
    let mut header = [0u8; 1 + SEQ_SIZE];
    header[0] = kind;
    header[1..].copy_from_slice(&seq.to_be_bytes());
    header
}

fn seq_nonce(seq: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[AEAD_NONCE_SIZE - SEQ_SIZE..].copy_from_slice(&seq.to_be_bytes());
    nonce
}
