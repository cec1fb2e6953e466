//! # Control Channel
//!
//! [`StackParent`] implementation with OpenVPN-style control framing.
//!
//! ```text
//! ┌────┬────────────┬──────────┬────────────┬─────────────────┬────────────┬────────────┬─────────┐
//! │ op │ session id │ auth tag │ packet id  │ ACKs (1 + 4n)   │ remote sid │ message id │ payload │
//! │ 1  │ 8          │ 16       │ 8 (long)   │                 │ 8 if n > 0 │ 4, not ACK │         │
//! └────┴────────────┴──────────┴────────────┴─────────────────┴────────────┴────────────┴─────────┘
//! ```
//!
//! The tag covers every byte except itself. The packet id is fresh on every
//! transmission, so a retransmitted message passes the replay window while a
//! replayed datagram does not.

use std::collections::VecDeque;
use std::sync::Arc;

use rand_core::{OsRng, RngCore};

use ovpn_core::crypto::PacketAuth;
use ovpn_core::session::Role;
use ovpn_protocol::{
    op_compose, op_decompose, ErrorKind, Id, Opcode, PacketIdForm, PacketIdReceive, PacketIdSend,
    ProtocolError, ReliableAck, ReplayConfig, SessionId, SessionStats, MAX_PACKET_SIZE,
    MESSAGE_ID_SIZE, OPCODE_SIZE, PACKET_AUTH_TAG_SIZE, SESSION_ID_SIZE,
};

use crate::proto_stack::{Decapsulated, NetSendType, StackPacket, StackParent};

const HEADER_SIZE: usize = OPCODE_SIZE + SESSION_ID_SIZE + PACKET_AUTH_TAG_SIZE;

// ═══════════════════════════════════════════════════════════════════════════
// PACKET
// ═══════════════════════════════════════════════════════════════════════════

/// A control packet: its opcode and either the bare payload (inside the
/// engine) or the full wire encoding (on the transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub opcode: Opcode,
    pub buf: Vec<u8>,
}

impl ControlPacket {
    pub fn new(opcode: Opcode, buf: Vec<u8>) -> Self {
        ControlPacket { opcode, buf }
    }

    /// Wrap a datagram received from the transport
    pub fn from_wire(buf: Vec<u8>) -> Result<Self, ProtocolError> {
        let first = *buf.first().ok_or(ProtocolError::PacketTooSmall { min: 1, got: 0 })?;
        let (opcode, _) = op_decompose(first)?;
        Ok(ControlPacket { opcode, buf })
    }

    pub fn into_wire(self) -> Vec<u8> {
        self.buf
    }
}

impl StackPacket for ControlPacket {
    fn is_raw(&self) -> bool {
        self.opcode.is_raw()
    }

    fn from_ciphertext(ciphertext: Vec<u8>) -> Self {
        ControlPacket::new(Opcode::ControlV1, ciphertext)
    }

    fn into_ciphertext(self) -> Vec<u8> {
        self.buf
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANNEL
// ═══════════════════════════════════════════════════════════════════════════

/// Transmissions by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendCounters {
    pub ssl: u64,
    pub raw: u64,
    pub ack: u64,
    pub retransmit: u64,
}

pub struct ControlChannel {
    role: Role,
    key_id: u8,
    local_sid: SessionId,
    remote_sid: SessionId,
    auth: PacketAuth,
    pid_send: PacketIdSend,
    pid_recv: PacketIdReceive,
    now: u64,

    outgoing: VecDeque<Vec<u8>>,
    app_inbox: VecDeque<Vec<u8>>,
    raw_inbox: VecDeque<ControlPacket>,
    counters: SendCounters,
    invalidated: Option<ErrorKind>,
}

impl ControlChannel {
    pub fn new(role: Role, auth: PacketAuth, stats: Arc<SessionStats>, replay: ReplayConfig) -> Self {
        let mut sid = [0u8; SESSION_ID_SIZE];
        while sid == [0u8; SESSION_ID_SIZE] {
            OsRng.fill_bytes(&mut sid);
        }
        let name = match role {
            Role::Client => "control-client",
            Role::Server => "control-server",
        };

        ControlChannel {
            role,
            key_id: 0,
            local_sid: SessionId::from_bytes(sid),
            remote_sid: SessionId::default(),
            auth,
            pid_send: PacketIdSend::new(PacketIdForm::Long),
            pid_recv: PacketIdReceive::new(PacketIdForm::Long, name, 0, stats, replay),
            now: 0,
            outgoing: VecDeque::new(),
            app_inbox: VecDeque::new(),
            raw_inbox: VecDeque::new(),
            counters: SendCounters::default(),
            invalidated: None,
        }
    }

    pub fn with_key_id(mut self, key_id: u8) -> Self {
        self.key_id = key_id & 0x07;
        self
    }

    /// Current time in seconds, stamped into outgoing packet ids and used
    /// to expire the replay window.
    pub fn set_time(&mut self, now: u64) {
        self.now = now;
    }

    /// The hard reset this side opens the session with
    pub fn hard_reset(&self) -> ControlPacket {
        let opcode = match self.role {
            Role::Client => Opcode::HardResetClientV2,
            Role::Server => Opcode::HardResetServerV2,
        };
        ControlPacket::new(opcode, Vec::new())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_session_id(&self) -> SessionId {
        self.local_sid
    }

    pub fn remote_session_id(&self) -> SessionId {
        self.remote_sid
    }

    /// Next datagram to put on the transport
    pub fn take_outgoing(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    pub fn take_app_data(&mut self) -> Option<Vec<u8>> {
        self.app_inbox.pop_front()
    }

    pub fn take_raw(&mut self) -> Option<ControlPacket> {
        self.raw_inbox.pop_front()
    }

    pub fn counters(&self) -> SendCounters {
        self.counters
    }

    pub fn invalidation_reason(&self) -> Option<ErrorKind> {
        self.invalidated
    }

    /// Prefix packet id, session id and tag, then the op byte
    fn seal(&mut self, opcode: Opcode, mut body: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        self.pid_send.write_next(&mut body, true, self.now)?;

        let op = op_compose(opcode, self.key_id);
        let mut signed = Vec::with_capacity(OPCODE_SIZE + SESSION_ID_SIZE + body.len());
        signed.push(op);
        signed.extend_from_slice(self.local_sid.as_bytes());
        signed.extend_from_slice(&body);
        let tag = self.auth.compute(&signed);

        let mut wire = Vec::with_capacity(HEADER_SIZE + body.len());
        wire.extend_from_slice(&signed[..OPCODE_SIZE + SESSION_ID_SIZE]);
        wire.extend_from_slice(&tag);
        wire.extend_from_slice(&body);

        if wire.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                max: MAX_PACKET_SIZE,
                got: wire.len(),
            });
        }
        Ok(wire)
    }

    fn check_session(&mut self, sid: SessionId) -> Result<(), ProtocolError> {
        if !self.remote_sid.is_defined() {
            log::info!("{:?}: peer session id {}", self.role, sid);
            self.remote_sid = sid;
            Ok(())
        } else if self.remote_sid == sid {
            Ok(())
        } else {
            Err(ProtocolError::SessionMismatch)
        }
    }
}

impl StackParent for ControlChannel {
    type Packet = ControlPacket;

    fn encapsulate(
        &mut self,
        id: Id,
        packet: &mut ControlPacket,
        acks: &mut ReliableAck,
    ) -> Result<(), ProtocolError> {
        let mut body = Vec::with_capacity(1 + MESSAGE_ID_SIZE + packet.buf.len() + 64);
        if acks.prepend(&mut body, false) > 0 {
            body.extend_from_slice(self.remote_sid.as_bytes());
        }
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&packet.buf);

        packet.buf = self.seal(packet.opcode, body)?;
        Ok(())
    }

    fn decapsulate(
        &mut self,
        packet: ControlPacket,
    ) -> Result<Option<Decapsulated<ControlPacket>>, ProtocolError> {
        let buf = packet.buf;
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::PacketTooSmall {
                min: HEADER_SIZE,
                got: buf.len(),
            });
        }
        let (opcode, key_id) = op_decompose(buf[0])?;
        if key_id != self.key_id {
            log::debug!("{:?}: ignoring packet for key id {}", self.role, key_id);
            return Ok(None);
        }

        let sid_end = OPCODE_SIZE + SESSION_ID_SIZE;
        let mut signed = Vec::with_capacity(buf.len() - PACKET_AUTH_TAG_SIZE);
        signed.extend_from_slice(&buf[..sid_end]);
        signed.extend_from_slice(&buf[HEADER_SIZE..]);
        if !self.auth.verify(&signed, &buf[sid_end..HEADER_SIZE]) {
            return Err(ProtocolError::AuthFailed);
        }

        let mut cursor = &buf[OPCODE_SIZE..];
        let peer_sid = SessionId::read(&mut cursor)?;
        cursor = &buf[HEADER_SIZE..];

        // Dry run here; the id is committed once the whole packet parses
        let pid = self.pid_recv.read_next(&mut cursor)?;
        self.pid_recv
            .do_test_add(&pid, self.now, false)
            .map_err(ProtocolError::Replay)?;

        self.check_session(peer_sid)?;

        let acks = ReliableAck::read(&mut cursor)?;
        if !acks.is_empty() {
            let echoed = SessionId::read(&mut cursor)?;
            if echoed != self.local_sid {
                return Err(ProtocolError::SessionMismatch);
            }
        }

        let message = if opcode.has_message_id() {
            if cursor.len() < MESSAGE_ID_SIZE {
                return Err(ProtocolError::PacketTooSmall {
                    min: MESSAGE_ID_SIZE,
                    got: cursor.len(),
                });
            }
            let (id_bytes, payload) = cursor.split_at(MESSAGE_ID_SIZE);
            let id = Id::from_be_bytes([id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]]);
            Some((id, ControlPacket::new(opcode, payload.to_vec())))
        } else {
            if !cursor.is_empty() {
                return Err(ProtocolError::CorruptedPacket(format!(
                    "{} trailing bytes after ACK",
                    cursor.len()
                )));
            }
            None
        };

        self.pid_recv
            .do_test_add(&pid, self.now, true)
            .map_err(ProtocolError::Replay)?;

        log::trace!("{:?}: recv {} pid {} acks {:?}", self.role, opcode, pid, acks);
        Ok(Some(Decapsulated { acks, message }))
    }

    fn generate_ack(&mut self, acks: &mut ReliableAck) -> Result<ControlPacket, ProtocolError> {
        let mut body = Vec::new();
        if acks.prepend(&mut body, true) > 0 {
            body.extend_from_slice(self.remote_sid.as_bytes());
        }
        let wire = self.seal(Opcode::AckV1, body)?;
        Ok(ControlPacket::new(Opcode::AckV1, wire))
    }

    fn net_send(&mut self, packet: &ControlPacket, kind: NetSendType) {
        match kind {
            NetSendType::Ssl => self.counters.ssl += 1,
            NetSendType::Raw => self.counters.raw += 1,
            NetSendType::Ack => self.counters.ack += 1,
            NetSendType::Retransmit => self.counters.retransmit += 1,
        }
        self.outgoing.push_back(packet.buf.clone());
    }

    fn app_recv(&mut self, cleartext: Vec<u8>) {
        self.app_inbox.push_back(cleartext);
    }

    fn raw_recv(&mut self, packet: ControlPacket) {
        log::debug!("{:?}: received {}", self.role, packet.opcode);
        self.raw_inbox.push_back(packet);
    }

    fn invalidate_callback(&mut self, reason: ErrorKind) {
        self.invalidated = Some(reason);
    }
}
