//! # Protocol Stack
//!
//! Moves control messages between the application, a [`SecureSession`] and
//! an unreliable transport.
//!
//! ```text
//!   app_send ──► session (cleartext → ciphertext) ──┐
//!   raw_send ───────────────────────────────────────┴─► send window ─► encapsulate ─► net_send
//!
//!   net_recv ─► decapsulate ─► ACKs → send window
//!                            └► receive window ─► in order ─┬─► raw_recv
//!                                                           └─► session ─► app_recv
//! ```
//!
//! The engine is single threaded and owns its parent. Messages are stored in
//! the send window unencapsulated, so every (re)transmission is framed afresh
//! with whatever ACKs are pending at that moment.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ovpn_core::config::ProtoConfig;
use ovpn_core::session::{SecureSession, SslError, SslIo};
use ovpn_protocol::{
    ErrorKind, Id, ProtocolError, RecvOutcome, ReliableAck, ReliableRecv, ReliableSend,
    SessionStats, Stat, CLEARTEXT_READ_SIZE, DEFAULT_MAX_ACK_LIST, DEFAULT_RETRANSMIT_TIMEOUT_MS,
    DEFAULT_SPAN,
};

// ═══════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// A control packet as seen by the engine
pub trait StackPacket: Clone {
    /// Raw packets bypass the secure session
    fn is_raw(&self) -> bool;

    fn from_ciphertext(ciphertext: Vec<u8>) -> Self;

    fn into_ciphertext(self) -> Vec<u8>;
}

/// How a packet handed to [`StackParent::net_send`] came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetSendType {
    Ssl,
    Raw,
    Ack,
    Retransmit,
}

/// A decapsulated packet: the ACKs it carried and, unless it was ACK-only,
/// the message with its reliability id.
#[derive(Debug, Clone)]
pub struct Decapsulated<P> {
    pub acks: Vec<Id>,
    pub message: Option<(Id, P)>,
}

/// Framing and delivery hooks supplied by the owner of the engine
pub trait StackParent {
    type Packet: StackPacket;

    /// Frame `packet` for the wire, consuming pending ACKs from `acks`
    fn encapsulate(
        &mut self,
        id: Id,
        packet: &mut Self::Packet,
        acks: &mut ReliableAck,
    ) -> Result<(), ProtocolError>;

    /// Strip framing. `Ok(None)` drops the packet silently.
    fn decapsulate(
        &mut self,
        packet: Self::Packet,
    ) -> Result<Option<Decapsulated<Self::Packet>>, ProtocolError>;

    /// Build a standalone ACK packet from the front of `acks`
    fn generate_ack(&mut self, acks: &mut ReliableAck) -> Result<Self::Packet, ProtocolError>;

    fn net_send(&mut self, packet: &Self::Packet, kind: NetSendType);

    fn app_recv(&mut self, cleartext: Vec<u8>);

    fn raw_recv(&mut self, packet: Self::Packet);

    fn invalidate_callback(&mut self, _reason: ErrorKind) {}
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// The engine was already invalidated for this reason
    Invalidated(ErrorKind),
    Ssl(SslError),
    Encapsulation(ProtocolError),
    PeerClosed,
    UnknownSslStatus,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::Invalidated(reason) => write!(f, "stack invalidated: {}", reason),
            StackError::Ssl(e) => write!(f, "secure session error: {}", e),
            StackError::Encapsulation(e) => write!(f, "encapsulation error: {}", e),
            StackError::PeerClosed => write!(f, "peer closed the session"),
            StackError::UnknownSslStatus => write!(f, "unknown status from secure session"),
        }
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StackError::Ssl(e) => Some(e),
            StackError::Encapsulation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SslError> for StackError {
    fn from(e: SslError) -> Self {
        StackError::Ssl(e)
    }
}

impl From<ProtocolError> for StackError {
    fn from(e: ProtocolError) -> Self {
        StackError::Encapsulation(e)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION & STATE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    pub span: Id,
    pub retransmit_timeout: Duration,
    pub max_ack_list: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            span: DEFAULT_SPAN,
            retransmit_timeout: Duration::from_millis(DEFAULT_RETRANSMIT_TIMEOUT_MS),
            max_ack_list: DEFAULT_MAX_ACK_LIST,
        }
    }
}

impl From<&ProtoConfig> for StackConfig {
    fn from(config: &ProtoConfig) -> Self {
        StackConfig {
            span: config.reliability.span,
            retransmit_timeout: config.retransmit_timeout(),
            max_ack_list: config.reliability.max_ack_list,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    PreHandshake,
    Handshaking,
    Established,
    Invalidated,
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackState::PreHandshake => "pre-handshake",
            StackState::Handshaking => "handshaking",
            StackState::Established => "established",
            StackState::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

pub struct ProtoStack<S: SecureSession, P: StackParent> {
    parent: P,
    session: S,
    config: StackConfig,
    stats: Arc<SessionStats>,

    rel_send: ReliableSend<P::Packet>,
    rel_recv: ReliableRecv<P::Packet>,
    xmit_acks: ReliableAck,

    raw_write_queue: VecDeque<P::Packet>,
    app_write_queue: VecDeque<Vec<u8>>,

    next_retransmit: Option<Instant>,
    up_stack_reentry_level: u32,
    ssl_started: bool,
    invalidation_reason: Option<ErrorKind>,
}

impl<S: SecureSession, P: StackParent> ProtoStack<S, P> {
    pub fn new(parent: P, session: S, config: StackConfig, stats: Arc<SessionStats>) -> Self {
        ProtoStack {
            parent,
            session,
            config,
            stats,
            rel_send: ReliableSend::new(config.span),
            rel_recv: ReliableRecv::new(config.span),
            xmit_acks: ReliableAck::new(config.max_ack_list),
            raw_write_queue: VecDeque::new(),
            app_write_queue: VecDeque::new(),
            next_retransmit: None,
            up_stack_reentry_level: 0,
            ssl_started: false,
            invalidation_reason: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────────────

    pub fn start_handshake(&mut self) -> Result<(), StackError> {
        if self.invalidated() {
            return Ok(());
        }
        self.session.start_handshake();
        self.ssl_started = true;
        log::info!("handshake started");
        self.with_reentry(|s| s.up_sequenced())
    }

    /// Process a packet from the transport.
    ///
    /// Returns `Ok(true)` only when the packet carried a message that was
    /// newly accepted into the receive window. ACK-only packets, duplicates
    /// and ids outside the window give `Ok(false)`, as do malformed,
    /// unauthenticated or replayed packets, which are also counted. None of
    /// these invalidate the engine.
    pub fn net_recv(&mut self, packet: P::Packet) -> Result<bool, StackError> {
        if self.invalidated() {
            return Ok(false);
        }

        let decapsulated = match self.parent.decapsulate(packet) {
            Ok(Some(d)) => d,
            Ok(None) => return Ok(false),
            Err(e) => {
                log::debug!("dropping packet: {}", e);
                self.stats.error(e.kind());
                return Ok(false);
            }
        };
        self.stats.inc_stat(Stat::PacketsIn, 1);

        for id in decapsulated.acks {
            self.rel_send.ack(id);
        }

        let mut accepted = false;
        if let Some((id, packet)) = decapsulated.message {
            let outcome = self.rel_recv.receive(packet, id);
            log::trace!("recv message {}: {:?}", id, outcome);
            if outcome.should_ack() {
                self.xmit_acks.push_back(id);
            }
            accepted = outcome == RecvOutcome::Accepted;
        }

        self.with_reentry(|s| s.up_sequenced())?;
        Ok(accepted)
    }

    pub fn app_send(&mut self, cleartext: Vec<u8>) {
        if !self.invalidated() {
            self.app_write_queue.push_back(cleartext);
        }
    }

    pub fn raw_send(&mut self, packet: P::Packet) {
        if !self.invalidated() {
            self.raw_write_queue.push_back(packet);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outputs
    // ─────────────────────────────────────────────────────────────────────

    /// Push queued raw packets and application data into the send window
    /// and onto the wire.
    pub fn flush(&mut self, now: Instant) -> Result<(), StackError> {
        if self.invalidated() || self.up_stack_reentry_level > 0 {
            return Ok(());
        }
        self.down_stack_raw(now)?;
        self.down_stack_app(now)?;
        self.update_retransmit(now);
        Ok(())
    }

    /// Send standalone ACK packets until nothing is left to acknowledge
    pub fn send_pending_acks(&mut self) -> Result<(), StackError> {
        if self.invalidated() {
            return Ok(());
        }
        while !self.xmit_acks.is_empty() {
            let before = self.xmit_acks.len();
            match self.parent.generate_ack(&mut self.xmit_acks) {
                Ok(packet) => {
                    self.stats.inc_stat(Stat::PacketsOut, 1);
                    self.parent.net_send(&packet, NetSendType::Ack);
                }
                Err(e) => {
                    return Err(self.fail(ErrorKind::EncapsulationError, StackError::Encapsulation(e)))
                }
            }
            if self.xmit_acks.len() >= before {
                break;
            }
        }
        Ok(())
    }

    /// Resend every in-flight message whose timer has expired
    pub fn retransmit(&mut self, now: Instant) -> Result<(), StackError> {
        match self.next_retransmit {
            Some(at) if now >= at && !self.invalidated() => {}
            _ => return Ok(()),
        }

        let due: Vec<Id> = self
            .rel_send
            .iter()
            .filter(|m| m.packet.is_some() && m.ready_retransmit(now))
            .map(|m| m.id())
            .collect();

        for id in due {
            log::debug!("retransmitting message {}", id);
            self.send_message(id, NetSendType::Retransmit)?;
            if let Some(m) = self.rel_send.ref_by_id(id) {
                m.reset_retransmit(now, self.config.retransmit_timeout);
            }
        }

        self.update_retransmit(now);
        Ok(())
    }

    /// When [`retransmit`](Self::retransmit) next has work to do
    pub fn next_retransmit(&self) -> Option<Instant> {
        if self.invalidated() {
            None
        } else {
            self.next_retransmit
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Invalidation
    // ─────────────────────────────────────────────────────────────────────

    /// Stop the engine for good. Only the first reason is kept.
    pub fn invalidate(&mut self, reason: ErrorKind) {
        if self.invalidation_reason.is_some() {
            return;
        }
        log::warn!("protocol stack invalidated: {}", reason);
        self.invalidation_reason = Some(reason);
        self.raw_write_queue.clear();
        self.app_write_queue.clear();
        self.parent.invalidate_callback(reason);
    }

    pub fn invalidated(&self) -> bool {
        self.invalidation_reason.is_some()
    }

    pub fn invalidation_reason(&self) -> Option<ErrorKind> {
        self.invalidation_reason
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn ssl_started(&self) -> bool {
        self.ssl_started
    }

    pub fn state(&self) -> StackState {
        if self.invalidated() {
            StackState::Invalidated
        } else if !self.ssl_started {
            StackState::PreHandshake
        } else if self.session.is_established() {
            StackState::Established
        } else {
            StackState::Handshaking
        }
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn parent_mut(&mut self) -> &mut P {
        &mut self.parent
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Messages sent but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.rel_send.in_flight()
    }

    pub fn pending_acks(&self) -> usize {
        self.xmit_acks.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Run `f` with the upward pass marked active, so a nested
    /// [`flush`](Self::flush) is a no-op until it returns.
    fn with_reentry<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.up_stack_reentry_level += 1;
        let result = f(self);
        self.up_stack_reentry_level -= 1;
        result
    }

    fn up_sequenced(&mut self) -> Result<(), StackError> {
        while self.rel_recv.ready() {
            if self.rel_recv.next_sequenced().packet.is_raw() {
                if let Some(m) = self.rel_recv.advance() {
                    self.parent.raw_recv(m.packet);
                }
            } else if self.ssl_started {
                if let Some(m) = self.rel_recv.advance() {
                    self.session.write_ciphertext(m.packet.into_ciphertext());
                }
            } else {
                // Ciphertext waits in the window until the handshake starts
                break;
            }
        }

        while self.session.read_cleartext_ready() {
            let mut buf = vec![0u8; CLEARTEXT_READ_SIZE];
            match self.session.read_cleartext(&mut buf) {
                Ok(SslIo::ShouldRetry) => break,
                Ok(SslIo::Done(0)) => {
                    // Nothing more can be read this pass
                    self.parent.app_recv(Vec::new());
                    break;
                }
                Ok(SslIo::Done(n)) => {
                    buf.truncate(n);
                    self.stats.inc_stat(Stat::BytesIn, n as u64);
                    self.parent.app_recv(buf);
                }
                Ok(SslIo::PeerCloseNotify) => {
                    log::info!("peer sent close notify");
                    self.stats.error(ErrorKind::SslError);
                    self.invalidate(ErrorKind::ClientHalt);
                    return Err(StackError::PeerClosed);
                }
                Err(e) => return Err(self.fail(ErrorKind::SslError, StackError::Ssl(e))),
            }
        }
        Ok(())
    }

    fn down_stack_raw(&mut self, now: Instant) -> Result<(), StackError> {
        while self.rel_send.ready() {
            let packet = match self.raw_write_queue.pop_front() {
                Some(p) => p,
                None => break,
            };
            let id = self.enqueue(packet, now);
            self.send_message(id, NetSendType::Raw)?;
        }
        Ok(())
    }

    fn down_stack_app(&mut self, now: Instant) -> Result<(), StackError> {
        while self.ssl_started {
            let front = match self.app_write_queue.front_mut() {
                Some(buf) => buf,
                None => break,
            };
            match self.session.write_cleartext_unbuffered(front) {
                Ok(SslIo::Done(n)) => {
                    self.stats.inc_stat(Stat::BytesOut, n as u64);
                    if n >= front.len() {
                        self.app_write_queue.pop_front();
                    } else if n == 0 {
                        break;
                    } else {
                        front.drain(..n);
                    }
                }
                Ok(SslIo::ShouldRetry) => break,
                Ok(SslIo::PeerCloseNotify) => {
                    return Err(self.fail(ErrorKind::SslError, StackError::UnknownSslStatus))
                }
                Err(e) => return Err(self.fail(ErrorKind::SslError, StackError::Ssl(e))),
            }
        }

        while self.rel_send.ready() && self.session.read_ciphertext_ready() {
            let ciphertext = match self.session.read_ciphertext() {
                Some(c) => c,
                None => break,
            };
            let id = self.enqueue(P::Packet::from_ciphertext(ciphertext), now);
            self.send_message(id, NetSendType::Ssl)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, packet: P::Packet, now: Instant) -> Id {
        let m = self.rel_send.send(now, self.config.retransmit_timeout);
        m.packet = Some(packet);
        m.id()
    }

    /// Encapsulate a copy of in-flight message `id` and transmit it
    fn send_message(&mut self, id: Id, kind: NetSendType) -> Result<(), StackError> {
        let mut packet = match self.rel_send.ref_by_id(id).and_then(|m| m.packet.clone()) {
            Some(p) => p,
            None => return Ok(()),
        };
        if let Err(e) = self.parent.encapsulate(id, &mut packet, &mut self.xmit_acks) {
            return Err(self.fail(ErrorKind::EncapsulationError, StackError::Encapsulation(e)));
        }
        log::trace!("send message {} ({:?})", id, kind);
        self.stats.inc_stat(Stat::PacketsOut, 1);
        self.parent.net_send(&packet, kind);
        Ok(())
    }

    fn update_retransmit(&mut self, now: Instant) {
        self.next_retransmit = self.rel_send.until_retransmit(now).map(|d| now + d);
    }

    fn fail(&mut self, kind: ErrorKind, err: StackError) -> StackError {
        self.stats.error(kind);
        self.invalidate(kind);
        err
    }
}

impl<S: SecureSession, P: StackParent> fmt::Debug for ProtoStack<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoStack")
            .field("state", &self.state())
            .field("in_flight", &self.rel_send.in_flight())
            .field("recv_head", &self.rel_recv.head_id())
            .field("pending_acks", &self.xmit_acks.len())
            .field("next_retransmit", &self.next_retransmit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Packet with a raw flag, an optional reliability id and a body
    #[derive(Debug, Clone, PartialEq)]
    struct TestPacket {
        raw: bool,
        body: Vec<u8>,
        id: Option<Id>,
        acks: Vec<Id>,
    }

    impl StackPacket for TestPacket {
        fn is_raw(&self) -> bool {
            self.raw
        }
        fn from_ciphertext(ciphertext: Vec<u8>) -> Self {
            TestPacket {
                raw: false,
                body: ciphertext,
                id: None,
                acks: Vec::new(),
            }
        }
        fn into_ciphertext(self) -> Vec<u8> {
            self.body
        }
    }

    #[derive(Default)]
    struct TestParent {
        sent: Vec<(TestPacket, NetSendType)>,
        app: Vec<Vec<u8>>,
        raw: Vec<TestPacket>,
        invalidated: Option<ErrorKind>,
        fail_encapsulate: bool,
    }

    impl StackParent for TestParent {
        type Packet = TestPacket;

        fn encapsulate(
            &mut self,
            id: Id,
            packet: &mut TestPacket,
            acks: &mut ReliableAck,
        ) -> Result<(), ProtocolError> {
            if self.fail_encapsulate {
                return Err(ProtocolError::PacketTooLarge { max: 0, got: 1 });
            }
            packet.id = Some(id);
            packet.acks = std::iter::from_fn(|| acks.pop_front()).take(4).collect();
            Ok(())
        }

        fn decapsulate(
            &mut self,
            packet: TestPacket,
        ) -> Result<Option<Decapsulated<TestPacket>>, ProtocolError> {
            if packet.body == b"garbage" {
                return Err(ProtocolError::AuthFailed);
            }
            let acks = packet.acks.clone();
            let message = packet.id.map(|id| (id, packet));
            Ok(Some(Decapsulated { acks, message }))
        }

        fn generate_ack(&mut self, acks: &mut ReliableAck) -> Result<TestPacket, ProtocolError> {
            Ok(TestPacket {
                raw: true,
                body: Vec::new(),
                id: None,
                acks: std::iter::from_fn(|| acks.pop_front()).take(8).collect(),
            })
        }

        fn net_send(&mut self, packet: &TestPacket, kind: NetSendType) {
            self.sent.push((packet.clone(), kind));
        }

        fn app_recv(&mut self, cleartext: Vec<u8>) {
            self.app.push(cleartext);
        }

        fn raw_recv(&mut self, packet: TestPacket) {
            self.raw.push(packet);
        }

        fn invalidate_callback(&mut self, reason: ErrorKind) {
            self.invalidated = Some(reason);
        }
    }

    /// Identity session: ciphertext is the cleartext
    #[derive(Default)]
    struct PlainSession {
        started: bool,
        out: VecDeque<Vec<u8>>,
        inp: VecDeque<u8>,
        closed: bool,
        empty_read: bool,
    }

    impl SecureSession for PlainSession {
        fn start_handshake(&mut self) {
            self.started = true;
        }
        fn is_established(&self) -> bool {
            self.started
        }
        fn write_cleartext_unbuffered(&mut self, data: &[u8]) -> Result<SslIo, SslError> {
            if !self.started {
                return Ok(SslIo::ShouldRetry);
            }
            self.out.push_back(data.to_vec());
            Ok(SslIo::Done(data.len()))
        }
        fn read_cleartext_ready(&self) -> bool {
            !self.inp.is_empty() || self.closed || self.empty_read
        }
        fn read_cleartext(&mut self, buf: &mut [u8]) -> Result<SslIo, SslError> {
            if self.empty_read {
                return Ok(SslIo::Done(0));
            }
            if self.inp.is_empty() {
                return Ok(if self.closed {
                    SslIo::PeerCloseNotify
                } else {
                    SslIo::ShouldRetry
                });
            }
            let n = buf.len().min(self.inp.len());
            for (dst, src) in buf.iter_mut().zip(self.inp.drain(..n)) {
                *dst = src;
            }
            Ok(SslIo::Done(n))
        }
        fn read_ciphertext_ready(&self) -> bool {
            !self.out.is_empty()
        }
        fn read_ciphertext(&mut self) -> Option<Vec<u8>> {
            self.out.pop_front()
        }
        fn write_ciphertext(&mut self, record: Vec<u8>) {
            if record == b"close" {
                self.closed = true;
            } else {
                self.inp.extend(record);
            }
        }
    }

    fn stack() -> ProtoStack<PlainSession, TestParent> {
        ProtoStack::new(
            TestParent::default(),
            PlainSession::default(),
            StackConfig {
                span: 4,
                retransmit_timeout: Duration::from_secs(1),
                max_ack_list: 8,
            },
            Arc::new(SessionStats::new()),
        )
    }

    fn message(id: Id, body: &[u8]) -> TestPacket {
        TestPacket {
            raw: false,
            body: body.to_vec(),
            id: Some(id),
            acks: Vec::new(),
        }
    }

    fn ack_only(acks: Vec<Id>) -> TestPacket {
        TestPacket {
            raw: true,
            body: Vec::new(),
            id: None,
            acks,
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut s = stack();
        assert_eq!(s.state(), StackState::PreHandshake);
        s.start_handshake().unwrap();
        assert_eq!(s.state(), StackState::Established);
        s.invalidate(ErrorKind::ClientHalt);
        assert_eq!(s.state(), StackState::Invalidated);
        assert_eq!(s.parent().invalidated, Some(ErrorKind::ClientHalt));
    }

    #[test]
    fn test_app_data_is_sent_in_window() {
        let mut s = stack();
        s.start_handshake().unwrap();
        for i in 0..6u8 {
            s.app_send(vec![i]);
        }
        let now = Instant::now();
        s.flush(now).unwrap();

        // Span 4: only four messages fit
        let sent = &s.parent().sent;
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(_, kind)| *kind == NetSendType::Ssl));
        assert_eq!(sent[0].0.id, Some(0));
        assert_eq!(s.in_flight(), 4);
        assert_eq!(s.next_retransmit(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_ciphertext_waits_for_handshake() {
        let mut s = stack();
        assert!(s.net_recv(message(0, b"early")).unwrap());
        assert!(s.parent().app.is_empty());
        assert_eq!(s.pending_acks(), 1);

        s.start_handshake().unwrap();
        assert_eq!(s.parent().app, vec![b"early".to_vec()]);
    }

    #[test]
    fn test_net_recv_reports_window_acceptance() {
        let mut s = stack();

        // Span 4 from id 0: id 100 is far ahead
        assert!(!s.net_recv(message(100, b"far")).unwrap());
        assert_eq!(s.pending_acks(), 0);

        assert!(!s.net_recv(ack_only(vec![7])).unwrap());

        assert!(s.net_recv(message(1, b"b")).unwrap());
        // Still buffered behind id 0, so this is a duplicate
        assert!(!s.net_recv(message(1, b"b")).unwrap());
        assert_eq!(s.pending_acks(), 2);
        assert!(!s.invalidated());
    }

    #[test]
    fn test_raw_delivered_in_order() {
        let mut s = stack();
        let mut second = message(1, b"b");
        second.raw = true;
        let mut first = message(0, b"a");
        first.raw = true;

        s.net_recv(second).unwrap();
        assert!(s.parent().raw.is_empty());
        s.net_recv(first).unwrap();
        let bodies: Vec<_> = s.parent().raw.iter().map(|p| p.body.clone()).collect();
        assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_decapsulate_error_not_fatal() {
        let mut s = stack();
        assert!(!s.net_recv(message(0, b"garbage")).unwrap());
        assert!(!s.invalidated());
        assert_eq!(s.stats().error_count(ErrorKind::HmacError), 1);
    }

    #[test]
    fn test_flush_suppressed_during_upward_pass() {
        let mut s = stack();
        s.start_handshake().unwrap();
        s.app_send(b"x".to_vec());
        let now = Instant::now();
        s.with_reentry(|s| s.flush(now)).unwrap();
        assert!(s.parent().sent.is_empty());
        s.flush(now).unwrap();
        assert_eq!(s.parent().sent.len(), 1);
    }

    #[test]
    fn test_encapsulation_failure_invalidates() {
        let mut s = stack();
        s.parent_mut().fail_encapsulate = true;
        s.raw_send(message(0, b"reset"));
        let err = s.flush(Instant::now()).unwrap_err();
        assert!(matches!(err, StackError::Encapsulation(_)));
        assert_eq!(s.invalidation_reason(), Some(ErrorKind::EncapsulationError));
        assert_eq!(s.stats().error_count(ErrorKind::EncapsulationError), 1);
        assert_eq!(s.next_retransmit(), None);
    }

    #[test]
    fn test_peer_close_notify_halts() {
        let mut s = stack();
        s.start_handshake().unwrap();
        let err = s.net_recv(message(0, b"close")).unwrap_err();
        assert_eq!(err, StackError::PeerClosed);
        assert_eq!(s.invalidation_reason(), Some(ErrorKind::ClientHalt));
        assert_eq!(s.stats().error_count(ErrorKind::SslError), 1);

        // Inputs are ignored from now on
        s.app_send(b"late".to_vec());
        s.flush(Instant::now()).unwrap();
        assert!(s.parent().sent.is_empty());
        assert!(!s.net_recv(message(1, b"more")).unwrap());
    }

    #[test]
    fn test_empty_read_passed_up() {
        let mut s = stack();
        s.start_handshake().unwrap();
        s.session_mut().empty_read = true;

        s.net_recv(ack_only(Vec::new())).unwrap();
        assert_eq!(s.parent().app, vec![Vec::<u8>::new()]);
        assert!(!s.invalidated());
    }

    #[test]
    fn test_pending_acks_drained() {
        let mut s = stack();
        for id in 0..3 {
            s.net_recv(message(id, b"m")).unwrap();
        }
        assert_eq!(s.pending_acks(), 3);
        s.send_pending_acks().unwrap();
        assert_eq!(s.pending_acks(), 0);
        let (ack, kind) = &s.parent().sent[0];
        assert_eq!(*kind, NetSendType::Ack);
        assert_eq!(ack.acks, vec![0, 1, 2]);
    }

    #[test]
    fn test_retransmit_due_messages() {
        let mut s = stack();
        s.start_handshake().unwrap();
        s.app_send(b"hi".to_vec());
        let t0 = Instant::now();
        s.flush(t0).unwrap();

        s.retransmit(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(s.parent().sent.len(), 1);

        // Peer messages arriving in between leave ACKs to piggy-back
        s.net_recv(message(0, b"a")).unwrap();
        s.net_recv(message(1, b"b")).unwrap();
        assert_eq!(s.pending_acks(), 2);

        let t1 = t0 + Duration::from_secs(1);
        s.retransmit(t1).unwrap();
        let sent = &s.parent().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1, NetSendType::Retransmit);
        assert_eq!(sent[1].0.id, sent[0].0.id);
        assert_eq!(sent[1].0.body, sent[0].0.body);
        assert!(sent[0].0.acks.is_empty());
        assert_eq!(sent[1].0.acks, vec![0, 1]);
        assert_eq!(s.pending_acks(), 0);
        assert_eq!(s.next_retransmit(), Some(t1 + Duration::from_secs(1)));
    }

    #[test]
    fn test_retransmit_idle_before_deadline() {
        let mut s = stack();
        s.start_handshake().unwrap();
        s.app_send(b"hi".to_vec());
        let t0 = Instant::now();
        s.flush(t0).unwrap();
        let deadline = t0 + Duration::from_secs(1);

        s.net_recv(ack_only(vec![0])).unwrap();
        assert_eq!(s.in_flight(), 0);

        // Nothing is rescheduled until the deadline is reached
        s.retransmit(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(s.next_retransmit(), Some(deadline));

        s.retransmit(deadline).unwrap();
        assert_eq!(s.parent().sent.len(), 1);
        assert_eq!(s.next_retransmit(), None);
    }

    #[test]
    fn test_ack_releases_window() {
        let mut s = stack();
        s.start_handshake().unwrap();
        s.app_send(b"hi".to_vec());
        s.flush(Instant::now()).unwrap();
        assert_eq!(s.in_flight(), 1);

        assert!(!s.net_recv(ack_only(vec![0])).unwrap());
        assert_eq!(s.in_flight(), 0);
    }
}
