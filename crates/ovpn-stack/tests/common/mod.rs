//! Two-peer harness shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use ovpn_core::config::CipherSuite;
use ovpn_core::crypto::PacketAuth;
use ovpn_core::session::{PskSession, Role};
use ovpn_protocol::{Opcode, ReplayConfig, SessionStats};
use ovpn_stack::{ControlChannel, ControlPacket, ProtoStack, StackConfig, StackError};

pub const PSK: [u8; 32] = [0x42; 32];
pub const TICK: Duration = Duration::from_millis(100);
pub const RETRANSMIT: Duration = Duration::from_millis(300);

/// Op byte, session id, auth tag and long-form packet id
const FIXED_HEADER: usize = 1 + 8 + 16 + 8;

pub type Peer = ProtoStack<PskSession, ControlChannel>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn peer(role: Role, stats: &Arc<SessionStats>) -> Peer {
    peer_with_fragment(role, stats, 64)
}

pub fn peer_with_fragment(role: Role, stats: &Arc<SessionStats>, max_fragment: usize) -> Peer {
    let auth = PacketAuth::from_psk(&PSK).unwrap();
    let mut channel = ControlChannel::new(role, auth, Arc::clone(stats), ReplayConfig::default());
    channel.set_time(1);
    let session = PskSession::new(role, &PSK, CipherSuite::ChaCha20Poly1305, max_fragment);
    let config = StackConfig {
        span: 4,
        retransmit_timeout: RETRANSMIT,
        max_ack_list: 8,
    };
    ProtoStack::new(channel, session, config, Arc::clone(stats))
}

/// Client and server with hard resets queued and handshakes started
pub fn pair() -> (Peer, Peer, Arc<SessionStats>) {
    pair_with_fragment(64)
}

pub fn pair_with_fragment(max_fragment: usize) -> (Peer, Peer, Arc<SessionStats>) {
    init_logging();
    let stats = Arc::new(SessionStats::new());
    let mut client = peer_with_fragment(Role::Client, &stats, max_fragment);
    let mut server = peer_with_fragment(Role::Server, &stats, max_fragment);
    for p in [&mut client, &mut server] {
        let reset = p.parent().hard_reset();
        p.raw_send(reset);
        p.start_handshake().unwrap();
    }
    (client, server, stats)
}

/// Datagrams sent in one round, in order; returns what reaches the peer
pub type Batch = Vec<Vec<u8>>;

pub fn lossless(batch: Batch) -> Batch {
    batch
}

/// Run one round on `from`, then pass its datagrams through `wire` to `to`
pub fn step(
    from: &mut Peer,
    to: &mut Peer,
    now: Instant,
    wire: &mut impl FnMut(Batch) -> Batch,
) -> Result<(), StackError> {
    from.flush(now)?;
    from.retransmit(now)?;
    from.send_pending_acks()?;

    let batch: Batch = std::iter::from_fn(|| from.parent_mut().take_outgoing()).collect();
    for datagram in wire(batch) {
        to.net_recv(ControlPacket::from_wire(datagram).unwrap())?;
    }
    Ok(())
}

/// Alternate rounds until `done` holds or `max_ticks` pass; returns the
/// tick it finished on.
pub fn run(
    client: &mut Peer,
    server: &mut Peer,
    max_ticks: u32,
    wire: &mut impl FnMut(Batch) -> Batch,
    mut done: impl FnMut(&mut Peer, &mut Peer) -> bool,
) -> Result<u32, StackError> {
    let t0 = Instant::now();
    for tick in 0..max_ticks {
        let now = t0 + TICK * tick;
        step(client, server, now, &mut *wire)?;
        step(server, client, now, &mut *wire)?;
        if done(client, server) {
            return Ok(tick);
        }
    }
    Ok(max_ticks)
}

/// Drain application data delivered to `peer`
pub fn received(peer: &mut Peer) -> Vec<Vec<u8>> {
    std::iter::from_fn(|| peer.parent_mut().take_app_data()).collect()
}

/// Message id and payload of an encapsulated control packet, `None` for a
/// standalone ACK.
pub fn parse_message(datagram: &[u8]) -> Option<(u32, Vec<u8>)> {
    if datagram[0] >> 3 == Opcode::AckV1 as u8 {
        return None;
    }
    let mut rest = &datagram[FIXED_HEADER..];
    let acks = rest[0] as usize;
    rest = &rest[1 + 4 * acks..];
    if acks > 0 {
        rest = &rest[8..];
    }
    let id = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    Some((id, rest[4..].to_vec()))
}
