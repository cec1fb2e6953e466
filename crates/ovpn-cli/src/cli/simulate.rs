//! # Simulator
//!
//! Two protocol stacks, a client and a server, connected by an in-memory
//! wire that drops and reorders datagrams. Time is simulated in fixed ticks,
//! so a run is fully determined by its seed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ovpn_core::config::{CipherSuite, ConfigError, ProtoConfig};
use ovpn_core::crypto::PacketAuth;
use ovpn_core::session::{PskSession, Role};
use ovpn_protocol::{Opcode, ReplayConfig, SessionStats};
use ovpn_stack::{
    ControlChannel, ControlPacket, ProtoStack, SendCounters, StackConfig, StackError, StackState,
};

type Peer = ProtoStack<PskSession, ControlChannel>;

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub messages: usize,
    pub loss_rate: f64,
    pub reorder_rate: f64,
    pub seed: u64,
    pub max_ticks: u64,
    pub tick: Duration,
    pub key: [u8; 32],
    pub cipher: CipherSuite,
    pub max_fragment: usize,
    pub stack: StackConfig,
    pub replay: ReplayConfig,
}

impl SimOptions {
    /// Options from a config; a missing key falls back to a fixed one
    pub fn from_config(config: &ProtoConfig) -> Result<Self, ConfigError> {
        let key = match config.key() {
            Ok(key) => *key,
            Err(ConfigError::MissingKey) => {
                log::debug!("no session key configured, using a fixed simulation key");
                [0x5a; 32]
            }
            Err(e) => return Err(e),
        };
        let sim = &config.simulation;

        Ok(SimOptions {
            messages: sim.messages,
            loss_rate: sim.loss_rate,
            reorder_rate: sim.reorder_rate,
            seed: sim.seed,
            max_ticks: sim.max_ticks,
            tick: Duration::from_millis(sim.tick_ms),
            key,
            cipher: config.session.cipher,
            max_fragment: config.session.max_fragment,
            stack: StackConfig::from(config),
            replay: config.replay_config(),
        })
    }
}

/// One direction of the simulated link
struct Wire {
    rng: StdRng,
    loss_rate: f64,
    reorder_rate: f64,
    held: VecDeque<Vec<u8>>,
    dropped: u64,
    reordered: u64,
}

impl Wire {
    fn new(seed: u64, loss_rate: f64, reorder_rate: f64) -> Self {
        Wire {
            rng: StdRng::seed_from_u64(seed),
            loss_rate,
            reorder_rate,
            held: VecDeque::new(),
            dropped: 0,
            reordered: 0,
        }
    }

    /// Datagrams that arrive this tick. A reordered datagram is held back
    /// and delivered after the next tick's traffic.
    fn carry(&mut self, batch: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let late: Vec<Vec<u8>> = self.held.drain(..).collect();
        let mut out = Vec::with_capacity(batch.len() + late.len());

        for datagram in batch {
            if self.rng.gen_bool(self.loss_rate) {
                self.dropped += 1;
            } else if self.rng.gen_bool(self.reorder_rate) {
                self.reordered += 1;
                self.held.push_back(datagram);
            } else {
                out.push(datagram);
            }
        }
        out.extend(late);
        out
    }
}

#[derive(Debug)]
pub struct SimReport {
    pub ticks: u64,
    pub elapsed: Duration,
    pub to_server: Delivery,
    pub to_client: Delivery,
    pub client: PeerReport,
    pub server: PeerReport,
    pub dropped: u64,
    pub reordered: u64,
    pub stats: Arc<SessionStats>,
    pub failure: Option<StackError>,
}

impl SimReport {
    pub fn success(&self) -> bool {
        self.failure.is_none() && self.to_server.complete() && self.to_client.complete()
    }
}

#[derive(Debug, Default)]
pub struct Delivery {
    pub expected: Vec<u8>,
    pub received: Vec<u8>,
}

impl Delivery {
    /// Everything arrived, once, in order
    pub fn complete(&self) -> bool {
        self.received == self.expected
    }
}

#[derive(Debug)]
pub struct PeerReport {
    pub state: StackState,
    pub counters: SendCounters,
}

fn make_peer(role: Role, opts: &SimOptions, stats: &Arc<SessionStats>) -> Result<Peer, ConfigError> {
    let auth = PacketAuth::from_psk(&opts.key).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
    let channel = ControlChannel::new(role, auth, Arc::clone(stats), opts.replay);
    let session = PskSession::new(role, &opts.key, opts.cipher, opts.max_fragment);
    Ok(ProtoStack::new(channel, session, opts.stack, Arc::clone(stats)))
}

fn message(from: &str, i: usize) -> Vec<u8> {
    format!("{} message {}\n", from, i).into_bytes()
}

/// Flush, retransmit and acknowledge on `from`, then carry its datagrams
/// across `wire` into `to`.
fn exchange(from: &mut Peer, to: &mut Peer, wire: &mut Wire, now: Instant) -> Result<(), StackError> {
    from.flush(now)?;
    from.retransmit(now)?;
    from.send_pending_acks()?;

    let batch: Vec<Vec<u8>> = std::iter::from_fn(|| from.parent_mut().take_outgoing()).collect();
    for datagram in wire.carry(batch) {
        match ControlPacket::from_wire(datagram) {
            Ok(packet) => {
                to.net_recv(packet)?;
            }
            Err(e) => log::debug!("undecodable datagram: {}", e),
        }
    }
    Ok(())
}

fn collect(peer: &mut Peer, delivery: &mut Delivery) {
    while let Some(data) = peer.parent_mut().take_app_data() {
        delivery.received.extend(data);
    }
}

/// The server opens its side once the client's hard reset arrives
fn answer_resets(server: &mut Peer) -> Result<(), StackError> {
    while let Some(packet) = server.parent_mut().take_raw() {
        if packet.opcode == Opcode::HardResetClientV2 && !server.ssl_started() {
            log::info!("server: client reset received, starting handshake");
            let reset = server.parent().hard_reset();
            server.raw_send(reset);
            server.start_handshake()?;
        }
    }
    Ok(())
}

pub fn run(opts: &SimOptions) -> Result<SimReport, ConfigError> {
    let stats = Arc::new(SessionStats::new());
    let mut client = make_peer(Role::Client, opts, &stats)?;
    let mut server = make_peer(Role::Server, opts, &stats)?;

    let mut to_server = Delivery::default();
    let mut to_client = Delivery::default();
    for i in 0..opts.messages {
        let m = message("client", i);
        to_server.expected.extend_from_slice(&m);
        client.app_send(m);

        let m = message("server", i);
        to_client.expected.extend_from_slice(&m);
        server.app_send(m);
    }

    let mut uplink = Wire::new(opts.seed, opts.loss_rate, opts.reorder_rate);
    let mut downlink = Wire::new(opts.seed.wrapping_add(1), opts.loss_rate, opts.reorder_rate);

    let t0 = Instant::now();
    let mut ticks = 0;
    let mut failure = None;

    let reset = client.parent().hard_reset();
    client.raw_send(reset);
    let started = client.start_handshake();

    let outcome: Result<(), StackError> = started.and_then(|()| {
        while ticks < opts.max_ticks {
            let elapsed = opts.tick * ticks as u32;
            let now = t0 + elapsed;
            for peer in [&mut client, &mut server] {
                peer.parent_mut().set_time(1 + elapsed.as_secs());
            }

            exchange(&mut client, &mut server, &mut uplink, now)?;
            answer_resets(&mut server)?;
            exchange(&mut server, &mut client, &mut downlink, now)?;

            collect(&mut server, &mut to_server);
            collect(&mut client, &mut to_client);
            ticks += 1;

            if to_server.complete() && to_client.complete() {
                break;
            }
        }
        Ok(())
    });
    if let Err(e) = outcome {
        log::warn!("simulation stopped: {}", e);
        failure = Some(e);
    }

    if ticks >= opts.max_ticks {
        log::warn!("simulation hit the tick limit ({})", opts.max_ticks);
    }

    Ok(SimReport {
        ticks,
        elapsed: opts.tick * ticks as u32,
        to_server,
        to_client,
        client: PeerReport {
            state: client.state(),
            counters: client.parent().counters(),
        },
        server: PeerReport {
            state: server.state(),
            counters: server.parent().counters(),
        },
        dropped: uplink.dropped + downlink.dropped,
        reordered: uplink.reordered + downlink.reordered,
        stats,
        failure,
    })
}
