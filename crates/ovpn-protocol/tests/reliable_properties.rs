//! Property tests for the reliability windows and the replay window

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ovpn_protocol::reliable::{RecvOutcome, ReliableRecv, ReliableSend};
use ovpn_protocol::{PacketId, PacketIdForm, PacketIdReceive, ReplayConfig, SessionStats};
use proptest::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(2);

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 512,
        ..ProptestConfig::default()
    }
}

fn arb_permutation(max_len: u32) -> impl Strategy<Value = Vec<u32>> {
    (1..=max_len).prop_flat_map(|n| Just((0..n).collect::<Vec<u32>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(config())]

    /// Never more than `span` messages in flight
    #[test]
    fn send_window_capacity(span in 1u32..32, start in any::<u32>()) {
        let now = Instant::now();
        let mut send: ReliableSend<()> = ReliableSend::with_start_id(span, start);

        for _ in 0..span {
            prop_assert!(send.ready());
            send.send(now, TIMEOUT);
        }
        prop_assert!(!send.ready());
        prop_assert_eq!(send.in_flight(), span as usize);

        send.ack(start);
        prop_assert!(send.ready());
    }

    /// Capacity comes back only once the head is acknowledged
    #[test]
    fn send_window_fifo_release(offsets in arb_permutation(16), start in any::<u32>()) {
        let now = Instant::now();
        let span = offsets.len() as u32;
        let mut send: ReliableSend<()> = ReliableSend::with_start_id(span, start);
        for _ in 0..span {
            send.send(now, TIMEOUT);
        }

        for &offset in offsets.iter().filter(|&&o| o != 0) {
            prop_assert!(send.ack(start.wrapping_add(offset)));
            prop_assert!(!send.ready());
            prop_assert_eq!(send.head_id(), start);
        }

        prop_assert!(send.ack(start));
        prop_assert_eq!(send.head_id(), start.wrapping_add(span));
        prop_assert_eq!(send.in_flight(), 0);
    }

    /// Whatever the arrival order, delivery is in id order
    #[test]
    fn recv_in_order_for_any_permutation(offsets in arb_permutation(24), start in any::<u32>()) {
        let span = offsets.len() as u32;
        let mut recv = ReliableRecv::with_start_id(span, start);
        let mut delivered = Vec::new();

        for &offset in &offsets {
            let id = start.wrapping_add(offset);
            prop_assert_eq!(recv.receive(id, id), RecvOutcome::Accepted);
            while recv.ready() {
                delivered.push(recv.next_sequenced().packet);
                recv.advance();
            }
        }

        let expected: Vec<u32> = (0..span).map(|o| start.wrapping_add(o)).collect();
        prop_assert_eq!(delivered, expected);
    }

    /// Repeated ids are delivered once, first copy wins
    #[test]
    fn recv_duplicates_idempotent(arrivals in prop::collection::vec(0u32..8, 1..64)) {
        let mut recv = ReliableRecv::new(8);
        let mut first_copy = std::collections::HashMap::new();
        let mut delivered = Vec::new();

        for (copy, &id) in arrivals.iter().enumerate() {
            let outcome = recv.receive((id, copy), id);
            prop_assert!(outcome.should_ack());
            if outcome == RecvOutcome::Accepted {
                first_copy.insert(id, copy);
            }
            while recv.ready() {
                delivered.push(recv.next_sequenced().packet);
                recv.advance();
            }
        }

        let ids: Vec<u32> = delivered.iter().map(|&(id, _)| id).collect();
        let expected: Vec<u32> = (0..ids.len() as u32).collect();
        prop_assert_eq!(&ids, &expected);
        for (id, copy) in delivered {
            prop_assert_eq!(first_copy[&id], copy);
        }
    }

    /// A packet id is accepted at most once
    #[test]
    fn replay_accepts_each_id_once(ids in prop::collection::vec(1u32..600, 1..400)) {
        let stats = Arc::new(SessionStats::new());
        let mut recv = PacketIdReceive::new(
            PacketIdForm::Long,
            "prop",
            0,
            stats,
            ReplayConfig::default(),
        );
        let mut accepted = HashSet::new();

        for id in ids {
            if recv.test_add(&PacketId::new(1, id), 0, true) {
                prop_assert!(accepted.insert(id), "id {} accepted twice", id);
            }
        }
    }
}
