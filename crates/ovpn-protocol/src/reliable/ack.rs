//! Outgoing ACK list.
//!
//! Collects the ids of received control messages until they can be written
//! into an outgoing packet. Ids already sent once are remembered and used to
//! fill spare ACK slots in later packets, so a lost ACK gets repaired without
//! waiting for the peer to retransmit.
//!
//! ```text
//! ┌───────┬───────────┬───────────┬─────┬───────────┐
//! │ count │ id[n-1]   │ id[n-2]   │ ... │ id[0]     │ payload ...
//! │ (1)   │ (4, BE)   │ (4, BE)   │     │ (4, BE)   │
//! └───────┴───────────┴───────────┴─────┴───────────┘
//! ```
//!
//! The list is prepended, so `id[0]`, the first id chosen, ends up closest
//! to the payload.

use std::collections::VecDeque;

use crate::constants::{MAX_ACKS_ACK_ONLY, MAX_ACKS_CONTROL, MESSAGE_ID_SIZE, RE_ACK_MEMORY};
use crate::error::ProtocolError;

use super::Id;

#[derive(Debug, Clone)]
pub struct ReliableAck {
    data: VecDeque<Id>,
    max_ack_list: usize,
    re_acks: VecDeque<Id>,
}

impl ReliableAck {
    /// `max_ack_list` bounds the ids waiting to be sent; when full the
    /// oldest one is dropped and re-ACK memory or a peer retransmission
    /// covers it.
    pub fn new(max_ack_list: usize) -> Self {
        ReliableAck {
            data: VecDeque::with_capacity(max_ack_list),
            max_ack_list: max_ack_list.max(1),
            re_acks: VecDeque::with_capacity(RE_ACK_MEMORY),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push_back(&mut self, id: Id) {
        if self.data.len() >= self.max_ack_list {
            if let Some(dropped) = self.data.pop_front() {
                log::debug!("ack list full, dropping ack for {}", dropped);
            }
        }
        self.data.push_back(id);
    }

    pub fn front(&self) -> Option<Id> {
        self.data.front().copied()
    }

    pub fn pop_front(&mut self) -> Option<Id> {
        self.data.pop_front()
    }

    /// Ids held for re-sending
    pub fn resend_len(&self) -> usize {
        self.re_acks.len()
    }

    /// Write pending ACKs in front of `buf`, at most 4 for a control packet
    /// or 8 for a standalone ACK packet, and return how many were written.
    pub fn prepend(&mut self, buf: &mut Vec<u8>, ack_only: bool) -> usize {
        let max = if ack_only {
            MAX_ACKS_ACK_ONLY
        } else {
            MAX_ACKS_CONTROL
        };

        let mut chosen: Vec<Id> = Vec::with_capacity(max);
        while chosen.len() < max {
            match self.data.pop_front() {
                Some(id) => chosen.push(id),
                None => break,
            }
        }
        let fresh = chosen.len();

        for &id in self.re_acks.iter() {
            if chosen.len() >= max {
                break;
            }
            if !chosen.contains(&id) {
                chosen.push(id);
            }
        }

        for &id in &chosen[..fresh] {
            self.remember(id);
        }

        let mut header = Vec::with_capacity(1 + chosen.len() * MESSAGE_ID_SIZE);
        header.push(chosen.len() as u8);
        for id in chosen.iter().rev() {
            header.extend_from_slice(&id.to_be_bytes());
        }
        buf.splice(0..0, header);

        chosen.len()
    }

    /// Parse an ACK list from the front of `buf`, advancing it
    pub fn read(buf: &mut &[u8]) -> Result<Vec<Id>, ProtocolError> {
        let (&count, rest) = buf.split_first().ok_or(ProtocolError::PacketTooSmall { min: 1, got: 0 })?;
        let count = count as usize;
        if count > MAX_ACKS_ACK_ONLY {
            return Err(ProtocolError::CorruptedPacket(format!("ack count {}", count)));
        }

        let needed = count * MESSAGE_ID_SIZE;
        if rest.len() < needed {
            return Err(ProtocolError::PacketTooSmall {
                min: 1 + needed,
                got: buf.len(),
            });
        }

        let ids = rest[..needed]
            .chunks_exact(MESSAGE_ID_SIZE)
            .map(|c| Id::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        *buf = &rest[needed..];
        Ok(ids)
    }

    fn remember(&mut self, id: Id) {
        self.re_acks.retain(|&x| x != id);
        self.re_acks.push_front(id);
        self.re_acks.truncate(RE_ACK_MEMORY);
    }
}

impl Default for ReliableAck {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_MAX_ACK_LIST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(buf: &[u8]) -> String {
        buf.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_ack_prepend_fills_from_memory() {
        let mut acks = ReliableAck::default();
        for id in [1, 11, 22, 33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0x100] {
            acks.push_back(id);
        }

        let mut control = Vec::new();
        assert_eq!(acks.prepend(&mut control, false), 4);
        assert_eq!(hex(&control), "0400000021000000160000000b00000001");

        let mut ack_only = Vec::new();
        assert_eq!(acks.prepend(&mut ack_only, true), 8);
        assert_eq!(
            hex(&ack_only),
            "080000002100000100000000990000008800000077000000660000005500000044"
        );
        assert!(acks.is_empty());
    }

    #[test]
    fn test_ack_duplicates_collapse() {
        let mut acks = ReliableAck::default();
        for id in 1..=4 {
            acks.push_back(id);
        }
        let mut buf = Vec::new();
        acks.prepend(&mut buf, false);
        assert_eq!(hex(&buf), "0400000004000000030000000200000001");
        assert_eq!(acks.resend_len(), 4);

        acks.push_back(3);
        acks.push_back(6);
        let mut buf = Vec::new();
        acks.prepend(&mut buf, false);
        assert_eq!(hex(&buf), "0400000002000000040000000600000003");
        assert_eq!(acks.resend_len(), 5);

        let mut buf = Vec::new();
        acks.prepend(&mut buf, false);
        assert_eq!(hex(&buf), "0400000002000000040000000300000006");
    }

    #[test]
    fn test_ack_read() {
        let mut acks = ReliableAck::default();
        acks.push_back(7);
        acks.push_back(9);
        let mut buf = b"rest".to_vec();
        acks.prepend(&mut buf, true);

        let mut cursor = &buf[..];
        let ids = ReliableAck::read(&mut cursor).unwrap();
        assert_eq!(ids, vec![9, 7]);
        assert_eq!(cursor, b"rest");
    }

    #[test]
    fn test_ack_read_truncated() {
        let mut cursor: &[u8] = &[2, 0, 0, 0, 1, 0, 0];
        assert!(matches!(
            ReliableAck::read(&mut cursor),
            Err(ProtocolError::PacketTooSmall { min: 9, got: 7 })
        ));
        let mut empty: &[u8] = &[];
        assert!(ReliableAck::read(&mut empty).is_err());
    }

    #[test]
    fn test_ack_list_bounded() {
        let mut acks = ReliableAck::new(2);
        acks.push_back(1);
        acks.push_back(2);
        acks.push_back(3);
        assert_eq!(acks.len(), 2);
        assert_eq!(acks.front(), Some(2));
    }
}
