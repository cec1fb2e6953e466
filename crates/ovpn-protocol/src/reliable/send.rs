//! Send side of the reliability layer.
//!
//! Every outgoing control message takes the next id and stays in the window
//! until the peer acknowledges it. Capacity is only released from the head,
//! so an ACK for a later message frees nothing while an earlier one is still
//! outstanding.

use std::time::{Duration, Instant};

use super::window::MessageWindow;
use super::Id;

/// An in-flight message
#[derive(Debug, Clone)]
pub struct SendMessage<P> {
    id: Id,
    /// Stored unencapsulated so each retransmission can be framed afresh
    pub packet: Option<P>,
    retransmit_at: Instant,
    retries: u32,
}

impl<P> SendMessage<P> {
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retransmit_at(&self) -> Instant {
        self.retransmit_at
    }

    #[inline]
    pub fn ready_retransmit(&self, now: Instant) -> bool {
        now >= self.retransmit_at
    }

    pub fn until_retransmit(&self, now: Instant) -> Duration {
        self.retransmit_at.saturating_duration_since(now)
    }

    /// Reschedule after a retransmission
    pub fn reset_retransmit(&mut self, now: Instant, timeout: Duration) {
        self.retransmit_at = now + timeout;
        self.retries += 1;
    }
}

#[derive(Debug, Clone)]
pub struct ReliableSend<P> {
    window: MessageWindow<SendMessage<P>>,
    next: Id,
}

impl<P> ReliableSend<P> {
    pub fn new(span: Id) -> Self {
        Self::with_start_id(span, 0)
    }

    pub fn with_start_id(span: Id, start_id: Id) -> Self {
        ReliableSend {
            window: MessageWindow::new(span, start_id),
            next: start_id,
        }
    }

    /// Room for another message
    #[inline]
    pub fn ready(&self) -> bool {
        self.window.in_window(self.next)
    }

    /// Allocate the next id and schedule its first retransmission.
    ///
    /// Panics if the window is full; check [`ready`](Self::ready) first.
    pub fn send(&mut self, now: Instant, timeout: Duration) -> &mut SendMessage<P> {
        assert!(self.ready(), "reliable send window is full");
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        self.window.insert(
            id,
            SendMessage {
                id,
                packet: None,
                retransmit_at: now + timeout,
                retries: 0,
            },
        )
    }

    /// Peer acknowledged `id`. Returns true if it was still in flight.
    pub fn ack(&mut self, id: Id) -> bool {
        let released = self.window.rm_by_id(id).is_some();
        if released {
            log::trace!("reliable: acked {}, head now {}", id, self.window.head_id());
        }
        released
    }

    #[inline]
    pub fn head_id(&self) -> Id {
        self.window.head_id()
    }

    #[inline]
    pub fn tail_id(&self) -> Id {
        self.window.tail_id()
    }

    pub fn span(&self) -> Id {
        self.window.span()
    }

    pub fn ref_by_id(&mut self, id: Id) -> Option<&mut SendMessage<P>> {
        self.window.get_mut(id)
    }

    /// Time until the earliest retransmission is due, `None` if nothing is
    /// in flight.
    pub fn until_retransmit(&self, now: Instant) -> Option<Duration> {
        self.window.iter().map(|m| m.until_retransmit(now)).min()
    }

    /// Unacknowledged messages
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SendMessage<P>> {
        self.window.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SendMessage<P>> {
        self.window.iter_mut()
    }
}
