//! Receive side of the reliability layer: buffers out-of-order messages and
//! releases them strictly in id order.

use super::window::MessageWindow;
use super::Id;

#[derive(Debug, Clone)]
pub struct RecvMessage<P> {
    pub id: Id,
    pub packet: P,
}

/// Result of offering a message to the receive window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Stored for in-order delivery
    Accepted,
    /// Already buffered; the first copy is kept
    Duplicate,
    /// Delivered earlier; the peer missed our ACK
    AlreadyDelivered,
    /// Too far ahead (or garbage); dropped without acknowledgement
    OutOfWindow,
}

impl RecvOutcome {
    /// Whether the id must be acknowledged to the sender
    pub fn should_ack(self) -> bool {
        !matches!(self, RecvOutcome::OutOfWindow)
    }
}

#[derive(Debug, Clone)]
pub struct ReliableRecv<P> {
    window: MessageWindow<RecvMessage<P>>,
}

impl<P> ReliableRecv<P> {
    pub fn new(span: Id) -> Self {
        Self::with_start_id(span, 0)
    }

    pub fn with_start_id(span: Id, start_id: Id) -> Self {
        ReliableRecv {
            window: MessageWindow::new(span, start_id),
        }
    }

    pub fn receive(&mut self, packet: P, id: Id) -> RecvOutcome {
        if self.window.in_window(id) {
            if self.window.ref_by_id(id).is_some() {
                return RecvOutcome::Duplicate;
            }
            self.window.insert(id, RecvMessage { id, packet });
            RecvOutcome::Accepted
        } else if self.window.pre_window(id) {
            RecvOutcome::AlreadyDelivered
        } else {
            log::debug!(
                "reliable: message {} outside receive window [{}, +{})",
                id,
                self.window.head_id(),
                self.window.span()
            );
            RecvOutcome::OutOfWindow
        }
    }

    /// Next in-order message is available
    #[inline]
    pub fn ready(&self) -> bool {
        self.window.head_defined()
    }

    /// The next in-order message, left in place.
    ///
    /// Panics unless [`ready`](Self::ready) is true.
    pub fn next_sequenced(&mut self) -> &mut RecvMessage<P> {
        match self.window.ref_head() {
            Some(m) => m,
            None => panic!("next_sequenced called with no message ready"),
        }
    }

    /// Release the head message and move the window forward by one
    pub fn advance(&mut self) -> Option<RecvMessage<P>> {
        self.window.rm_head_nocheck()
    }

    #[inline]
    pub fn head_id(&self) -> Id {
        self.window.head_id()
    }

    /// Buffered, not yet delivered messages
    pub fn buffered(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(recv: &mut ReliableRecv<char>) -> Vec<char> {
        let mut out = Vec::new();
        while recv.ready() {
            out.push(recv.next_sequenced().packet);
            recv.advance();
        }
        out
    }

    #[test]
    fn test_in_order_delivery() {
        let mut recv = ReliableRecv::new(4);
        assert_eq!(recv.receive('c', 2), RecvOutcome::Accepted);
        assert_eq!(recv.receive('b', 1), RecvOutcome::Accepted);
        assert!(!recv.ready());
        assert!(drain(&mut recv).is_empty());

        assert_eq!(recv.receive('a', 0), RecvOutcome::Accepted);
        assert_eq!(drain(&mut recv), vec!['a', 'b', 'c']);
        assert_eq!(recv.head_id(), 3);
    }

    #[test]
    fn test_duplicate_keeps_first_copy() {
        let mut recv = ReliableRecv::new(4);
        assert_eq!(recv.receive('x', 1), RecvOutcome::Accepted);
        assert_eq!(recv.receive('y', 1), RecvOutcome::Duplicate);
        assert!(RecvOutcome::Duplicate.should_ack());
        recv.receive('w', 0);
        assert_eq!(drain(&mut recv), vec!['w', 'x']);
    }

    #[test]
    fn test_already_delivered_is_acked() {
        let mut recv = ReliableRecv::new(4);
        recv.receive('a', 0);
        drain(&mut recv);

        let outcome = recv.receive('a', 0);
        assert_eq!(outcome, RecvOutcome::AlreadyDelivered);
        assert!(outcome.should_ack());
        assert_eq!(recv.buffered(), 0);
    }

    #[test]
    fn test_out_of_window_dropped() {
        let mut recv = ReliableRecv::new(4);
        let outcome = recv.receive('z', 4);
        assert_eq!(outcome, RecvOutcome::OutOfWindow);
        assert!(!outcome.should_ack());
        assert_eq!(recv.buffered(), 0);
    }

    #[test]
    #[should_panic(expected = "no message ready")]
    fn test_next_sequenced_without_head_panics() {
        let mut recv: ReliableRecv<char> = ReliableRecv::new(4);
        recv.receive('b', 1);
        recv.next_sequenced();
    }
}
