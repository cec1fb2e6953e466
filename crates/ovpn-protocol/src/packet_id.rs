//! # Packet IDs
//!
//! Per-packet identifiers used to detect replayed or stale packets.
//!
//! A short packet id is a 32-bit sequence number. A long packet id adds a
//! 32-bit time stamp (seconds since the epoch, truncated), which lets the
//! sender start a new epoch instead of failing when the counter wraps.
//!
//! ```text
//! short:  ┌──────────────┐
//!         │ id (4, BE)   │
//!         └──────────────┘
//! long:   ┌──────────────┬──────────────┐
//!         │ id (4, BE)   │ time (4, BE) │
//!         └──────────────┴──────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::constants::{LONG_PACKET_ID_SIZE, PACKET_ID_WRAP_WARNING, SHORT_PACKET_ID_SIZE};
use crate::error::{ProtocolError, ReplayError};
use crate::replay::{ReplayConfig, ReplayWindow};
use crate::stats::SessionStats;

/// Wire form of a packet id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketIdForm {
    /// 4 bytes, id only
    #[default]
    Short,
    /// 8 bytes, id followed by time
    Long,
}

impl PacketIdForm {
    /// Encoded size in bytes
    #[inline]
    pub fn size(self) -> usize {
        match self {
            PacketIdForm::Short => SHORT_PACKET_ID_SIZE,
            PacketIdForm::Long => LONG_PACKET_ID_SIZE,
        }
    }
}

/// A packet id as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketId {
    /// Legal values are 1 through 2^32-1
    pub id: u32,
    /// Epoch time stamp, zero in short form
    pub time: u64,
}

impl PacketId {
    pub fn new(time: u64, id: u32) -> Self {
        PacketId { id, time }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    pub fn reset(&mut self) {
        self.id = 0;
        self.time = 0;
    }

    /// Read a packet id from the front of `buf`, advancing it
    pub fn read(buf: &mut &[u8], form: PacketIdForm) -> Result<Self, ProtocolError> {
        let size = form.size();
        if buf.len() < size {
            return Err(ProtocolError::PacketTooSmall {
                min: size,
                got: buf.len(),
            });
        }

        let id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let time = match form {
            PacketIdForm::Long => u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as u64,
            PacketIdForm::Short => 0,
        };
        *buf = &buf[size..];

        Ok(PacketId { id, time })
    }

    /// Encode into `buf`, either in front of the existing content or after it
    pub fn write(&self, buf: &mut Vec<u8>, form: PacketIdForm, prepend: bool) {
        let mut encoded = [0u8; LONG_PACKET_ID_SIZE];
        encoded[0..4].copy_from_slice(&self.id.to_be_bytes());
        // Only the low 32 bits of the time stamp travel on the wire
        encoded[4..8].copy_from_slice(&(self.time as u32).to_be_bytes());
        let encoded = &encoded[..form.size()];

        if prepend {
            buf.splice(0..0, encoded.iter().copied());
        } else {
            buf.extend_from_slice(encoded);
        }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.time, self.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SEND SIDE
// ═══════════════════════════════════════════════════════════════════════════

/// Generates outgoing packet ids
#[derive(Debug, Clone)]
pub struct PacketIdSend {
    pid: PacketId,
    form: PacketIdForm,
}

impl PacketIdSend {
    pub fn new(form: PacketIdForm) -> Self {
        Self::with_start_id(form, 0)
    }

    /// Start counting after `start_id`; the first id issued is `start_id + 1`
    pub fn with_start_id(form: PacketIdForm, start_id: u32) -> Self {
        PacketIdSend {
            pid: PacketId::new(0, start_id),
            form,
        }
    }

    pub fn form(&self) -> PacketIdForm {
        self.form
    }

    /// Issue the next packet id
    ///
    /// In short form, running past `0xFFFFFFFF` is fatal and the session must
    /// be renegotiated. In long form the time stamp moves to a new epoch and
    /// the id restarts at 1.
    pub fn next(&mut self, now: u64) -> Result<PacketId, ProtocolError> {
        if self.pid.time == 0 {
            self.pid.time = now;
        }
        self.pid.id = self.pid.id.wrapping_add(1);
        if self.pid.id == 0 {
            if self.form != PacketIdForm::Long {
                return Err(ProtocolError::PacketIdWrap);
            }
            // The receiver only resets its window on a strictly newer epoch
            self.pid.time = now.max(self.pid.time + 1);
            self.pid.id = 1;
            log::debug!("packet id wrapped, new epoch {:#x}", self.pid.time);
        }
        Ok(self.pid)
    }

    /// Issue the next id and encode it into `buf`
    pub fn write_next(
        &mut self,
        buf: &mut Vec<u8>,
        prepend: bool,
        now: u64,
    ) -> Result<PacketId, ProtocolError> {
        let pid = self.next(now)?;
        pid.write(buf, self.form, prepend);
        Ok(pid)
    }

    /// True once the id is close enough to wrapping that a new handshake
    /// should be started.
    pub fn wrap_warning(&self) -> bool {
        self.pid.id >= PACKET_ID_WRAP_WARNING
    }
}

impl fmt::Display for PacketIdSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pid)?;
        if self.form == PacketIdForm::Long {
            f.write_str("L")?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECEIVE SIDE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct ReceiveState {
    window: ReplayWindow,
    time_high: u64,
    form: PacketIdForm,
    stats: Arc<SessionStats>,
}

/// Receive-side replay check for packet ids
///
/// Must be initialised with [`init`](Self::init) before use; a window that
/// was never initialised panics instead of accepting traffic.
#[derive(Debug, Default)]
pub struct PacketIdReceive {
    state: Option<ReceiveState>,
    name: String,
    unit: i32,
}

impl PacketIdReceive {
    /// Construct and initialise in one step
    pub fn new(
        form: PacketIdForm,
        name: &str,
        unit: i32,
        stats: Arc<SessionStats>,
        config: ReplayConfig,
    ) -> Self {
        let mut recv = Self::default();
        recv.init(form, name, unit, stats, config);
        recv
    }

    pub fn init(
        &mut self,
        form: PacketIdForm,
        name: &str,
        unit: i32,
        stats: Arc<SessionStats>,
        config: ReplayConfig,
    ) {
        self.name = name.to_string();
        self.unit = unit;
        self.state = Some(ReceiveState {
            window: ReplayWindow::new(config),
            time_high: 0,
            form,
            stats,
        });
    }

    pub fn initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Check `pin`; with `commit` set, also record it as seen.
    ///
    /// Rejections are counted in the session statistics.
    pub fn test_add(&mut self, pin: &PacketId, now: u64, commit: bool) -> bool {
        match self.do_test_add(pin, now, commit) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("{}[{}]: rejected {}: {}", self.name, self.unit, pin, e);
                self.state_mut().stats.error(e.kind());
                false
            }
        }
    }

    pub fn do_test_add(&mut self, pin: &PacketId, now: u64, commit: bool) -> Result<(), ReplayError> {
        let state = self.state_mut();

        state.window.expire_tick(now);

        if !pin.is_valid() {
            return Err(ReplayError::Invalid);
        }

        if pin.time != state.time_high {
            if pin.time < state.time_high {
                return Err(ReplayError::TimeBacktrack);
            }
            // Time moved forward, start a fresh window
            if !commit {
                return Ok(());
            }
            state.window.reset();
            state.time_high = pin.time;
        }

        state.window.test(pin.id as u64, commit)
    }

    /// Read a packet id in this receiver's wire form
    pub fn read_next(&self, buf: &mut &[u8]) -> Result<PacketId, ProtocolError> {
        PacketId::read(buf, self.state().form)
    }

    fn state(&self) -> &ReceiveState {
        match self.state.as_ref() {
            Some(state) => state,
            None => panic!("packet id receiver '{}' used before init", self.name),
        }
    }

    fn state_mut(&mut self) -> &mut ReceiveState {
        match self.state.as_mut() {
            Some(state) => state,
            None => panic!("packet id receiver '{}' used before init", self.name),
        }
    }
}

impl fmt::Display for PacketIdReceive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(s) => write!(
                f,
                "[e={} f={} h={}/{}]",
                s.window.extent(),
                s.window.id_floor(),
                s.time_high,
                s.window.id_high()
            ),
            None => f.write_str("[uninitialized]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ErrorKind;
    use std::time::Duration;

    fn receiver(stats: &Arc<SessionStats>) -> PacketIdReceive {
        PacketIdReceive::new(
            PacketIdForm::Long,
            "test",
            0,
            Arc::clone(stats),
            ReplayConfig::default(),
        )
    }

    #[test]
    fn test_wire_encoding() {
        let pid = PacketId::new(0x0102_0304_0506, 0xAABB_CCDD);

        let mut short = Vec::new();
        pid.write(&mut short, PacketIdForm::Short, false);
        assert_eq!(short, [0xAA, 0xBB, 0xCC, 0xDD]);

        let mut long = vec![0xFF];
        pid.write(&mut long, PacketIdForm::Long, true);
        assert_eq!(long, [0xAA, 0xBB, 0xCC, 0xDD, 0x03, 0x04, 0x05, 0x06, 0xFF]);

        let mut cursor = &long[..];
        let read = PacketId::read(&mut cursor, PacketIdForm::Long).unwrap();
        assert_eq!(read, PacketId::new(0x0304_0506, 0xAABB_CCDD));
        assert_eq!(cursor, [0xFF]);
    }

    #[test]
    fn test_read_short_buffer() {
        let mut cursor: &[u8] = &[0, 0, 1];
        assert!(matches!(
            PacketId::read(&mut cursor, PacketIdForm::Short),
            Err(ProtocolError::PacketTooSmall { min: 4, got: 3 })
        ));
    }

    #[test]
    fn test_send_sequence() {
        let mut send = PacketIdSend::new(PacketIdForm::Long);
        let a = send.next(1000).unwrap();
        let b = send.next(2000).unwrap();
        assert_eq!(a, PacketId::new(1000, 1));
        // Time is latched at the first id of an epoch
        assert_eq!(b, PacketId::new(1000, 2));
        assert_eq!(send.to_string(), "[0x3e8, 0x2]L");
    }

    #[test]
    fn test_short_form_wrap_is_fatal() {
        let mut send = PacketIdSend::with_start_id(PacketIdForm::Short, 0xFFFF_FFFE);
        assert!(!send.wrap_warning());
        assert_eq!(send.next(5).unwrap().id, 0xFFFF_FFFF);
        assert!(send.wrap_warning());
        assert_eq!(send.next(5), Err(ProtocolError::PacketIdWrap));
    }

    #[test]
    fn test_long_form_wrap_starts_new_epoch() {
        let mut send = PacketIdSend::with_start_id(PacketIdForm::Long, 0xFFFF_FFFE);
        assert_eq!(send.next(5).unwrap(), PacketId::new(5, 0xFFFF_FFFF));
        assert_eq!(send.next(9).unwrap(), PacketId::new(9, 1));

        // Same second: epoch still has to advance
        let mut send = PacketIdSend::with_start_id(PacketIdForm::Long, 0xFFFF_FFFE);
        send.next(7).unwrap();
        assert_eq!(send.next(7).unwrap(), PacketId::new(8, 1));
    }

    #[test]
    fn test_write_next() {
        let mut send = PacketIdSend::new(PacketIdForm::Short);
        let mut buf = b"payload".to_vec();
        send.write_next(&mut buf, true, 0).unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        assert_eq!(&buf[4..], b"payload");
    }

    #[test]
    fn test_replay_rejection() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = receiver(&stats);
        let now = 1000;

        for id in 1..=100 {
            assert!(recv.test_add(&PacketId::new(5, id), now, true));
        }

        assert!(!recv.test_add(&PacketId::new(5, 100), now, true));
        assert!(recv.test_add(&PacketId::new(5, 101), now, true));
        assert_eq!(stats.error_count(ErrorKind::PktidReplay), 1);
    }

    #[test]
    fn test_expired_backtrack_rejected() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = receiver(&stats);

        recv.test_add(&PacketId::new(5, 1), 1000, true);
        for id in 2..=49 {
            recv.test_add(&PacketId::new(5, id), 1000, true);
        }
        for id in 51..=100 {
            recv.test_add(&PacketId::new(5, id), 1000, true);
        }

        // Id 50 is a legitimate straggler while the window is fresh
        assert!(recv.test_add(&PacketId::new(5, 50), 1001, false));

        // After the expiry period the floor reaches id_high and 50 is gone
        assert!(!recv.test_add(&PacketId::new(5, 50), 1000 + 31, true));
        assert_eq!(stats.error_count(ErrorKind::PktidExpire), 1);
        assert_eq!(recv.to_string(), "[e=100 f=100 h=5/100]");
    }

    #[test]
    fn test_time_forward_resets_window() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = receiver(&stats);

        for id in 1..=100 {
            recv.test_add(&PacketId::new(5, id), 10, true);
        }

        assert!(recv.test_add(&PacketId::new(6, 1), 10, true));
        assert!(!recv.test_add(&PacketId::new(5, 101), 10, true));
        assert!(!recv.test_add(&PacketId::new(5, 1), 10, true));
        assert_eq!(stats.error_count(ErrorKind::PktidTimeBacktrack), 2);

        assert!(recv.test_add(&PacketId::new(6, 2), 10, true));
    }

    #[test]
    fn test_dry_run_leaves_epoch_alone() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = receiver(&stats);

        recv.test_add(&PacketId::new(5, 1), 10, true);
        assert!(recv.test_add(&PacketId::new(6, 1), 10, false));
        // Epoch 5 is still current because the forward step was not committed
        assert!(recv.test_add(&PacketId::new(5, 2), 10, true));
    }

    #[test]
    fn test_zero_id_invalid() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = receiver(&stats);
        assert!(!recv.test_add(&PacketId::new(1, 0), 10, true));
        assert_eq!(stats.error_count(ErrorKind::PktidInvalid), 1);
    }

    #[test]
    fn test_custom_window_size() {
        let stats = Arc::new(SessionStats::new());
        let mut recv = PacketIdReceive::new(
            PacketIdForm::Short,
            "small",
            1,
            Arc::clone(&stats),
            ReplayConfig {
                window_bytes: 1,
                expire: Duration::from_secs(30),
            },
        );
        assert!(recv.test_add(&PacketId::new(0, 1), 0, true));
        assert!(recv.test_add(&PacketId::new(0, 20), 0, true));
        assert!(!recv.test_add(&PacketId::new(0, 12), 0, true));
        assert!(recv.test_add(&PacketId::new(0, 13), 0, true));
    }

    #[test]
    #[should_panic(expected = "used before init")]
    fn test_uninitialized_panics() {
        let mut recv = PacketIdReceive::default();
        recv.test_add(&PacketId::new(0, 1), 0, true);
    }
}
