//! # Session Statistics
//!
//! Error and traffic counters shared between sessions. Every counter is an
//! atomic, so several engines running on different threads can hold the
//! same `Arc<SessionStats>` and increment it concurrently.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Error categories tallied by [`SessionStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ErrorKind {
    SslError = 0,
    EncapsulationError,
    DecapsulationError,
    HmacError,
    BufferError,
    SessionMismatch,
    PktidInvalid,
    PktidTimeBacktrack,
    PktidBacktrack,
    PktidExpire,
    PktidReplay,
    PktidWrap,
    ClientHalt,
    KeyExpansionError,
}

impl ErrorKind {
    pub const COUNT: usize = 14;

    pub const ALL: [ErrorKind; Self::COUNT] = [
        ErrorKind::SslError,
        ErrorKind::EncapsulationError,
        ErrorKind::DecapsulationError,
        ErrorKind::HmacError,
        ErrorKind::BufferError,
        ErrorKind::SessionMismatch,
        ErrorKind::PktidInvalid,
        ErrorKind::PktidTimeBacktrack,
        ErrorKind::PktidBacktrack,
        ErrorKind::PktidExpire,
        ErrorKind::PktidReplay,
        ErrorKind::PktidWrap,
        ErrorKind::ClientHalt,
        ErrorKind::KeyExpansionError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::SslError => "SSL_ERROR",
            ErrorKind::EncapsulationError => "ENCAPSULATION_ERROR",
            ErrorKind::DecapsulationError => "DECAPSULATION_ERROR",
            ErrorKind::HmacError => "HMAC_ERROR",
            ErrorKind::BufferError => "BUFFER_ERROR",
            ErrorKind::SessionMismatch => "SESSION_MISMATCH",
            ErrorKind::PktidInvalid => "PKTID_INVALID",
            ErrorKind::PktidTimeBacktrack => "PKTID_TIME_BACKTRACK",
            ErrorKind::PktidBacktrack => "PKTID_BACKTRACK",
            ErrorKind::PktidExpire => "PKTID_EXPIRE",
            ErrorKind::PktidReplay => "PKTID_REPLAY",
            ErrorKind::PktidWrap => "PKTID_WRAP",
            ErrorKind::ClientHalt => "CLIENT_HALT",
            ErrorKind::KeyExpansionError => "KEY_EXPANSION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Stat {
    BytesIn = 0,
    BytesOut,
    PacketsIn,
    PacketsOut,
}

impl Stat {
    pub const COUNT: usize = 4;

    pub fn name(self) -> &'static str {
        match self {
            Stat::BytesIn => "BYTES_IN",
            Stat::BytesOut => "BYTES_OUT",
            Stat::PacketsIn => "PACKETS_IN",
            Stat::PacketsOut => "PACKETS_OUT",
        }
    }
}

/// Per-session (or per-process) error and traffic tallies
#[derive(Debug, Default)]
pub struct SessionStats {
    errors: [AtomicU64; ErrorKind::COUNT],
    stats: [AtomicU64; Stat::COUNT],
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `kind`
    #[inline]
    pub fn error(&self, kind: ErrorKind) {
        self.errors[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors[kind as usize].load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Non-zero error counters, in declaration order
    pub fn errors(&self) -> impl Iterator<Item = (ErrorKind, u64)> + '_ {
        ErrorKind::ALL
            .iter()
            .map(move |&kind| (kind, self.error_count(kind)))
            .filter(|&(_, count)| count > 0)
    }

    #[inline]
    pub fn inc_stat(&self, stat: Stat, value: u64) {
        self.stats[stat as usize].fetch_add(value, Ordering::Relaxed);
    }

    pub fn get_stat(&self, stat: Stat) -> u64 {
        self.stats[stat as usize].load(Ordering::Relaxed)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} {}={} {}={} {}={}",
            Stat::PacketsIn.name(),
            self.get_stat(Stat::PacketsIn),
            Stat::PacketsOut.name(),
            self.get_stat(Stat::PacketsOut),
            Stat::BytesIn.name(),
            self.get_stat(Stat::BytesIn),
            Stat::BytesOut.name(),
            self.get_stat(Stat::BytesOut),
        )?;
        for (kind, count) in self.errors() {
            write!(f, " {}={}", kind, count)?;
        }
        Ok(())
    }
}
