//! # Replay Protection
//!
//! Sliding bitmask window shared by the packet-id receivers.
//!
//! ```text
//!            extent (bits currently tracked)
//!        ◀────────────────────────────────▶
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//!   │   │ 1 │ 0 │ 1 │ 1 │ 1 │ 0 │ 1 │   │   │  history (circular)
//!   └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//!         ▲ base = id_high          ▲ id_high - extent + 1
//! ```
//!
//! The bit at `base + d` (modulo the window size) records whether
//! `id_high - d` has been accepted. Ids at or below `id_floor` are refused
//! once the expiry deadline has passed without forward progress.

use std::time::Duration;

use crate::error::ReplayError;

/// Replay window sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// History size in bytes, power of two
    pub window_bytes: usize,
    /// Backtrack expiry
    pub expire: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            window_bytes: crate::constants::DEFAULT_REPLAY_WINDOW_BYTES,
            expire: Duration::from_secs(crate::constants::DEFAULT_REPLAY_EXPIRE_SECS),
        }
    }
}

/// Sliding window for replay attack protection
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    history: Box<[u8]>,
    base: usize,
    extent: usize,
    id_high: u64,
    id_floor: u64,
    expire: u64,
    expire_after: u64,
    max_backtrack: u64,
}

impl ReplayWindow {
    /// Create a new replay window
    ///
    /// Panics if `window_bytes` is not a non-zero power of two.
    pub fn new(config: ReplayConfig) -> Self {
        assert!(
            config.window_bytes.is_power_of_two(),
            "replay window size must be a power of two, got {}",
            config.window_bytes
        );
        ReplayWindow {
            history: vec![0u8; config.window_bytes].into_boxed_slice(),
            base: 0,
            extent: 0,
            id_high: 0,
            id_floor: 0,
            expire: 0,
            expire_after: config.expire.as_secs(),
            max_backtrack: 0,
        }
    }

    /// Window size in bits
    #[inline]
    pub fn size(&self) -> usize {
        self.history.len() * 8
    }

    pub fn id_high(&self) -> u64 {
        self.id_high
    }

    pub fn id_floor(&self) -> u64 {
        self.id_floor
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Largest backtrack distance observed so far
    pub fn max_backtrack(&self) -> u64 {
        self.max_backtrack
    }

    /// Forget all accepted ids (new time epoch)
    pub fn reset(&mut self) {
        self.base = 0;
        self.extent = 0;
        self.id_high = 0;
        self.id_floor = 0;
        self.history.fill(0);
    }

    /// Ratchet `id_floor` up to `id_high` if the expiry deadline passed,
    /// then push the deadline out from `now` (seconds).
    pub fn expire_tick(&mut self, now: u64) {
        if now >= self.expire {
            self.id_floor = self.id_high;
        }
        self.expire = now.saturating_add(self.expire_after);
    }

    /// Check `id` against the window, recording it only when `commit` is set
    pub fn test(&mut self, id: u64, commit: bool) -> Result<(), ReplayError> {
        if id == 0 {
            return Err(ReplayError::Invalid);
        }

        let size = self.size();

        if self.id_high.checked_add(1) == Some(id) {
            // Next in sequence
            if !commit {
                return Ok(());
            }
            self.base = self.index(-1);
            self.set_bit(self.base);
            if self.extent < size {
                self.extent += 1;
            }
            self.id_high = id;
        } else if id > self.id_high {
            // Jumped forward by more than one
            if !commit {
                return Ok(());
            }
            let delta = id - self.id_high;
            if delta < size as u64 {
                let delta = delta as usize;
                self.base = self.index(-(delta as isize));
                self.set_bit(self.base);
                self.extent = (self.extent + delta).min(size);
                // Ids skipped over are unseen, not known-missing
                for i in 1..delta {
                    self.clear_bit(self.index(i as isize));
                }
            } else {
                self.base = 0;
                self.extent = size;
                self.history.fill(0);
                self.history[0] = 1;
            }
            self.id_high = id;
        } else {
            // Backtrack
            let delta = self.id_high - id;
            if delta > self.max_backtrack {
                self.max_backtrack = delta;
            }
            if delta >= self.extent as u64 {
                return Err(ReplayError::Backtrack);
            }
            if id <= self.id_floor {
                return Err(ReplayError::Expire);
            }
            let ri = self.index(delta as isize);
            if self.bit(ri) {
                return Err(ReplayError::Replay);
            }
            if !commit {
                return Ok(());
            }
            self.set_bit(ri);
        }

        Ok(())
    }

    #[inline]
    fn index(&self, offset: isize) -> usize {
        self.base.wrapping_add_signed(offset) & (self.size() - 1)
    }

    #[inline]
    fn bit(&self, i: usize) -> bool {
        self.history[i / 8] & (1 << (i % 8)) != 0
    }

    #[inline]
    fn set_bit(&mut self, i: usize) {
        self.history[i / 8] |= 1 << (i % 8);
    }

    #[inline]
    fn clear_bit(&mut self, i: usize) {
        self.history[i / 8] &= !(1 << (i % 8));
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}
