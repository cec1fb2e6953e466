//! # Data-Channel Packet IDs
//!
//! Flat packet ids for data-channel packets. The narrow form is a 32-bit
//! counter; the wide form is a 64-bit value whose top 16 bits hold a key
//! epoch and whose low 48 bits are the counter. There is no time stamp, so
//! the receiver never changes epoch on its own.

use std::fmt;
use std::sync::Arc;

use crate::constants::{LONG_PACKET_ID_SIZE, PACKET_ID_WRAP_WARNING, SHORT_PACKET_ID_SIZE};
use crate::error::{ProtocolError, ReplayError};
use crate::replay::{ReplayConfig, ReplayWindow};
use crate::stats::SessionStats;

/// Low 48 bits of a wide id: the counter
pub const EPOCH_PACKET_ID_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Largest counter value in a wide id
pub const EPOCH_PACKET_ID_MAX: u64 = EPOCH_PACKET_ID_MASK;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketIdData {
    pub id: u64,
    pub wide: bool,
}

impl PacketIdData {
    pub fn new(wide: bool, id: u64) -> Self {
        PacketIdData { id, wide }
    }

    #[inline]
    pub fn size(&self) -> usize {
        Self::size_for(self.wide)
    }

    #[inline]
    pub fn size_for(wide: bool) -> usize {
        if wide {
            LONG_PACKET_ID_SIZE
        } else {
            SHORT_PACKET_ID_SIZE
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    pub fn epoch(&self) -> u16 {
        ((self.id & !EPOCH_PACKET_ID_MASK) >> 48) as u16
    }

    pub fn read(buf: &mut &[u8], wide: bool) -> Result<Self, ProtocolError> {
        let size = Self::size_for(wide);
        if buf.len() < size {
            return Err(ProtocolError::PacketTooSmall {
                min: size,
                got: buf.len(),
            });
        }
        let (head, rest) = buf.split_at(size);
        let id = if wide {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(head);
            u64::from_be_bytes(raw)
        } else {
            u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64
        };
        *buf = rest;
        Ok(PacketIdData { id, wide })
    }

    pub fn write(&self, buf: &mut Vec<u8>, prepend: bool) {
        let wide_bytes;
        let narrow_bytes;
        let encoded: &[u8] = if self.wide {
            wide_bytes = self.id.to_be_bytes();
            &wide_bytes
        } else {
            narrow_bytes = (self.id as u32).to_be_bytes();
            &narrow_bytes
        };

        if prepend {
            buf.splice(0..0, encoded.iter().copied());
        } else {
            buf.extend_from_slice(encoded);
        }
    }
}

impl fmt::Display for PacketIdData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}]", self.id)
    }
}

/// Generates data-channel packet ids
#[derive(Debug, Clone, Default)]
pub struct PacketIdDataSend {
    pid: PacketIdData,
}

impl PacketIdDataSend {
    /// A sender whose counter starts in `epoch` (wide form only)
    pub fn new(wide: bool, epoch: u16) -> Self {
        PacketIdDataSend {
            pid: PacketIdData::new(wide, (epoch as u64) << 48),
        }
    }

    /// Issue the next id. The last value of the counter space is never
    /// issued; reaching it means the key must be replaced.
    pub fn next(&mut self) -> Result<PacketIdData, ProtocolError> {
        self.pid.id = self.pid.id.wrapping_add(1);
        if self.at_limit() {
            return Err(ProtocolError::PacketIdWrap);
        }
        Ok(self.pid)
    }

    pub fn write_next(&mut self, buf: &mut Vec<u8>, prepend: bool) -> Result<PacketIdData, ProtocolError> {
        let pid = self.next()?;
        pid.write(buf, prepend);
        Ok(pid)
    }

    pub fn length(&self) -> usize {
        self.pid.size()
    }

    /// Wide counters cannot realistically be exhausted, so only the narrow
    /// form ever warns.
    pub fn wrap_warning(&self) -> bool {
        !self.pid.wide && self.pid.id >= PACKET_ID_WRAP_WARNING as u64
    }

    pub fn at_limit(&self) -> bool {
        (!self.pid.wide && self.pid.id == u32::MAX as u64)
            || (self.pid.id & EPOCH_PACKET_ID_MASK) == EPOCH_PACKET_ID_MAX
    }
}

impl fmt::Display for PacketIdDataSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pid)?;
        if self.pid.wide {
            f.write_str("L")?;
        }
        Ok(())
    }
}

/// Receive-side replay check for data-channel ids
#[derive(Debug)]
pub struct PacketIdDataReceive {
    window: ReplayWindow,
    wide: bool,
    name: String,
    unit: i32,
    stats: Arc<SessionStats>,
}

impl PacketIdDataReceive {
    pub fn new(wide: bool, name: &str, unit: i32, stats: Arc<SessionStats>, config: ReplayConfig) -> Self {
        PacketIdDataReceive {
            window: ReplayWindow::new(config),
            wide,
            name: name.to_string(),
            unit,
            stats,
        }
    }

    pub fn test_add(&mut self, pin: &PacketIdData, now: u64) -> bool {
        match self.do_test_add(pin, now) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("{}[{}]: rejected {}: {}", self.name, self.unit, pin, e);
                self.stats.error(e.kind());
                false
            }
        }
    }

    pub fn do_test_add(&mut self, pin: &PacketIdData, now: u64) -> Result<(), ReplayError> {
        self.window.expire_tick(now);
        self.window.test(pin.id, true)
    }

    pub fn read_next(&self, buf: &mut &[u8]) -> Result<PacketIdData, ProtocolError> {
        PacketIdData::read(buf, self.wide)
    }

    pub fn length(&self) -> usize {
        PacketIdData::size_for(self.wide)
    }
}

impl fmt::Display for PacketIdDataReceive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[e={} f={} h={}]",
            self.window.extent(),
            self.window.id_floor(),
            self.window.id_high()
        )
    }
}
