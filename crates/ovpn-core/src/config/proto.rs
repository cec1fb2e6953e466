//! # Protocol Configuration
//!
//! Tunables for the reliability layer, the replay windows, the secure
//! session and the built-in simulator.

use super::common::*;
use crate::session::RECORD_OVERHEAD;
use ovpn_protocol::{PacketIdForm, ReplayConfig, CONTROL_OVERHEAD, MAX_PACKET_SIZE};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Debug, Default, Deserialize)]
pub struct ProtoConfig {
    #[serde(default)]
    pub reliability: ReliabilitySection,
    #[serde(default)]
    pub replay: ReplaySection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub simulation: SimulationSection,
}

#[derive(Debug, Deserialize)]
pub struct ReliabilitySection {
    #[serde(default = "default_span")]
    pub span: u32,
    #[serde(default = "default_retransmit_timeout_ms")]
    pub retransmit_timeout_ms: u64,
    #[serde(default = "default_max_ack_list")]
    pub max_ack_list: usize,
}

impl Default for ReliabilitySection {
    fn default() -> Self {
        ReliabilitySection {
            span: default_span(),
            retransmit_timeout_ms: default_retransmit_timeout_ms(),
            max_ack_list: default_max_ack_list(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplaySection {
    #[serde(default = "default_window_bytes")]
    pub window_bytes: usize,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
    /// Long-form (time stamped) packet ids
    #[serde(default = "default_long_form")]
    pub long_form: bool,
}

impl Default for ReplaySection {
    fn default() -> Self {
        ReplaySection {
            window_bytes: default_window_bytes(),
            expire_secs: default_expire_secs(),
            long_form: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulationSection {
    #[serde(default = "default_messages")]
    pub messages: usize,
    #[serde(default = "default_loss_rate")]
    pub loss_rate: f64,
    #[serde(default = "default_reorder_rate")]
    pub reorder_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        SimulationSection {
            messages: default_messages(),
            loss_rate: default_loss_rate(),
            reorder_rate: default_reorder_rate(),
            seed: default_seed(),
            max_ticks: default_max_ticks(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl ProtoConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reliability;
        if r.span == 0 {
            return Err(ConfigError::invalid("reliability.span", "must be at least 1"));
        }
        if r.span > u32::MAX / 2 {
            return Err(ConfigError::invalid(
                "reliability.span",
                format!("{} exceeds half the id space", r.span),
            ));
        }
        if r.retransmit_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "reliability.retransmit_timeout_ms",
                "must be positive",
            ));
        }
        if r.max_ack_list == 0 {
            return Err(ConfigError::invalid("reliability.max_ack_list", "must be at least 1"));
        }

        if !self.replay.window_bytes.is_power_of_two() {
            return Err(ConfigError::invalid(
                "replay.window_bytes",
                format!("{} is not a power of two", self.replay.window_bytes),
            ));
        }

        if self.session.max_fragment == 0 {
            return Err(ConfigError::invalid("session.max_fragment", "must be positive"));
        }
        if self.session.max_fragment > Self::max_fragment_limit() {
            return Err(ConfigError::invalid(
                "session.max_fragment",
                format!(
                    "{} does not fit a {}-byte control packet (at most {})",
                    self.session.max_fragment,
                    MAX_PACKET_SIZE,
                    Self::max_fragment_limit()
                ),
            ));
        }

        let sim = &self.simulation;
        for (field, p) in [
            ("simulation.loss_rate", sim.loss_rate),
            ("simulation.reorder_rate", sim.reorder_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::invalid(field, format!("{} outside [0, 1]", p)));
            }
        }
        if sim.tick_ms == 0 {
            return Err(ConfigError::invalid("simulation.tick_ms", "must be positive"));
        }

        Ok(())
    }

    /// Largest `session.max_fragment` whose records always fit a control packet
    pub const fn max_fragment_limit() -> usize {
        MAX_PACKET_SIZE - CONTROL_OVERHEAD - RECORD_OVERHEAD
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.reliability.retransmit_timeout_ms)
    }

    pub fn replay_config(&self) -> ReplayConfig {
        ReplayConfig {
            window_bytes: self.replay.window_bytes,
            expire: Duration::from_secs(self.replay.expire_secs),
        }
    }

    pub fn packet_id_form(&self) -> PacketIdForm {
        if self.replay.long_form {
            PacketIdForm::Long
        } else {
            PacketIdForm::Short
        }
    }

    pub fn key(&self) -> Result<Zeroizing<[u8; 32]>, ConfigError> {
        self.session.key()
    }
}

/// Generate example protocol config
pub fn example_config() -> &'static str {
    r#"# ovpn protocol configuration
# Usage: ovpn check -c ovpn.toml
#        ovpn simulate -c ovpn.toml

# ─────────────────────────────────────────────────────────────────────────────
# Reliability Layer
# ─────────────────────────────────────────────────────────────────────────────
[reliability]
span = 8
retransmit_timeout_ms = 2000
max_ack_list = 16

# ─────────────────────────────────────────────────────────────────────────────
# Replay Protection
# ─────────────────────────────────────────────────────────────────────────────
[replay]
window_bytes = 256
expire_secs = 30
long_form = true

# ─────────────────────────────────────────────────────────────────────────────
# Secure Session
# ─────────────────────────────────────────────────────────────────────────────
[session]
cipher = "chacha20-poly1305"
# key = "64 HEX CHARS"
# key_file = "/etc/ovpn/session.key"
max_fragment = 1024

[logging]
level = "info"

# ─────────────────────────────────────────────────────────────────────────────
# Simulator
# ─────────────────────────────────────────────────────────────────────────────
[simulation]
messages = 32
loss_rate = 0.1
reorder_rate = 0.1
seed = 1
max_ticks = 10000
tick_ms = 100
"#
}
