//! # Configuration
//!
//! `ovpn.toml` is split into `[reliability]`, `[replay]`, `[session]`,
//! `[logging]` and `[simulation]`. Every field has a default, so an empty
//! file is a valid config.

mod common;
mod key;
mod proto;

pub use common::{CipherSuite, ConfigError, LoggingSection, SessionSection};
pub use key::{hex_to_key, key_to_hex, KeySource, KEY_ENV_VAR};
pub use proto::{
    example_config, ProtoConfig, ReliabilitySection, ReplaySection, SimulationSection,
};
