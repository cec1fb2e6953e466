//! # Common Configuration Types
//!
//! Sections shared by every config file, serde defaults and errors.

use serde::Deserialize;
use std::fmt;

/// Cipher protecting secure-session records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CipherSuite::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            CipherSuite::Aes256Gcm => "AES-256-GCM",
        })
    }
}

/// Secure session configuration
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub cipher: CipherSuite,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    /// Largest cleartext chunk accepted by a single session write
    #[serde(default = "default_max_fragment")]
    pub max_fragment: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        SessionSection {
            cipher: CipherSuite::default(),
            key: None,
            key_file: None,
            max_fragment: default_max_fragment(),
        }
    }
}

/// `[logging]`: default filter and optional log file
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            level: default_log_level(),
            file: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT VALUES
// ═══════════════════════════════════════════════════════════════════════════

pub fn default_span() -> u32 {
    ovpn_protocol::DEFAULT_SPAN
}
pub fn default_retransmit_timeout_ms() -> u64 {
    ovpn_protocol::DEFAULT_RETRANSMIT_TIMEOUT_MS
}
pub fn default_max_ack_list() -> usize {
    ovpn_protocol::DEFAULT_MAX_ACK_LIST
}
pub fn default_window_bytes() -> usize {
    ovpn_protocol::DEFAULT_REPLAY_WINDOW_BYTES
}
pub fn default_expire_secs() -> u64 {
    ovpn_protocol::DEFAULT_REPLAY_EXPIRE_SECS
}
pub fn default_long_form() -> bool {
    true
}
pub fn default_max_fragment() -> usize {
    1024
}
pub fn default_log_level() -> String {
    "info".to_string()
}
pub fn default_messages() -> usize {
    32
}
pub fn default_loss_rate() -> f64 {
    0.1
}
pub fn default_reorder_rate() -> f64 {
    0.1
}
pub fn default_seed() -> u64 {
    1
}
pub fn default_max_ticks() -> u64 {
    10_000
}
pub fn default_tick_ms() -> u64 {
    100
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue { field: &'static str, reason: String },
    InvalidKey(String),
    MissingKey,
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "parse error: {}", e),
            ConfigError::InvalidValue { field, reason } => write!(f, "{}: {}", field, reason),
            ConfigError::InvalidKey(e) => write!(f, "invalid key: {}", e),
            ConfigError::MissingKey => {
                write!(f, "no session key (set session.key, session.key_file or OVPN_KEY)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ovpn_protocol::VpnError {
    fn from(e: ConfigError) -> Self {
        ovpn_protocol::VpnError::Config(e.to_string())
    }
}
