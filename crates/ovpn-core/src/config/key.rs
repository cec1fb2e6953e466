//! # Session Key Material
//!
//! The pre-shared session key can come from the config file (inline hex or a
//! key file) or from the `OVPN_KEY` environment variable. The first source
//! present wins, in that order.

use std::fmt;
use std::fs;

use zeroize::Zeroizing;

use super::common::{ConfigError, SessionSection};

/// Environment variable consulted when the file names no key
pub const KEY_ENV_VAR: &str = "OVPN_KEY";

/// Where the session key is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(String),
    Inline,
    Env,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::File(path) => write!(f, "key file {}", path),
            KeySource::Inline => write!(f, "inline key"),
            KeySource::Env => write!(f, "${}", KEY_ENV_VAR),
        }
    }
}

impl SessionSection {
    /// The source `key()` would read, if any is available
    pub fn key_source(&self) -> Option<KeySource> {
        if let Some(ref path) = self.key_file {
            Some(KeySource::File(path.clone()))
        } else if self.key.is_some() {
            Some(KeySource::Inline)
        } else if std::env::var_os(KEY_ENV_VAR).is_some() {
            Some(KeySource::Env)
        } else {
            None
        }
    }

    pub fn key(&self) -> Result<Zeroizing<[u8; 32]>, ConfigError> {
        let hex = match self.key_source().ok_or(ConfigError::MissingKey)? {
            KeySource::File(path) => Zeroizing::new(
                fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Io(format!("cannot read key file {}: {}", path, e)))?,
            ),
            KeySource::Inline => Zeroizing::new(self.key.clone().unwrap_or_default()),
            KeySource::Env => Zeroizing::new(std::env::var(KEY_ENV_VAR).map_err(|e| {
                ConfigError::InvalidKey(format!("{}: {}", KEY_ENV_VAR, e))
            })?),
        };
        hex_to_key(&hex)
    }
}

/// Parse 64 hex characters into a 32-byte key
pub fn hex_to_key(hex: &str) -> Result<Zeroizing<[u8; 32]>, ConfigError> {
    let hex = hex.trim().as_bytes();
    if hex.len() != 64 {
        return Err(ConfigError::InvalidKey(format!(
            "expected 64 hex characters, found {}",
            hex.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; 32]);
    for (byte, pair) in key.iter_mut().zip(hex.chunks_exact(2)) {
        let hi = nibble(pair[0])?;
        let lo = nibble(pair[1])?;
        *byte = (hi << 4) | lo;
    }
    Ok(key)
}

fn nibble(c: u8) -> Result<u8, ConfigError> {
    (c as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| ConfigError::InvalidKey(format!("'{}' is not a hex digit", c as char)))
}

pub fn key_to_hex(key: &[u8; 32]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hex = "00ff10a0".repeat(8);
        let key = hex_to_key(&hex).unwrap();
        assert_eq!(&key[..4], &[0x00, 0xff, 0x10, 0xa0]);
        assert_eq!(key_to_hex(&key), hex);

        // Uppercase and surrounding whitespace
        let key = hex_to_key(&format!("  {}\n", "AB".repeat(32))).unwrap();
        assert_eq!(*key, [0xab; 32]);
    }

    #[test]
    fn test_hex_rejects_bad_input() {
        assert!(matches!(hex_to_key("abcd"), Err(ConfigError::InvalidKey(_))));
        assert!(matches!(hex_to_key(&"zz".repeat(32)), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn test_key_file_wins_over_inline() {
        let path = std::env::temp_dir().join(format!("ovpn-key-{}.hex", std::process::id()));
        fs::write(&path, "22".repeat(32)).unwrap();

        let section = SessionSection {
            key: Some("11".repeat(32)),
            key_file: Some(path.to_string_lossy().into_owned()),
            ..SessionSection::default()
        };
        assert!(matches!(section.key_source(), Some(KeySource::File(_))));
        assert_eq!(*section.key().unwrap(), [0x22; 32]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_inline_key() {
        let section = SessionSection {
            key: Some("11".repeat(32)),
            ..SessionSection::default()
        };
        assert_eq!(section.key_source(), Some(KeySource::Inline));
        assert_eq!(*section.key().unwrap(), [0x11; 32]);
    }

    #[test]
    fn test_missing_key_file() {
        let section = SessionSection {
            key_file: Some("/nonexistent/ovpn.key".into()),
            ..SessionSection::default()
        };
        assert!(matches!(section.key(), Err(ConfigError::Io(_))));
    }
}
