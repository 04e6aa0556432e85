//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use wspubsub_protocol::MAX_COMPRESSION_LEVEL;

use crate::error::{SessionError, SessionResult};

/// Settings shared by both ends of a connection.
///
/// Every field has a default, so a TOML file only needs the keys it wants
/// to change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Send headers without names.
    pub minimal_headers: bool,

    /// Largest body carried by one stream part.
    pub max_part_size: usize,

    /// Largest compressed or decompressed notification accepted.
    pub max_notification_bytes: u64,

    /// How long to wait for a frame the peer owes (a confirmation or the
    /// next stream part) before giving up. Idle connections never time out.
    #[serde(rename = "receive_timeout_secs", deserialize_with = "seconds")]
    pub receive_timeout: Duration,

    /// zstd level announced for presets and custom dictionaries.
    pub compression_level: i16,

    /// Preset dictionary ids known out-of-band.
    pub preset_dictionaries: Vec<u16>,

    /// Smallest payload the announced compressor is meant for.
    pub min_size_hint: u32,

    /// Largest payload the announced compressor is meant for.
    pub max_size_hint: u64,

    /// Offer or accept zstd.
    pub enable_zstd: bool,

    /// Offer or accept dictionaries trained on this connection.
    pub enable_training: bool,

    /// Preset the subscriber asks for at CONFIGURE; 0 for none.
    pub initial_dict: u16,
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            minimal_headers: true,
            max_part_size: 64 * 1024,
            max_notification_bytes: 512 * 1024 * 1024,
            receive_timeout: Duration::from_secs(30),
            compression_level: 3,
            preset_dictionaries: Vec::new(),
            min_size_hint: 32,
            max_size_hint: u64::MAX,
            enable_zstd: true,
            enable_training: true,
            initial_dict: 0,
        }
    }
}

impl SessionConfig {
    /// Builder: set the header mode.
    pub fn with_minimal_headers(mut self, minimal: bool) -> Self {
        self.minimal_headers = minimal;
        self
    }

    /// Builder: set the stream part size.
    pub fn with_max_part_size(mut self, size: usize) -> Self {
        self.max_part_size = size;
        self
    }

    /// Builder: set the notification size ceiling.
    pub fn with_max_notification_bytes(mut self, bytes: u64) -> Self {
        self.max_notification_bytes = bytes;
        self
    }

    /// Builder: set the receive timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Builder: set the compression level.
    pub fn with_compression_level(mut self, level: i16) -> Self {
        self.compression_level = level;
        self
    }

    /// Builder: set the preset dictionary ids.
    pub fn with_preset_dictionaries(mut self, ids: Vec<u16>) -> Self {
        self.preset_dictionaries = ids;
        self
    }

    /// Builder: set the size hints sent with announcements.
    pub fn with_size_hints(mut self, min: u32, max: u64) -> Self {
        self.min_size_hint = min;
        self.max_size_hint = max;
        self
    }

    /// Builder: enable or disable zstd.
    pub fn with_zstd(mut self, enabled: bool) -> Self {
        self.enable_zstd = enabled;
        self
    }

    /// Builder: enable or disable dictionary training.
    pub fn with_training(mut self, enabled: bool) -> Self {
        self.enable_training = enabled;
        self
    }

    /// Builder: set the preset requested at CONFIGURE.
    pub fn with_initial_dict(mut self, id: u16) -> Self {
        self.initial_dict = id;
        self
    }

    /// Checks values the protocol cannot carry.
    pub fn validate(&self) -> SessionResult<()> {
        if self.max_part_size == 0 {
            return Err(SessionError::config("max_part_size must be greater than 0"));
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(SessionError::config(format!(
                "compression_level {} exceeds {MAX_COMPRESSION_LEVEL}",
                self.compression_level
            )));
        }
        if self.min_size_hint as u64 > self.max_size_hint {
            return Err(SessionError::config("min_size_hint is above max_size_hint"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::default();
        assert!(config.minimal_headers);
        assert_eq!(config.max_part_size, 65536);
        assert_eq!(config.receive_timeout, Duration::from_secs(30));
        assert_eq!(config.compression_level, 3);
        assert_eq!(config.max_size_hint, u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_config() {
        let config = SessionConfig::default()
            .with_minimal_headers(false)
            .with_max_part_size(16)
            .with_receive_timeout(Duration::from_secs(5))
            .with_preset_dictionaries(vec![2, 3])
            .with_initial_dict(2)
            .with_zstd(false);

        assert!(!config.minimal_headers);
        assert_eq!(config.max_part_size, 16);
        assert_eq!(config.receive_timeout, Duration::from_secs(5));
        assert_eq!(config.preset_dictionaries, vec![2, 3]);
        assert_eq!(config.initial_dict, 2);
        assert!(!config.enable_zstd);
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let zero_parts = SessionConfig::default().with_max_part_size(0);
        assert!(matches!(
            zero_parts.validate(),
            Err(SessionError::Config { .. })
        ));

        let too_strong = SessionConfig::default().with_compression_level(23);
        assert!(too_strong.validate().is_err());

        let inverted = SessionConfig::default().with_size_hints(100, 10);
        assert!(inverted.validate().is_err());
    }
}
