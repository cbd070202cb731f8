//! Runtime configuration
//!
//! JSON で与えます。すべてのフィールドにデフォルトがあるので、空のオブジェクト
//! `{}` も有効な設定です。
//!
//! ```json
//! {
//!   "queue": { "delay_ms": 500, "default_alias": "operation" },
//!   "transport": { "abort_remote_on_cancel": true, "event_capacity": 64 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub queue: QueueConfig,
    pub transport: TransportConfig,
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading runtime config");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "transport.event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.queue.default_alias.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "queue.default_alias must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// SerialQueue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum pause between the end of one operation and the start of the next.
    pub delay_ms: u64,
    /// Alias for operations added without one.
    pub default_alias: String,
}

impl QueueConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            default_alias: "operation".to_string(),
        }
    }
}

/// ChannelTransport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Send an `Aborted` package to the responder when a pending request is cancelled.
    pub abort_remote_on_cancel: bool,
    /// Buffer of each event signature's broadcast channel.
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            abort_remote_on_cancel: true,
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.queue.delay(), Duration::from_millis(500));
        assert!(config.transport.abort_remote_on_cancel);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            RuntimeConfig::from_json(r#"{ "queue": { "delay_ms": 20 }, "transport": { "event_capacity": 8 } }"#)
                .unwrap();
        assert_eq!(config.queue.delay_ms, 20);
        assert_eq!(config.queue.default_alias, "operation");
        assert_eq!(config.transport.event_capacity, 8);
        assert!(config.transport.abort_remote_on_cancel);
    }

    #[test]
    fn zero_event_capacity_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "transport": { "event_capacity": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            RuntimeConfig::from_json("{ queue"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            RuntimeConfig::load("/nonexistent/courier.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}
