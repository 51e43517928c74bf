//! Configuration for the connection subsystem
//!
//! Loaded from a TOML file. Every tunable has a default matching the
//! device firmware's stock settings, so a minimal file only needs the
//! `[device]` section.

use serde::{Deserialize, Serialize};
use crate::queue::MAX_CAPACITY;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub features: FeatureSection,
}

/// Device identity reported to the cloud transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Application firmware version string
    pub app_version: String,
}

/// Connection timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Per-attempt wait for the transport to report connected
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout_secs: u64,
    /// How long a connected session may take to become ready
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Pause after a reset before waiting for the network again
    #[serde(default = "default_reestablish_delay")]
    pub reestablish_delay_secs: u64,
    /// Pause before disconnecting so residual events can settle
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_retry_timeout() -> u64 {
    30
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_reestablish_delay() -> u64 {
    15
}

fn default_settle_delay() -> u64 {
    20
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            retry_timeout_secs: default_retry_timeout(),
            ready_timeout_secs: default_ready_timeout(),
            reestablish_delay_secs: default_reestablish_delay(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

impl ConnectionSection {
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn reestablish_delay(&self) -> Duration {
        Duration::from_secs(self.reestablish_delay_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Outbound device message queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSection {
    /// Maximum number of queued messages
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    10
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// Output encoding of the cloud log backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Text,
    Dictionary,
}

/// Build-time feature switches reflected in the shadow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSection {
    /// Request power saving mode before attaching to the network
    #[serde(default)]
    pub power_saving_mode: bool,
    /// Temperature samples are reported
    #[serde(default = "default_true")]
    pub temperature_tracking: bool,
    /// Logs are forwarded to the cloud
    #[serde(default)]
    pub log_backend: bool,
    /// Encoding used when `log_backend` is enabled
    #[serde(default)]
    pub log_output: LogOutput,
    /// Emit a log line for every waiting/connected indication change
    #[serde(default)]
    pub verbose_indication: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            power_saving_mode: false,
            temperature_tracking: true,
            log_backend: false,
            log_output: LogOutput::Text,
            verbose_indication: false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.app_version.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.app_version must not be empty".to_string(),
            ));
        }
        if self.connection.retry_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.retry_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.connection.ready_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.ready_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue.capacity must be greater than 0".to_string(),
            ));
        }
        if self.queue.capacity > MAX_CAPACITY {
            return Err(ConfigError::InvalidConfig(format!(
                "queue.capacity must be at most {MAX_CAPACITY}"
            )));
        }
        Ok(())
    }

    /// Configuration with every default and the given version
    pub fn with_app_version<S: Into<String>>(app_version: S) -> Self {
        Self {
            device: DeviceSection {
                app_version: app_version.into(),
            },
            connection: ConnectionSection::default(),
            queue: QueueSection::default(),
            features: FeatureSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = LinkConfig::from_toml_str(
            r#"
[device]
app_version = "1.2.0"
"#,
        )
        .unwrap();

        assert_eq!(config.device.app_version, "1.2.0");
        assert_eq!(config.connection, ConnectionSection::default());
        assert_eq!(config.connection.settle_delay(), Duration::from_secs(20));
        assert_eq!(config.queue.capacity, 10);
        assert!(config.features.temperature_tracking);
        assert_eq!(config.features.log_output, LogOutput::Text);
    }

    #[test]
    fn test_full_config() {
        let config = LinkConfig::from_toml_str(
            r#"
[device]
app_version = "2.0.0"

[connection]
retry_timeout_secs = 10
ready_timeout_secs = 45
reestablish_delay_secs = 5
settle_delay_secs = 1

[queue]
capacity = 4

[features]
power_saving_mode = true
temperature_tracking = false
log_backend = true
log_output = "dictionary"
"#,
        )
        .unwrap();

        assert_eq!(config.connection.retry_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.ready_timeout(), Duration::from_secs(45));
        assert_eq!(config.connection.reestablish_delay(), Duration::from_secs(5));
        assert_eq!(config.queue.capacity, 4);
        assert!(config.features.power_saving_mode);
        assert!(!config.features.temperature_tracking);
        assert_eq!(config.features.log_output, LogOutput::Dictionary);
    }

    #[test]
    fn test_missing_device_section_fails() {
        let result = LinkConfig::from_toml_str("[queue]\ncapacity = 3\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = LinkConfig::from_toml_str(
            r#"
[device]
app_version = "1.0.0"

[queue]
capacity = 0
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let result = LinkConfig::from_toml_str(
            r#"
[device]
app_version = "1.0.0"

[queue]
capacity = 3000000000000000000
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));

        let mut config = LinkConfig::with_app_version("1.0.0");
        config.queue.capacity = MAX_CAPACITY;
        assert!(config.validate().is_ok());
        config.queue.capacity = MAX_CAPACITY + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = LinkConfig::with_app_version("1.0.0");
        config.connection.retry_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = LinkConfig::with_app_version("1.0.0");
        config.connection.ready_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_version_rejected() {
        let config = LinkConfig::with_app_version("  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }
}
