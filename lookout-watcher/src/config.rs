//! Bridge configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Poll interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// How the host loop decides when to drain the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStyle {
    /// Drain on a fixed interval.
    #[default]
    Poll,
    /// Drain whenever the channel descriptor is readable.
    Readable,
}

impl fmt::Display for TriggerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => f.write_str("poll"),
            Self::Readable => f.write_str("readable"),
        }
    }
}

impl FromStr for TriggerStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "periodic" => Ok(Self::Poll),
            "readable" | "readiness" => Ok(Self::Readable),
            other => Err(ConfigError::UnknownTrigger(other.to_string())),
        }
    }
}

/// Problems loading or validating a [`BridgeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown trigger style '{0}' (expected 'poll' or 'readable')")]
    UnknownTrigger(String),

    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

/// Settings for one bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub trigger: TriggerStyle,

    /// Only used with [`TriggerStyle::Poll`].
    #[serde(
        rename = "interval_ms",
        with = "millis",
        default = "default_interval"
    )]
    pub interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerStyle::default(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl BridgeConfig {
    /// Polling configuration with a custom interval.
    pub fn poll(interval: Duration) -> Self {
        Self {
            trigger: TriggerStyle::Poll,
            interval,
        }
    }

    /// Readiness-driven configuration.
    pub fn readable() -> Self {
        Self {
            trigger: TriggerStyle::Readable,
            ..Self::default()
        }
    }

    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger == TriggerStyle::Poll && self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
