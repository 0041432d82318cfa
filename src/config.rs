//! Protocol configuration.
//!
//! Operator-facing settings only: grace-period windows and logging. Quorum
//! thresholds are NOT configurable — they are fixed by the safety argument
//! (at most one candidate proof can reach >1/3 of source weight) and
//! derived from roster weights at runtime.
//!
//! Files are TOML; durations are humantime strings ("24h", "90s").

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default window for target-roster nodes to publish proof keys.
const DEFAULT_PROOF_KEY_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default minimum age of an adopted key at assembly time.
const DEFAULT_ADOPTION_GRACE: Duration = Duration::ZERO;

/// Default log level.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read or write the config file.
    #[error("config file '{path}': {reason}")]
    Io { path: String, reason: String },

    /// Config file contents could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Protocol configuration for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// How long a new construction waits for proof-key publications before
    /// fixing the assembly without the stragglers.
    #[serde(
        default = "default_proof_key_grace",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub proof_key_grace: Duration,

    /// Minimum time a proof key must have been adopted before the assembly
    /// start for it to be included in the assembly.
    #[serde(
        default = "default_adoption_grace",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub adoption_grace: Duration,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_proof_key_grace() -> Duration {
    DEFAULT_PROOF_KEY_GRACE
}

fn default_adoption_grace() -> Duration {
    DEFAULT_ADOPTION_GRACE
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            proof_key_grace: DEFAULT_PROOF_KEY_GRACE,
            adoption_grace: DEFAULT_ADOPTION_GRACE,
            logging: LoggingConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Proof-key grace window in milliseconds.
    pub fn proof_key_grace_ms(&self) -> u64 {
        self.proof_key_grace.as_millis() as u64
    }

    /// Adoption grace in milliseconds.
    pub fn adoption_grace_ms(&self) -> u64 {
        self.adoption_grace.as_millis() as u64
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        fs::write(path, contents).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
