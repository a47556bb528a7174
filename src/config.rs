use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Planner and unit-of-work settings with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Sibling collections saved concurrently by one cascade step
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max parallel collections must be between 1 and 64"
    ))]
    pub max_parallel_collections: usize,

    /// Command timeout handed to the executor, in milliseconds
    #[validate(range(
        min = 1,
        max = 3_600_000,
        message = "Command timeout must be between 1 ms and one hour"
    ))]
    pub command_timeout_ms: u64,

    /// Insert entities carrying an explicit key unless that key was already
    /// written in the current unit of work
    pub identity_insert: bool,

    /// Pending statements buffered in front of the single writer
    #[validate(range(
        min = 1,
        max = 4096,
        message = "Channel capacity must be between 1 and 4096"
    ))]
    pub channel_capacity: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_parallel_collections: 4,
            command_timeout_ms: 30_000,
            identity_insert: false,
            channel_capacity: 64,
        }
    }
}

impl PlannerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            max_parallel_collections: parse_env_var("RELPLAN_MAX_PARALLEL_COLLECTIONS", "4")?,
            command_timeout_ms: parse_env_var("RELPLAN_COMMAND_TIMEOUT_MS", "30000")?,
            identity_insert: parse_env_var("RELPLAN_IDENTITY_INSERT", "false")?,
            channel_capacity: parse_env_var("RELPLAN_CHANNEL_CAPACITY", "64")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
