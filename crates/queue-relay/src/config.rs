//! Relay configuration
//!
//! Every field carries a serde default, so an absent file or an unconfigured
//! environment produces a valid configuration. Sources, later ones overriding
//! earlier ones:
//! 1. An optional configuration file (YAML, TOML or JSON, picked by extension)
//! 2. Environment variables prefixed `QUEUE_RELAY__` with `__` as separator,
//!    e.g. `QUEUE_RELAY__WAIT_TIME_SECONDS=5` or `QUEUE_RELAY__AWS__REGION=eu-west-1`

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "QUEUE_RELAY";

/// Longest long-poll wait the transport accepts
pub const MAX_WAIT_TIME_SECONDS: u64 = 20;

/// Largest receive batch the transport accepts
pub const MAX_BATCH_SIZE: u32 = 10;

/// Configuration for a message queue facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Long-poll wait for standard-queue receives, in seconds
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: u64,

    /// Messages requested per receive call
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,

    /// Memoize multi-key subscriptions the same way single-key ones are
    #[serde(default)]
    pub cache_multi_key_subscriptions: bool,

    /// Connection settings for the AWS transport
    #[serde(default)]
    pub aws: Option<AwsSettings>,
}

fn default_wait_time_seconds() -> u64 {
    10
}

fn default_max_messages() -> u32 {
    MAX_BATCH_SIZE
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            wait_time_seconds: default_wait_time_seconds(),
            max_messages: default_max_messages(),
            cache_multi_key_subscriptions: false,
            aws: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from an optional file and the environment, then validate it
    ///
    /// # Errors
    /// Returns error if a source cannot be read or parsed, or if the result is invalid
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let relay_config: RelayConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        relay_config.validate()?;
        Ok(relay_config)
    }

    /// Validate configuration against transport limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_messages == 0 || self.max_messages > MAX_BATCH_SIZE {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "max_messages must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, self.max_messages
                ),
            });
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "wait_time_seconds must be at most {}, got {}",
                    MAX_WAIT_TIME_SECONDS, self.wait_time_seconds
                ),
            });
        }

        if let Some(aws) = &self.aws {
            aws.validate()?;
        }

        Ok(())
    }

    /// Long-poll wait as a duration
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }
}

/// AWS connection settings
///
/// Unset fields fall back to the SDK's default provider chain.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsSettings {
    /// AWS region (e.g. "us-east-1")
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (LocalStack and similar)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    fn validate(&self) -> Result<(), ConfigurationError> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) => Err(ConfigurationError::Missing {
                key: "aws.secret_access_key".to_string(),
            }),
            (None, Some(_)) => Err(ConfigurationError::Missing {
                key: "aws.access_key_id".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

// Keep credentials out of logs
impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}
