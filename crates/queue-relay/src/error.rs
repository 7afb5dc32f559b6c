//! Error types for queue, topic, and dispatch operations.

use thiserror::Error;

/// Comprehensive error type for all relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Topic not found: {topic_name}")]
    TopicNotFound { topic_name: String },

    #[error("Transport call '{operation}' failed (status {}): {message}", display_status(.status))]
    Transport {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Queue '{queue_name}' could not be found or created")]
    ProvisioningFailed { queue_name: String },

    #[error("Handler failed for message {message_id}: {source}")]
    Handler {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl RelayError {
    /// Build a transport error for the named provider operation
    pub fn transport(operation: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    /// True for the typed "resource does not exist" signals.
    ///
    /// Lookups on the dequeue path use this to tell a missing queue apart from
    /// every other transport failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::QueueNotFound { .. } | Self::TopicNotFound { .. }
        )
    }

    /// Check if error is transient and the whole operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::TopicNotFound { .. } => false,
            Self::Transport { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            Self::ProvisioningFailed { .. } => true,
            Self::Handler { .. } => true,
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "n/a".to_string(),
    }
}

/// Turn a provider status code into a hard failure when it is 4xx or 5xx
pub fn ensure_success_status(operation: &str, status: u16) -> Result<(), RelayError> {
    if (400..600).contains(&status) {
        return Err(RelayError::transport(
            operation,
            Some(status),
            format!("Invalid status code received: {}", status),
        ));
    }
    Ok(())
}

/// Errors during payload or envelope encoding/decoding
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Topic envelope could not be parsed: {message}")]
    InvalidEnvelope { message: String },

    #[error("Message attribute '{key}' has invalid value")]
    InvalidAttribute { key: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
