//! Error types for the Ops Manager director tool.
//!
//! This module provides the error hierarchy for every layer of the tool:
//! configuration, state management, the Ops Manager API, planning, and
//! reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Ops Manager director tool.
#[derive(Debug, Error)]
pub enum OpsmanError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Ops Manager API errors.
    #[error("Ops Manager API error: {0}")]
    Api(#[from] ApiError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Two mutually exclusive fields were both set.
    #[error("'{field}' conflicts with '{other}'")]
    ConflictingFields {
        /// Field being validated.
        field: String,
        /// Field it conflicts with.
        other: String,
    },

    /// An authentication method that is declared but not implemented.
    #[error("Authentication method '{method}' is not supported, use a UAA token")]
    UnsupportedAuthMethod {
        /// Name of the method.
        method: String,
    },

    /// The director configuration is not a JSON object.
    #[error("Invalid director configuration: {message}")]
    InvalidDirectorConfig {
        /// Description of the problem.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State belongs to a different target.
    #[error("State was recorded for target {recorded}, but configuration targets {configured}")]
    TargetMismatch {
        /// Target recorded in the state.
        recorded: String,
        /// Target in the configuration.
        configured: String,
    },
}

/// Ops Manager API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("Ops Manager authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Ops Manager API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with Ops Manager {target}: {message}")]
    NetworkError {
        /// Target hostname.
        target: String,
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Ops Manager: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The apply changes installation ended unsuccessfully.
    #[error("Installation {installation_id} finished with status '{status}'")]
    InstallationFailed {
        /// Installation ID.
        installation_id: u64,
        /// Terminal status reported by Ops Manager.
        status: String,
    },

    /// Timeout waiting for an installation.
    #[error("Timeout after {waited_secs}s waiting for installation {installation_id} to finish")]
    Timeout {
        /// Installation ID.
        installation_id: u64,
        /// Seconds waited before giving up.
        waited_secs: u64,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// An action needs an input that an earlier action did not produce.
    #[error("Action '{action}' is missing its input: {message}")]
    MissingInput {
        /// Action name.
        action: String,
        /// What was missing.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation failed for the director.
    #[error("Failed to reconcile director on {target}: {reason}")]
    ResourceReconcileFailed {
        /// Target hostname.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// Import ID does not match the configured target.
    #[error("Cannot import '{id}': the director ID is its target hostname '{target}'")]
    ImportMismatch {
        /// Requested import ID.
        id: String,
        /// Configured target hostname.
        target: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for Ops Manager director operations.
pub type Result<T> = std::result::Result<T, OpsmanError>;

impl OpsmanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::NetworkError { .. }) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NetworkError {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        let err = OpsmanError::Api(ApiError::network("opsman.example.com", "connection reset"));
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(5));
    }

    #[test]
    fn test_api_failures_are_not_retryable() {
        let err = OpsmanError::Api(ApiError::api_error(422, "invalid property"));
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
    }

    #[test]
    fn test_error_messages_name_the_target() {
        let err = OpsmanError::Reconcile(ReconcileError::ImportMismatch {
            id: String::from("other.example.com"),
            target: String::from("opsman.example.com"),
        });
        let message = err.to_string();
        assert!(message.contains("other.example.com"));
        assert!(message.contains("opsman.example.com"));
    }
}
