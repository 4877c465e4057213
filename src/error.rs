//! Error types for the remote execution core

use serde::Serialize;
use thiserror::Error;

/// Main error type for the remote execution core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing master key, malformed stored record, or invalid request
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable credential, or the remote rejected the one presented
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// TOFU violation: the host presented a fingerprint that differs from the pinned one
    #[error("Host key mismatch for '{host}': pinned {pinned}, presented {presented}")]
    HostKeyMismatch {
        host: String,
        pinned: String,
        presented: String,
    },

    /// Transient transport/network fault
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect or execute deadline exceeded
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Invalid parameters provided by the caller
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Database error from the durable stores
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure class surfaced to the orchestrator in `ExecutionResult.error_kind`.
///
/// `Command` never originates from a `CoreError`: a non-zero remote exit code
/// is a completed channel operation, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Authentication,
    HostKeyMismatch,
    Connection,
    Timeout,
    Command,
}

impl ErrorKind {
    /// Stable identifier used in audit records and status payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::HostKeyMismatch => "host_key_mismatch",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Command => "command",
        }
    }
}

impl CoreError {
    /// Create a configuration error from a string
    pub fn configuration(msg: impl Into<String>) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        CoreError::Authentication(msg.into())
    }

    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        CoreError::Connection(msg.into())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        CoreError::InvalidParams(msg.into())
    }

    /// The failure class this error surfaces as
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Configuration(_) | CoreError::InvalidParams(_) | CoreError::Storage(_) => {
                ErrorKind::Configuration
            }
            CoreError::Authentication(_) => ErrorKind::Authentication,
            CoreError::HostKeyMismatch { .. } => ErrorKind::HostKeyMismatch,
            CoreError::Connection(_) | CoreError::Ssh(_) => ErrorKind::Connection,
            CoreError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Whether the executor's retry loop may attempt this execution again.
    ///
    /// Only transient channel faults qualify. Authentication failures and
    /// host key mismatches are fatal for the item; configuration errors
    /// cannot be fixed by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Connection(_) | CoreError::Timeout(_) | CoreError::Ssh(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection error: failed to connect");

        let err = CoreError::Timeout(5000);
        assert_eq!(err.to_string(), "Timeout after 5000ms");

        let err = CoreError::HostKeyMismatch {
            host: "host-a".to_string(),
            pinned: "SHA256:aaa".to_string(),
            presented: "SHA256:bbb".to_string(),
        };
        assert!(err.to_string().contains("host-a"));
        assert!(err.to_string().contains("SHA256:bbb"));
    }

    #[test]
    fn test_retry_classification() {
        assert!(CoreError::connection("reset by peer").is_retryable());
        assert!(CoreError::Timeout(2000).is_retryable());

        assert!(!CoreError::auth("rejected").is_retryable());
        assert!(!CoreError::configuration("no master key").is_retryable());
        assert!(!CoreError::HostKeyMismatch {
            host: "h".into(),
            pinned: "a".into(),
            presented: "b".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            CoreError::configuration("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CoreError::invalid_params("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(CoreError::auth("x").kind(), ErrorKind::Authentication);
        assert_eq!(CoreError::connection("x").kind(), ErrorKind::Connection);
        assert_eq!(CoreError::Timeout(1).kind(), ErrorKind::Timeout);
    }
}
