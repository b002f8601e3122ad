//! Error types for Converge
//!
//! Managers report not-found and state-conflict outcomes as boolean returns;
//! the variants here cover the failures that surface to callers as errors.

use thiserror::Error;

/// Result type for Converge operations
pub type Result<T> = std::result::Result<T, ConvergeError>;

/// Converge error types
#[derive(Debug, Clone, Error)]
pub enum ConvergeError {
    /// Malformed caller input (wrong key length, missing private key, bad config value)
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Operation on a transport that was not started
    #[error("{what} has not been started")]
    NotStarted { what: String },

    /// Agent acted on a task assigned to someone else
    #[error("Agent {agent_id} not authorized for task {task_id}")]
    NotAuthorized { agent_id: String, task_id: String },

    /// Task lookup failed where a task was required
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    /// Pool lookup failed where a pool was required
    #[error("Pool {pool_id} not found")]
    PoolNotFound { pool_id: String },

    /// Transition attempted from an incompatible state
    #[error("State conflict: {reason}")]
    StateConflict { reason: String },

    /// Signature mismatch, decryption failure, malformed key material
    #[error("Cryptographic failure: {reason}")]
    Crypto { reason: String },

    /// I/O failure during send or receive, oversize frame
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    /// Deadline elapsed before the operation completed
    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    /// Encoding or decoding failure
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Filesystem or other I/O failure outside a transport
    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl ConvergeError {
    /// Create an invalid-argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a not-started error
    pub fn not_started(what: impl Into<String>) -> Self {
        Self::NotStarted { what: what.into() }
    }

    /// Create a crypto error
    pub fn crypto(reason: impl Into<String>) -> Self {
        Self::Crypto {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Get an error code for logs and operator tooling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::NotStarted { .. } => "NOT_STARTED",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::PoolNotFound { .. } => "POOL_NOT_FOUND",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::Crypto { .. } => "CRYPTO_FAILURE",
            Self::Transport { .. } => "TRANSPORT_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

impl From<std::io::Error> for ConvergeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ConvergeError::NotAuthorized {
            agent_id: "a1".to_string(),
            task_id: "t1".to_string(),
        };
        assert_eq!(err.error_code(), "NOT_AUTHORIZED");
    }

    #[test]
    fn test_display_includes_context() {
        let err = ConvergeError::invalid_argument("key must be 32 bytes");
        assert!(err.to_string().contains("32 bytes"));
    }
}
