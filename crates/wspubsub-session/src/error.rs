//! Session error types.

use thiserror::Error;
use wspubsub_protocol::ProtocolError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while driving a connection.
///
/// The protocol has no in-band recovery: apart from [`SessionError::Closed`]
/// every variant means the connection must be torn down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Frame could not be parsed or serialized.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Well-formed message that is not allowed in the current state.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// Authorization token did not match the expected counter.
    #[error("Authorization failed: expected counter {expected_counter}")]
    AuthorizationFailed { expected_counter: i64 },

    /// Reassembled or single-frame payload failed its length or hash check.
    #[error("Integrity failure for {identifier}: {reason}")]
    IntegrityFailure { identifier: String, reason: String },

    /// Compression engine failed or does not support the compressor.
    #[error("Compression error: {message}")]
    Compression { message: String },

    /// Peer went quiet for longer than the receive timeout.
    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    /// Transport closed underneath the session.
    #[error("Connection closed")]
    Closed,

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SessionError {
    /// Creates a protocol violation error.
    pub fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Creates an integrity failure for a notification identifier.
    pub fn integrity(identifier: &[u8], reason: impl Into<String>) -> Self {
        Self::IntegrityFailure {
            identifier: String::from_utf8_lossy(identifier).into_owned(),
            reason: reason.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the connection must be disconnected.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}
