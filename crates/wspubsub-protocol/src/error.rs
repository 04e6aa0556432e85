//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while parsing or serializing a frame.
///
/// Every variant is connection-fatal: the peer that sees one disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Header section could not be decoded (size or count violation).
    #[error("malformed header: {reason}")]
    MalformedHeader { reason: String },

    /// A header value violates the message's rules, or an explicit header
    /// name is unknown or repeated.
    #[error("malformed message: {header}: {reason}")]
    MalformedMessage {
        header: &'static str,
        reason: String,
    },

    /// No codec is registered for the type code.
    #[error("unknown message type: {code}")]
    UnknownMessageType { code: u8 },

    /// Frame too short to hold the flags and type code.
    #[error("incomplete frame: expected at least {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// Two codecs claimed the same type code within one direction.
    #[error("message type {code} is claimed by more than one codec")]
    DuplicateRegistration { code: u8 },
}

impl ProtocolError {
    /// Creates a malformed header error.
    pub fn malformed_header(reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            reason: reason.into(),
        }
    }

    /// Creates a malformed message error for the given header.
    pub fn malformed(header: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            header,
            reason: reason.into(),
        }
    }
}
