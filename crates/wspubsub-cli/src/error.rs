//! CLI error types.

use thiserror::Error;
use wspubsub_core::TracingError;
use wspubsub_protocol::ProtocolError;
use wspubsub_session::SessionError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// Argument was not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A nonce argument had the wrong size.
    #[error("{name} must be 32 bytes, got {len}")]
    NonceLength { name: &'static str, len: usize },

    /// Frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Simulated connection failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Tracing could not be initialized.
    #[error(transparent)]
    Tracing(#[from] TracingError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Simulation task panicked or was cancelled.
    #[error("simulation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CliError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
