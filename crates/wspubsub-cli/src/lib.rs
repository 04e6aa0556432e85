//! Debugging CLI for the websocket publish/subscribe protocol.
//!
//! This crate provides the `wspubsub` binary: decode captured frames, mint
//! authorization tokens, and run an in-process connection to watch the
//! frames it exchanges.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod recording;

pub use cli::Cli;
pub use error::{CliError, CliResult};
