//! Shared ambient setup for the wspubsub crates.

pub mod tracing;

pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
