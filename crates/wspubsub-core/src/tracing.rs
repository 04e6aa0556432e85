//! Log output for wspubsub binaries.
//!
//! Library crates only emit events with the `tracing` macros. A binary
//! calls [`init_tracing`] once at startup to pick a format and filter:
//!
//! ```ignore
//! use wspubsub_core::tracing::{TracingConfig, init_tracing};
//!
//! init_tracing(TracingConfig::for_cli(false))?;
//! ```
//!
//! `RUST_LOG` wins over the configured level unless an explicit directive
//! was set with [`TracingConfig::with_directive`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Errors from [`init_tracing`] and [`LogFormat::from_str`].
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),

    /// The filter directive does not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// Unknown log format name.
    #[error("unknown log format {0:?}, expected pretty, compact or json")]
    UnknownFormat(String),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading by eye.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(TracingError::UnknownFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Log settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the `wspubsub` crates when no directive or `RUST_LOG` applies.
    pub level: Level,
    pub format: LogFormat,
    /// Explicit filter directive; overrides `level` and `RUST_LOG`.
    pub directive: Option<String>,
    /// Include file and line of each event.
    pub source_location: bool,
    /// Include the module path of each event.
    pub targets: bool,
    pub timestamps: bool,
    /// Log span open and close, useful with one span per connection.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            directive: None,
            source_location: false,
            targets: true,
            timestamps: true,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Settings for the CLI. Quiet unless `debug`, in which case every
    /// frame is logged with its source location.
    #[must_use]
    pub fn for_cli(debug: bool) -> Self {
        if debug {
            Self {
                level: Level::DEBUG,
                source_location: true,
                timestamps: false,
                ..Self::default()
            }
        } else {
            Self {
                level: Level::WARN,
                targets: false,
                timestamps: false,
                ..Self::default()
            }
        }
    }

    /// Settings for a long-running broadcaster feeding a log collector.
    #[must_use]
    pub fn for_broadcaster() -> Self {
        Self {
            format: LogFormat::Json,
            source_location: true,
            span_events: true,
            ..Self::default()
        }
    }

    /// Builder: set the default level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Builder: set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builder: set an explicit filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Directive used when neither `directive` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        format!("wspubsub={}", self.level)
    }

    /// Builds the filter this config describes.
    pub fn filter(&self) -> Result<EnvFilter, TracingError> {
        let filter = match &self.directive {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.default_directive()))?,
        };
        Ok(filter)
    }

    fn fmt_span(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

macro_rules! finish_layer {
    ($layer:expr, $config:expr) => {{
        let layer = $layer
            .with_writer(std::io::stderr)
            .with_file($config.source_location)
            .with_line_number($config.source_location)
            .with_target($config.targets)
            .with_span_events($config.fmt_span());
        let boxed: BoxedLayer = if $config.timestamps {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        };
        boxed
    }};
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails when the directive does not parse or a subscriber is already
/// installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let layer = match config.format {
        LogFormat::Pretty => finish_layer!(tracing_subscriber::fmt::layer().pretty(), config),
        LogFormat::Compact => finish_layer!(tracing_subscriber::fmt::layer().compact(), config),
        LogFormat::Json => finish_layer!(tracing_subscriber::fmt::layer().json(), config),
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_presets() {
        let quiet = TracingConfig::for_cli(false);
        assert_eq!(quiet.level, Level::WARN);
        assert_eq!(quiet.default_directive(), "wspubsub=WARN");
        assert!(!quiet.targets);

        let debug = TracingConfig::for_cli(true);
        assert_eq!(debug.level, Level::DEBUG);
        assert!(debug.source_location);
        assert!(!debug.timestamps);
    }

    #[test]
    fn broadcaster_preset_is_json_with_spans() {
        let config = TracingConfig::for_broadcaster();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.fmt_span(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn format_names() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TracingError::UnknownFormat(name)) if name == "xml"
        ));
    }

    #[test]
    fn explicit_directive_overrides_level() {
        let config = TracingConfig::default()
            .with_level(Level::ERROR)
            .with_directive("wspubsub_session=trace");
        assert_eq!(config.filter().unwrap().to_string(), "wspubsub_session=trace");
    }

    #[test]
    fn bad_directive_is_rejected_before_install() {
        let config = TracingConfig::default().with_directive("wspubsub=loudest");
        assert!(matches!(init_tracing(config), Err(TracingError::Filter(_))));
    }
}
