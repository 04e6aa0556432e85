//! Session configuration loading.
//!
//! The `--config` file is TOML with the fields of [`SessionConfig`]; any
//! field left out keeps its default:
//!
//! ```toml
//! minimal_headers = false
//! max_part_size = 1024
//! receive_timeout_secs = 10
//! ```

use std::path::Path;

use wspubsub_session::SessionConfig;

use crate::error::{CliError, CliResult};

/// Loads and validates a configuration file, or returns the defaults.
pub fn load(path: Option<&Path>) -> CliResult<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::config(format!("failed to read {}: {e}", path.display()))
    })?;
    parse(&content)
}

/// Parses and validates configuration text.
pub fn parse(content: &str) -> CliResult<SessionConfig> {
    let config: SessionConfig = toml::from_str(content)
        .map_err(|e| CliError::config(format!("failed to parse config: {e}")))?;
    config
        .validate()
        .map_err(|e| CliError::config(e.to_string()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(load(None).unwrap(), SessionConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "minimal_headers = false\nmax_part_size = 1024\nreceive_timeout_secs = 10"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert!(!config.minimal_headers);
        assert_eq!(config.max_part_size, 1024);
        assert_eq!(config.receive_timeout, Duration::from_secs(10));
        assert_eq!(config.compression_level, SessionConfig::default().compression_level);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(parse("max_part_size = 0"), Err(CliError::Config(_))));
        assert!(matches!(parse("compression_level = 23"), Err(CliError::Config(_))));
        assert!(matches!(parse("max_part_size = \"big\""), Err(CliError::Config(_))));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load(Some(&missing)), Err(CliError::Config(_))));
    }
}
