//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use wspubsub_core::LogFormat;
use wspubsub_protocol::Direction;

/// wspubsub - inspect the websocket publish/subscribe wire protocol
#[derive(Debug, Parser)]
#[command(name = "wspubsub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML session configuration file
    #[arg(long, short, env = "WSPUBSUB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, global = true, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode one frame given as hex
    Decode {
        /// Which side sent the frame
        #[arg(long, short, value_enum)]
        direction: DirectionArg,

        /// Frame bytes as hex; whitespace is ignored
        hex: String,
    },

    /// Print the authorization value for a counter
    Token {
        /// Subscriber nonce, 32 bytes as hex
        #[arg(long)]
        subscriber_nonce: String,

        /// Broadcaster nonce, 32 bytes as hex
        #[arg(long)]
        broadcaster_nonce: String,

        /// Counter value: negative for subscriber frames, positive for broadcaster frames
        #[arg(long, allow_negative_numbers = true)]
        counter: i64,
    },

    /// Run a broadcaster and a subscriber in-process and print every frame
    Simulate {
        /// Topic to subscribe to and publish on
        #[arg(long, default_value = "orders")]
        topic: String,

        /// Payload to publish
        #[arg(long, default_value = "hello")]
        payload: String,

        /// Override the configured largest part body
        #[arg(long)]
        max_part_size: Option<usize>,
    },
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse().map_err(|e: wspubsub_core::TracingError| e.to_string())
}

/// Frame direction as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    /// Subscriber to broadcaster
    S2b,
    /// Broadcaster to subscriber
    B2s,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::S2b => Direction::SubscriberToBroadcaster,
            DirectionArg::B2s => Direction::BroadcasterToSubscriber,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decode() {
        let cli = Cli::parse_from(["wspubsub", "decode", "--direction", "b2s", "0102"]);
        assert!(matches!(
            cli.command,
            Command::Decode {
                direction: DirectionArg::B2s,
                ..
            }
        ));
    }

    #[test]
    fn parses_negative_counter() {
        let cli = Cli::parse_from([
            "wspubsub",
            "token",
            "--subscriber-nonce",
            "00",
            "--broadcaster-nonce",
            "00",
            "--counter",
            "-3",
        ]);
        let Command::Token { counter, .. } = cli.command else {
            panic!("expected token command");
        };
        assert_eq!(counter, -3);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["wspubsub", "simulate", "--debug", "--config", "a.toml"]);
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
    }

    #[test]
    fn parses_log_format() {
        let cli = Cli::parse_from(["wspubsub", "--log-format", "json", "simulate"]);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(Cli::try_parse_from(["wspubsub", "--log-format", "xml", "simulate"]).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
