//! wspubsub CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use wspubsub_core::{TracingConfig, init_tracing};

use wspubsub_cli::cli::{Cli, Command};
use wspubsub_cli::commands;
use wspubsub_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::for_cli(cli.debug);
    if let Some(format) = cli.log_format {
        tracing = tracing.with_format(format);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Decode { direction, hex } => commands::decode::run(direction.into(), &hex),
        Command::Token {
            subscriber_nonce,
            broadcaster_nonce,
            counter,
        } => commands::token::run(&subscriber_nonce, &broadcaster_nonce, counter),
        Command::Simulate {
            topic,
            payload,
            max_part_size,
        } => {
            let mut config = wspubsub_cli::config::load(cli.config.as_deref())?;
            if let Some(size) = max_part_size {
                config = config.with_max_part_size(size);
            }
            commands::simulate::run(config, &topic, &payload).await
        }
    }
}
