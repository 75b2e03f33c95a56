mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::ForgeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => error::handle_error(err),
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let _guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;
    let config = ForgeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Agent(args) => commands::agent::run(&config, args, cli.format).await,
        Commands::Repair(args) => commands::repair::run(&config, args, cli.format).await,
        Commands::LastRun => commands::last_run::run(&config, cli.format),
    }
}
