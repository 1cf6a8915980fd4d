//! Cleanroom CLI entry point.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cleanroom::cli::commands::{backlog, merge_plan, rebase_check, run, spec, verify};
use cleanroom::cli::{handle_error, Cli, Commands};
use cleanroom::infrastructure::config::ConfigLoader;
use cleanroom::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => handle_error(&err, json),
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    let json = cli.json;
    match cli.command {
        Commands::Ready => backlog::ready(&config, json).await.map(|()| ExitCode::SUCCESS),
        Commands::Status => backlog::status(&config, json).await.map(|()| ExitCode::SUCCESS),
        Commands::Run(args) => run::execute(args, &config, json).await,
        Commands::Verify(args) => verify::execute(args, &config, json).await,
        Commands::MergePlan(args) => merge_plan::execute(args, json).await.map(|()| ExitCode::SUCCESS),
        Commands::RebaseCheck(args) => rebase_check::execute(args, &config, json)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Spec(args) => spec::execute(args, &config, json).await.map(|()| ExitCode::SUCCESS),
    }
}
