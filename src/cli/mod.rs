//! Command-line interface.
//!
//! Clap command structures plus one module per command under [`commands`].
//! Every command prints either a human-readable rendering or, with
//! `--json`, the same data as JSON on stdout.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use commands::{
    merge_plan::MergePlanArgs, rebase_check::RebaseCheckArgs, run::RunArgs, spec::SpecArgs,
    verify::VerifyArgs,
};

#[derive(Parser, Debug)]
#[command(name = "cleanroom")]
#[command(about = "Cleanroom - dependency-aware agent task orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to .cleanroom/config.yaml and .cleanroom/local.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List tasks whose dependencies are all completed
    Ready,

    /// Show backlog progress and every task's status
    Status,

    /// Execute ready tasks until the backlog drains
    Run(RunArgs),

    /// Check a transcript file against the context hygiene gates
    Verify(VerifyArgs),

    /// Merge three planning documents into one plan
    MergePlan(MergePlanArgs),

    /// Evaluate execution results for rebase advice
    RebaseCheck(RebaseCheckArgs),

    /// Versioned task specs
    Spec(SpecArgs),
}

/// Print an error and return the failure exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> std::process::ExitCode {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "caused_by": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err}", style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", style("caused by:").dim());
        }
    }
    std::process::ExitCode::FAILURE
}
