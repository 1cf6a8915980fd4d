//! `run` command: execute the backlog with the configured agent.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::{CommandAgentRuntime, GitCli};
use crate::services::{BatchReport, BatchRunner, ShutdownCoordinator, SpecStore, WorkspaceManager};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured concurrency bound
    #[arg(short = 'n', long)]
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub report: BatchReport,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<BatchReport> for RunOutput {
    fn from(report: BatchReport) -> Self {
        Self {
            succeeded: report.succeeded(),
            failed: report.failed(),
            report,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        if self.report.outcomes.is_empty() {
            return "No tasks were ready to run.".to_string();
        }

        let mut t = table(["Task", "Result", "Attempts", "Duration", "Detail"]);
        for o in &self.report.outcomes {
            let detail = match (&o.error, &o.merge_commit) {
                (Some(err), _) => err.clone(),
                (None, Some(commit)) => format!("merged {}", &commit[..commit.len().min(12)]),
                (None, None) => "-".to_string(),
            };
            t.add_row(vec![
                Cell::new(&o.task_id),
                Cell::new(if o.success { "ok" } else { "failed" }),
                Cell::new(o.attempts),
                Cell::new(format!("{}s", o.duration_secs)),
                Cell::new(detail),
            ]);
        }

        let mut lines = vec![
            format!("{} succeeded, {} failed", self.succeeded, self.failed),
            t.to_string(),
        ];
        if !self.report.blocked.is_empty() {
            lines.push(format!(
                "Blocked by failed dependencies: {}",
                self.report.blocked.join(", ")
            ));
        }
        for task_id in self.report.rebase.recommended_task_ids() {
            lines.push(format!("Rebase recommended for {task_id}; a fresh spec version was saved"));
        }
        if self.report.interrupted {
            lines.push("Run was interrupted before the backlog drained".to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<ExitCode> {
    let mut config = config.clone();
    if let Some(n) = args.max_concurrent {
        anyhow::ensure!(n > 0, "--max-concurrent must be at least 1");
        config.max_concurrent_tasks = n;
    }

    let scheduler = Arc::new(Mutex::new(super::load_scheduler(&config).await?));
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let listener = shutdown.listen_for_ctrl_c();

    let vcs = Arc::new(GitCli::new(&config.workspace.repo_path));
    let workspaces = Arc::new(
        WorkspaceManager::new(vcs, config.workspace.clone()).with_shutdown(Arc::clone(&shutdown)),
    );
    let runtime = Arc::new(CommandAgentRuntime::new(
        config.agent.clone(),
        config.workspace.clone(),
    ));
    let specs = Arc::new(SpecStore::new(&config.storage.specs_dir));

    let runner = BatchRunner::new(&config, scheduler, Arc::clone(&workspaces), runtime, specs)
        .context("Failed to build batch runner")?
        .with_shutdown(Arc::clone(&shutdown));

    let report = runner.run().await.context("Batch run failed")?;

    // Anything still registered is released before exit
    let leftover = shutdown.shutdown().await;
    if leftover.released + leftover.failed > 0 {
        info!(released = leftover.released, failed = leftover.failed, "Released leftover resources");
    }
    listener.abort();

    let out = RunOutput::from(report);
    let clean = out.failed == 0 && !out.report.interrupted;
    output(&out, json_mode);
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
