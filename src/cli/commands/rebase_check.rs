//! `rebase-check` command: score finished attempts for rebase advice.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{BatchRebaseReport, Config, ExecutionResult};
use crate::services::rebase_engine::{analyze_batch, generate_rebase_prompt};
use crate::services::SpecStore;

#[derive(Args, Debug)]
pub struct RebaseCheckArgs {
    /// JSON file holding an array of execution results
    pub results: PathBuf,

    /// Save a fresh-start spec version for every recommended task
    #[arg(long)]
    pub record: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordedSpec {
    pub task_id: String,
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct RebaseCheckOutput {
    #[serde(flatten)]
    pub report: BatchRebaseReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recorded: Vec<RecordedSpec>,
}

impl CommandOutput for RebaseCheckOutput {
    fn to_human(&self) -> String {
        let mut t = table(["Task", "Rebase", "Reason"]);
        for rec in &self.report.recommendations {
            t.add_row(vec![
                Cell::new(&rec.task_id),
                Cell::new(if rec.should_rebase { "yes" } else { "no" }),
                Cell::new(&rec.reason),
            ]);
        }
        let mut lines = vec![
            format!(
                "Analyzed {} result(s), {} rebase(s) recommended",
                self.report.analyzed, self.report.recommended
            ),
            t.to_string(),
        ];
        for spec in &self.recorded {
            lines.push(format!("Recorded {} spec v{}", spec.task_id, spec.version));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RebaseCheckArgs, config: &Config, json_mode: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.results)
        .await
        .with_context(|| format!("Failed to read {}", args.results.display()))?;
    let results: Vec<ExecutionResult> =
        serde_json::from_str(&raw).context("Results file must be a JSON array of execution results")?;

    let report = analyze_batch(&results, &config.rebase);

    let mut recorded = Vec::new();
    if args.record && report.recommended > 0 {
        let scheduler = super::load_scheduler(config).await?;
        let specs = SpecStore::new(&config.storage.specs_dir);
        for rec in report.recommendations.iter().filter(|r| r.should_rebase) {
            let Some(task) = scheduler.get_task(&rec.task_id) else {
                tracing::warn!(task_id = %rec.task_id, "Recommended task is not in the backlog");
                continue;
            };
            let failure = results
                .iter()
                .find(|r| r.task_id == rec.task_id)
                .and_then(|r| r.failure_kind.as_deref());
            let prompt = generate_rebase_prompt(task, rec, failure);
            let version = specs
                .save_spec(&task.id, &prompt, &format!("rebase: {}", rec.reason))
                .await
                .with_context(|| format!("Failed to save spec for {}", task.id))?;
            recorded.push(RecordedSpec {
                task_id: task.id.clone(),
                version,
            });
        }
    }

    output(&RebaseCheckOutput { report, recorded }, json_mode);
    Ok(())
}
