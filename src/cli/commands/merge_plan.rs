//! `merge-plan` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::services::merge_plans;

#[derive(Args, Debug)]
pub struct MergePlanArgs {
    /// Requirements document
    pub requirements: PathBuf,

    /// Architecture document
    pub architecture: PathBuf,

    /// Risk assessment document
    pub risks: PathBuf,

    /// Write the merged plan here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct MergePlanOutput {
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_to: Option<String>,
}

impl CommandOutput for MergePlanOutput {
    fn to_human(&self) -> String {
        match &self.written_to {
            Some(path) => format!("Merged plan written to {path}"),
            None => self.plan.clone(),
        }
    }
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn execute(args: MergePlanArgs, json_mode: bool) -> Result<()> {
    let requirements = read(&args.requirements).await?;
    let architecture = read(&args.architecture).await?;
    let risks = read(&args.risks).await?;

    let plan = merge_plans(&requirements, &architecture, &risks);

    let written_to = match &args.output {
        Some(path) => {
            tokio::fs::write(path, &plan)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Some(path.display().to_string())
        }
        None => None,
    };

    output(&MergePlanOutput { plan, written_to }, json_mode);
    Ok(())
}
