//! `spec` commands: versioned task specs.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, SpecVersion, VersionComparison};
use crate::services::SpecStore;

#[derive(Args, Debug)]
pub struct SpecArgs {
    #[command(subcommand)]
    pub command: SpecCommands,
}

#[derive(Subcommand, Debug)]
pub enum SpecCommands {
    /// Save a file as the next version of a task's spec
    Save {
        /// Task ID
        task_id: String,
        /// File holding the new spec text
        file: PathBuf,
        /// Why this version was written
        #[arg(short, long, default_value = "manual edit")]
        reason: String,
    },
    /// Show one version (latest by default)
    Show {
        /// Task ID
        task_id: String,
        /// Version number
        #[arg(short, long)]
        version: Option<u32>,
    },
    /// List saved version numbers
    List {
        /// Task ID
        task_id: String,
    },
    /// Compare two versions
    Compare {
        /// Task ID
        task_id: String,
        /// Older version
        from: u32,
        /// Newer version
        to: u32,
    },
}

#[derive(Debug, Serialize)]
pub struct SavedOutput {
    pub task_id: String,
    pub version: u32,
}

impl CommandOutput for SavedOutput {
    fn to_human(&self) -> String {
        format!("Saved {} spec v{}", self.task_id, self.version)
    }
}

#[derive(Debug, Serialize)]
pub struct ShowOutput {
    #[serde(flatten)]
    pub spec: SpecVersion,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        format!(
            "{} v{} ({}, {})\n\n{}",
            self.spec.task_id,
            self.spec.version,
            self.spec.reason,
            self.spec.created_at.to_rfc3339(),
            self.spec.content
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub task_id: String,
    pub versions: Vec<u32>,
}

impl CommandOutput for ListOutput {
    fn to_human(&self) -> String {
        if self.versions.is_empty() {
            return format!("No spec versions saved for {}", self.task_id);
        }
        let versions: Vec<String> = self.versions.iter().map(|v| format!("v{v}")).collect();
        format!("{}: {}", self.task_id, versions.join(", "))
    }
}

#[derive(Debug, Serialize)]
pub struct CompareOutput {
    #[serde(flatten)]
    pub comparison: VersionComparison,
}

impl CommandOutput for CompareOutput {
    fn to_human(&self) -> String {
        let c = &self.comparison;
        format!(
            "{} v{} -> v{}: {} -> {} bytes ({:+}), {}s apart",
            c.task_id,
            c.from_version,
            c.to_version,
            c.from_size_bytes,
            c.to_size_bytes,
            c.size_delta_bytes,
            c.time_delta_secs
        )
    }
}

pub async fn execute(args: SpecArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = SpecStore::new(&config.storage.specs_dir);

    match args.command {
        SpecCommands::Save {
            task_id,
            file,
            reason,
        } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let version = store.save_spec(&task_id, &content, &reason).await?;
            output(&SavedOutput { task_id, version }, json_mode);
        }
        SpecCommands::Show { task_id, version } => {
            let spec = match version {
                Some(v) => store.load_spec(&task_id, v).await?,
                None => store
                    .load_latest_spec(&task_id)
                    .await?
                    .with_context(|| format!("No spec versions saved for {task_id}"))?,
            };
            output(&ShowOutput { spec }, json_mode);
        }
        SpecCommands::List { task_id } => {
            let versions = store.list_versions(&task_id).await?;
            output(&ListOutput { task_id, versions }, json_mode);
        }
        SpecCommands::Compare { task_id, from, to } => {
            let comparison = store.compare_versions(&task_id, from, to).await?;
            output(&CompareOutput { comparison }, json_mode);
        }
    }

    Ok(())
}
