//! CLI command implementations.

pub mod backlog;
pub mod merge_plan;
pub mod rebase_check;
pub mod run;
pub mod spec;
pub mod verify;

use anyhow::{Context, Result};

use crate::domain::models::Config;
use crate::services::BacklogScheduler;

/// Load the configured backlog file.
pub(crate) async fn load_scheduler(config: &Config) -> Result<BacklogScheduler> {
    let path = &config.storage.backlog_path;
    BacklogScheduler::load(path)
        .await
        .with_context(|| format!("Failed to load backlog from {path}"))
}
