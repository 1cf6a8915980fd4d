//! Workspace Manager
//!
//! Gives every task attempt its own git worktree on its own branch, merges
//! finished branches back into trunk one at a time, and tears workspaces
//! down again.
//!
//! # Naming Convention
//!
//! - Branch: `<branch_prefix>/<task key>` (e.g. `cleanroom/task/T01`)
//! - Worktree path: `<root>/<task key>`

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Workspace, WorkspaceConfig, WorkspaceStatus};
use crate::domain::ports::{MergeOutcome, VersionControl};
use crate::services::shutdown::ShutdownCoordinator;

fn release_key(task_id: &str) -> String {
    format!("workspace:{task_id}")
}

/// Owns the lifecycle of per-task workspaces.
pub struct WorkspaceManager {
    vcs: Arc<dyn VersionControl>,
    config: WorkspaceConfig,
    workspaces: RwLock<HashMap<String, Workspace>>,
    merge_lock: Mutex<()>,
    shutdown: Option<Arc<ShutdownCoordinator>>,
}

impl WorkspaceManager {
    pub fn new(vcs: Arc<dyn VersionControl>, config: WorkspaceConfig) -> Self {
        Self {
            vcs,
            config,
            workspaces: RwLock::new(HashMap::new()),
            merge_lock: Mutex::new(()),
            shutdown: None,
        }
    }

    /// Register every created workspace for release on shutdown.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Provision (or reuse) the workspace for a task.
    ///
    /// Idempotent: a registered workspace is returned as is, and a valid
    /// worktree already on disk is adopted instead of recreated.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn create(&self, task_id: &str) -> DomainResult<Workspace> {
        if let Some(existing) = self.workspaces.read().await.get(task_id) {
            debug!(path = %existing.path, "Workspace already registered, reusing");
            return Ok(existing.clone());
        }

        let path = Workspace::path_for_task(&self.config.root, task_id);
        let branch = Workspace::branch_name_for_task(&self.config.branch_prefix, task_id);

        if self.vcs.worktree_exists(&path).await? {
            info!(path = %path, "Valid worktree already exists, reusing");
        } else {
            self.vcs.add_worktree(&path, &branch, &self.config.trunk).await?;
            info!(path = %path, branch = %branch, "Workspace created");
        }

        let workspace = Workspace::new(task_id, path, branch, self.config.trunk.clone());
        self.workspaces
            .write()
            .await
            .insert(task_id.to_string(), workspace.clone());

        if let Some(shutdown) = &self.shutdown {
            let vcs = Arc::clone(&self.vcs);
            let path = workspace.path.clone();
            let branch = workspace.branch.clone();
            shutdown
                .register(release_key(task_id), move || async move {
                    vcs.remove_worktree(&path).await?;
                    vcs.delete_branch(&branch).await
                })
                .await;
        }

        Ok(workspace)
    }

    /// Merge the task branch into trunk with a merge commit.
    ///
    /// Merges are serialized: the merge lock is held across the whole merge,
    /// including the abort of a conflicting one.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn merge(&self, task_id: &str) -> DomainResult<Option<String>> {
        let branch = self
            .workspaces
            .read()
            .await
            .get(task_id)
            .map(|w| w.branch.clone())
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;

        let _guard = self.merge_lock.lock().await;
        let message = format!("Merge {branch} ({task_id})");

        match self.vcs.merge_no_ff(&branch, &self.config.trunk, &message).await? {
            MergeOutcome::Merged { commit } => {
                if let Some(ws) = self.workspaces.write().await.get_mut(task_id) {
                    ws.merged(commit.clone());
                }
                info!(branch = %branch, commit = ?commit, "Workspace merged into trunk");
                Ok(commit)
            }
            MergeOutcome::Conflict { files, details } => {
                warn!(branch = %branch, files = ?files, "Merge conflict, aborting merge");
                if let Err(e) = self.vcs.abort_merge().await {
                    error!(error = %e, "Failed to abort conflicting merge");
                }
                Err(DomainError::MergeConflict {
                    task_id: task_id.to_string(),
                    branch,
                    details,
                })
            }
        }
    }

    /// Commits the task branch carries on top of trunk.
    pub async fn commit_count(&self, task_id: &str) -> DomainResult<u32> {
        let branch = self
            .workspaces
            .read()
            .await
            .get(task_id)
            .map(|w| w.branch.clone())
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        self.vcs.commit_count(&branch, &self.config.trunk).await
    }

    /// Remove a task's workspace and branch.
    ///
    /// Idempotent and infallible: an unknown or already removed workspace is
    /// a no-op and version-control failures are only logged. Returns whether
    /// a registered workspace was released.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn cleanup(&self, task_id: &str) -> bool {
        let Some(workspace) = self.workspaces.write().await.remove(task_id) else {
            debug!("No workspace registered, nothing to clean up");
            return false;
        };

        if let Err(e) = self.vcs.remove_worktree(&workspace.path).await {
            warn!(path = %workspace.path, error = %e, "Failed to remove worktree");
        }
        if let Err(e) = self.vcs.delete_branch(&workspace.branch).await {
            warn!(branch = %workspace.branch, error = %e, "Failed to delete branch");
        }
        if let Some(shutdown) = &self.shutdown {
            shutdown.release(&release_key(task_id)).await;
        }

        info!(path = %workspace.path, "Workspace removed");
        true
    }

    /// Clean up every registered workspace; returns how many were released.
    pub async fn cleanup_all(&self) -> usize {
        let task_ids: Vec<String> = self.workspaces.read().await.keys().cloned().collect();
        let mut released = 0;
        for task_id in task_ids {
            if self.cleanup(&task_id).await {
                released += 1;
            }
        }
        released
    }

    pub async fn get(&self, task_id: &str) -> Option<Workspace> {
        self.workspaces.read().await.get(task_id).cloned()
    }

    /// Workspaces that have not been merged yet.
    pub async fn active(&self) -> Vec<Workspace> {
        self.workspaces
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkspaceStatus::Active)
            .cloned()
            .collect()
    }
}
