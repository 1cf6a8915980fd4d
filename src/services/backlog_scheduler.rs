//! Backlog scheduler.
//!
//! Owns the active backlog for one track, answers "what can run now", and
//! persists every mutation. A failed task never unblocks its dependents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Backlog, DependencyResolver, Task, TaskStatus};

/// Per-status task counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BacklogProgress {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// Non-terminal tasks that can never run because a dependency failed
    pub blocked: usize,
}

impl BacklogProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64 * 100.0
    }
}

/// Dependency-aware scheduler over a persisted [`Backlog`].
#[derive(Debug)]
pub struct BacklogScheduler {
    backlog: Backlog,
    path: PathBuf,
}

impl BacklogScheduler {
    /// Wrap an already-validated backlog that persists to `path`.
    pub fn new(backlog: Backlog, path: impl Into<PathBuf>) -> Self {
        Self {
            backlog,
            path: path.into(),
        }
    }

    /// Load and validate a backlog file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::Storage(format!("cannot read backlog {}: {e}", path.display())))?;
        let backlog: Backlog = serde_json::from_slice(&bytes)?;
        backlog.validate()?;

        info!(
            track_id = %backlog.track_id,
            tasks = backlog.tasks.len(),
            "Backlog loaded"
        );
        Ok(Self::new(backlog, path))
    }

    /// Rewrite the whole backlog file atomically.
    pub async fn save(&self) -> DomainResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(&self.backlog)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Backlog saved");
        Ok(())
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tasks(&self) -> &[Task] {
        &self.backlog.tasks
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.backlog.get(id)
    }

    /// Claimable tasks whose dependencies have all completed.
    pub fn get_ready_tasks(&self) -> Vec<&Task> {
        self.backlog
            .tasks
            .iter()
            .filter(|t| t.status.is_claimable())
            .filter(|t| {
                t.depends_on
                    .iter()
                    .all(|dep| self.backlog.status_of(dep) == Some(TaskStatus::Completed))
            })
            .collect()
    }

    /// Set a task's status and persist. Unknown ids are ignored.
    #[instrument(skip_all, fields(task_id = %id, status = %status))]
    pub async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> DomainResult<()> {
        let Some(task) = self.backlog.get_mut(id) else {
            debug!("Ignoring status update for unknown task");
            return Ok(());
        };
        task.status = status;
        self.backlog.touch();
        self.save().await
    }

    /// Bump a task's attempt counter and persist. Unknown ids are ignored.
    pub async fn increment_attempts(&mut self, id: &str) -> DomainResult<u32> {
        let Some(task) = self.backlog.get_mut(id) else {
            debug!(task_id = %id, "Ignoring attempt increment for unknown task");
            return Ok(0);
        };
        task.attempts += 1;
        let attempts = task.attempts;
        self.backlog.touch();
        self.save().await?;
        Ok(attempts)
    }

    /// Every task is `completed` or `failed`.
    pub fn is_complete(&self) -> bool {
        self.backlog.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Non-terminal tasks with a failed dependency somewhere upstream.
    pub fn blocked_tasks(&self) -> Vec<&Task> {
        let mut memo: HashMap<&str, bool> = HashMap::new();
        self.backlog
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .filter(|t| {
                t.depends_on
                    .iter()
                    .any(|dep| self.fails_upstream(dep, &mut memo))
            })
            .collect()
    }

    fn fails_upstream<'a>(&'a self, id: &'a str, memo: &mut HashMap<&'a str, bool>) -> bool {
        if let Some(&known) = memo.get(id) {
            return known;
        }
        let result = match self.backlog.get(id) {
            Some(task) if task.status == TaskStatus::Failed => true,
            Some(task) => task
                .depends_on
                .iter()
                .any(|dep| self.fails_upstream(dep, memo)),
            None => false,
        };
        memo.insert(id, result);
        result
    }

    pub fn progress(&self) -> BacklogProgress {
        let mut progress = BacklogProgress {
            total: self.backlog.tasks.len(),
            blocked: self.blocked_tasks().len(),
            ..BacklogProgress::default()
        };
        for task in &self.backlog.tasks {
            match task.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Ready => progress.ready += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// Task ids in an order that respects every dependency.
    pub fn topological_order(&self) -> DomainResult<Vec<String>> {
        DependencyResolver::new().topological_sort(&self.backlog.tasks)
    }
}
