//! Workspace domain model.
//!
//! Git worktrees provide isolated workspaces for tasks,
//! enabling parallel execution without conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    /// Active and in use
    Active,
    /// Branch merged into trunk
    Merged,
    /// Removed from disk
    Removed,
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Merged => "merged",
            Self::Removed => "removed",
        }
    }
}

/// A branch-backed working directory owned by one task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier
    pub id: Uuid,
    /// Associated task ID
    pub task_id: String,
    /// Worktree filesystem path
    pub path: String,
    /// Branch name
    pub branch: String,
    /// Base ref (where branch was created from)
    pub base_ref: String,
    pub status: WorkspaceStatus,
    /// Merge commit SHA (if merged)
    pub merge_commit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Create a new workspace record.
    pub fn new(
        task_id: impl Into<String>,
        path: impl Into<String>,
        branch: impl Into<String>,
        base_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            path: path.into(),
            branch: branch.into(),
            base_ref: base_ref.into(),
            status: WorkspaceStatus::Active,
            merge_commit: None,
            created_at: Utc::now(),
        }
    }

    /// Encode a task id as a single path and branch component.
    ///
    /// ASCII letters, digits and `-` are kept with their case; every other
    /// byte, `_` included, becomes `_xx` (lowercase hex). The encoding is
    /// injective, so distinct ids never share a worktree, branch or spec
    /// history.
    pub fn task_key(task_id: &str) -> String {
        if task_id.is_empty() {
            return "_".to_string();
        }
        let mut key = String::with_capacity(task_id.len());
        for byte in task_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                key.push(char::from(byte));
            } else {
                key.push_str(&format!("_{byte:02x}"));
            }
        }
        key
    }

    /// Generate a branch name from task ID.
    pub fn branch_name_for_task(prefix: &str, task_id: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), Self::task_key(task_id))
    }

    /// Generate a worktree path from task ID.
    pub fn path_for_task(base_path: &str, task_id: &str) -> String {
        format!("{}/{}", base_path.trim_end_matches('/'), Self::task_key(task_id))
    }

    /// Mark as merged successfully.
    pub fn merged(&mut self, commit: Option<String>) {
        self.status = WorkspaceStatus::Merged;
        self.merge_commit = commit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_derive_from_task_id() {
        assert_eq!(
            Workspace::branch_name_for_task("cleanroom/task", "T01"),
            "cleanroom/task/T01"
        );
        assert_eq!(
            Workspace::path_for_task(".cleanroom/worktrees/", "T01"),
            ".cleanroom/worktrees/T01"
        );
    }

    #[test]
    fn test_unsafe_bytes_are_escaped() {
        assert_eq!(Workspace::task_key("feat/Login Flow"), "feat_2fLogin_20Flow");
        assert_eq!(Workspace::task_key("../.."), "_2e_2e_2f_2e_2e");
        assert_eq!(Workspace::task_key(""), "_");
    }

    #[test]
    fn test_distinct_ids_never_share_a_key() {
        let ids = ["T01", "t01", "a/b", "a-b", "a_b", "a_2fb", "a b", "_", ""];
        let keys: std::collections::HashSet<String> =
            ids.iter().map(|id| Workspace::task_key(id)).collect();
        assert_eq!(keys.len(), ids.len());
        assert_ne!(
            Workspace::path_for_task("wt", "T01"),
            Workspace::path_for_task("wt", "t01")
        );
    }
}
