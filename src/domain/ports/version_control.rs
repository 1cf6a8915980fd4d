//! Version control port - worktree and merge operations.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Outcome of merging a branch into trunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge commit created (SHA when known).
    Merged { commit: Option<String> },
    /// Merge stopped on conflicts.
    Conflict {
        files: Vec<String>,
        details: String,
    },
}

/// Blocking version-control commands, each reporting success or failure.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether a valid worktree exists at `path`.
    async fn worktree_exists(&self, path: &str) -> DomainResult<bool>;

    /// Create a worktree at `path` on `branch`, branching from `base_ref`
    /// when the branch does not exist yet.
    async fn add_worktree(&self, path: &str, branch: &str, base_ref: &str) -> DomainResult<()>;

    /// Remove the worktree at `path`, forcing if needed.
    async fn remove_worktree(&self, path: &str) -> DomainResult<()>;

    /// Delete a local branch.
    async fn delete_branch(&self, branch: &str) -> DomainResult<()>;

    /// Number of commits on `branch` that are not on `trunk`.
    async fn commit_count(&self, branch: &str, trunk: &str) -> DomainResult<u32>;

    /// Merge `branch` into `trunk` with a merge commit (`--no-ff`).
    async fn merge_no_ff(&self, branch: &str, trunk: &str, message: &str) -> DomainResult<MergeOutcome>;

    /// Abort an in-progress merge on trunk.
    async fn abort_merge(&self) -> DomainResult<()>;
}
