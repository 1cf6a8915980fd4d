//! Git adapter for the [`VersionControl`] port.
//!
//! Every operation shells out to the `git` binary inside the configured
//! repository. Worktree paths may be relative to that repository.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{MergeOutcome, VersionControl};

/// `git` command-line adapter rooted at one repository.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_path.join(path)
        }
    }

    /// Run `git <args>` in the repository and capture its output.
    async fn git(&self, args: &[&str]) -> DomainResult<Output> {
        debug!(?args, "git");
        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::VersionControl(format!("failed to run git {}: {e}", args.join(" "))))
    }

    /// Run `git <args>` and fail with its stderr on a non-zero exit.
    async fn git_ok(&self, args: &[&str]) -> DomainResult<String> {
        let output = self.git(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(DomainError::VersionControl(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn branch_exists(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.git(&["show-ref", "--verify", "--quiet", &reference])
            .await
            .is_ok_and(|o| o.status.success())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn worktree_exists(&self, path: &str) -> DomainResult<bool> {
        let full = self.resolve(path);
        // A linked worktree carries a `.git` file, not a directory
        if !full.join(".git").exists() {
            return Ok(false);
        }

        let status = Command::new("git")
            .current_dir(&full)
            .args(["rev-parse", "--git-dir"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    async fn add_worktree(&self, path: &str, branch: &str, base_ref: &str) -> DomainResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let full = full.to_string_lossy().into_owned();

        if self.branch_exists(branch).await {
            info!(branch, "Branch already exists, attaching worktree");
            self.git_ok(&["worktree", "add", &full, branch]).await?;
        } else {
            info!(branch, base_ref, "Creating worktree on new branch");
            self.git_ok(&["worktree", "add", "-b", branch, &full, base_ref])
                .await?;
        }
        Ok(())
    }

    async fn remove_worktree(&self, path: &str) -> DomainResult<()> {
        let full = self.resolve(path).to_string_lossy().into_owned();
        if let Err(e) = self.git_ok(&["worktree", "remove", &full]).await {
            warn!(path, error = %e, "Worktree remove failed, retrying with --force");
            self.git_ok(&["worktree", "remove", "--force", &full]).await?;
        }
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> DomainResult<()> {
        if !self.branch_exists(branch).await {
            return Ok(());
        }
        // Unmerged branches of failed tasks are discarded too
        self.git_ok(&["branch", "-D", branch]).await.map(|_| ())
    }

    async fn commit_count(&self, branch: &str, trunk: &str) -> DomainResult<u32> {
        let range = format!("{trunk}..{branch}");
        let out = self.git_ok(&["rev-list", "--count", &range]).await?;
        parse_count(&out)
    }

    async fn merge_no_ff(&self, branch: &str, trunk: &str, message: &str) -> DomainResult<MergeOutcome> {
        self.git_ok(&["checkout", trunk]).await?;

        let output = self.git(&["merge", "--no-ff", "-m", message, branch]).await?;
        if output.status.success() {
            let commit = self.git_ok(&["rev-parse", "HEAD"]).await.ok();
            return Ok(MergeOutcome::Merged { commit });
        }

        let details = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
        .trim()
        .to_string();
        let unmerged = self
            .git_ok(&["diff", "--name-only", "--diff-filter=U"])
            .await
            .unwrap_or_default();
        let files = parse_file_list(&unmerged);

        if files.is_empty() && !details.contains("CONFLICT") {
            return Err(DomainError::VersionControl(format!(
                "git merge {branch} failed: {details}"
            )));
        }
        Ok(MergeOutcome::Conflict { files, details })
    }

    async fn abort_merge(&self) -> DomainResult<()> {
        self.git_ok(&["merge", "--abort"]).await.map(|_| ())
    }
}

fn parse_count(out: &str) -> DomainResult<u32> {
    out.trim()
        .parse()
        .map_err(|_| DomainError::VersionControl(format!("unexpected rev-list output: {out:?}")))
}

fn parse_file_list(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
