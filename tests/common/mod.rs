//! Common test utilities for integration tests
//!
//! In-memory [`AgentRuntime`] and [`VersionControl`] fakes plus config and
//! backlog fixtures rooted in a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use cleanroom::domain::errors::{DomainError, DomainResult};
use cleanroom::domain::models::{Backlog, Config, Task};
use cleanroom::domain::ports::{
    AgentRuntime, ExecutionHandle, ExecutionStatus, MergeOutcome, TranscriptMessage, VersionControl,
};

/// How the fake agent behaves for one task.
#[derive(Debug, Clone)]
pub enum Script {
    /// Complete after `delay` with `reply` as the assistant message
    Reply { reply: String, delay: Duration },
    /// Stay running forever
    Hang,
    /// Report failure with `reply` as the transcript
    Fail { reply: String },
    /// Complete normally but never disappear on delete
    Leak,
}

struct FakeExecution {
    task_id: String,
    prompted_at: Option<Instant>,
    messages: Vec<TranscriptMessage>,
    deleted: bool,
}

/// Scripted agent runtime keyed by the task id prefix of execution titles.
#[derive(Default)]
pub struct FakeRuntime {
    scripts: Mutex<HashMap<String, Script>>,
    executions: Mutex<HashMap<ExecutionHandle, FakeExecution>>,
    next_id: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    models: Mutex<Vec<(String, String)>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, task_id: &str, script: Script) {
        self.scripts.lock().unwrap().insert(task_id.to_string(), script);
    }

    fn script_for(&self, task_id: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_else(|| Script::Reply {
                reply: format!("{task_id} implemented and committed."),
                delay: Duration::ZERO,
            })
    }

    /// Most executions prompted and not yet deleted at any one time.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Executions not deleted (or leaked).
    pub fn remaining(&self) -> usize {
        self.executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.deleted || matches!(self.script_for(&e.task_id), Script::Leak))
            .count()
    }

    /// `(task id, model)` for every created execution.
    pub fn models(&self) -> Vec<(String, String)> {
        self.models.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn create(&self, title: &str, model: &str) -> DomainResult<ExecutionHandle> {
        let task_id = title.split(':').next().unwrap_or(title).trim().to_string();
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = ExecutionHandle::new(format!("exec-{n}"));
        self.models
            .lock()
            .unwrap()
            .push((task_id.clone(), model.to_string()));
        self.executions.lock().unwrap().insert(
            handle.clone(),
            FakeExecution {
                task_id,
                prompted_at: None,
                messages: Vec::new(),
                deleted: false,
            },
        );
        Ok(handle)
    }

    async fn prompt(&self, handle: &ExecutionHandle, text: &str) -> DomainResult<()> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions
            .get_mut(handle)
            .ok_or_else(|| DomainError::AgentRuntime(format!("unknown {handle}")))?;
        execution.prompted_at = Some(Instant::now());
        execution.messages.push(TranscriptMessage::new("user", text));

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self, handle: &ExecutionHandle) -> DomainResult<Option<ExecutionStatus>> {
        let executions = self.executions.lock().unwrap();
        let Some(execution) = executions.get(handle) else {
            return Ok(None);
        };
        let script = self.script_for(&execution.task_id);
        if execution.deleted && !matches!(script, Script::Leak) {
            return Ok(None);
        }
        let Some(prompted_at) = execution.prompted_at else {
            return Ok(Some(ExecutionStatus::Idle));
        };
        Ok(Some(match script {
            Script::Reply { delay, .. } if prompted_at.elapsed() < delay => ExecutionStatus::Running,
            Script::Reply { .. } | Script::Leak => ExecutionStatus::Completed,
            Script::Hang => ExecutionStatus::Running,
            Script::Fail { .. } => ExecutionStatus::Failed,
        }))
    }

    async fn messages(&self, handle: &ExecutionHandle) -> DomainResult<Vec<TranscriptMessage>> {
        let executions = self.executions.lock().unwrap();
        let execution = executions
            .get(handle)
            .ok_or_else(|| DomainError::AgentRuntime(format!("unknown {handle}")))?;
        let mut messages = execution.messages.clone();
        match self.script_for(&execution.task_id) {
            Script::Reply { reply, .. } | Script::Fail { reply } => {
                messages.push(TranscriptMessage::new("assistant", reply));
            }
            Script::Leak => {
                messages.push(TranscriptMessage::new(
                    "assistant",
                    format!("{} done.", execution.task_id),
                ));
            }
            Script::Hang => {}
        }
        Ok(messages)
    }

    async fn delete(&self, handle: &ExecutionHandle) -> DomainResult<()> {
        if let Some(execution) = self.executions.lock().unwrap().get_mut(handle) {
            if !execution.deleted {
                execution.deleted = true;
                if execution.prompted_at.is_some() {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }
}

/// Time a fake merge spends "running", long enough for overlaps to show.
const MERGE_LATENCY: Duration = Duration::from_millis(5);

/// In-memory git: worktrees, branches and an ordered merge log.
#[derive(Default)]
pub struct FakeVcs {
    pub worktrees: Mutex<BTreeSet<String>>,
    pub branches: Mutex<BTreeSet<String>>,
    pub merged: Mutex<Vec<String>>,
    pub conflicts: Mutex<BTreeSet<String>>,
    pub aborts: AtomicUsize,
    in_merge: AtomicUsize,
    max_in_merge: AtomicUsize,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make merging `branch` stop on a conflict.
    pub fn conflict_on(&self, branch: &str) {
        self.conflicts.lock().unwrap().insert(branch.to_string());
    }

    pub fn merged(&self) -> Vec<String> {
        self.merged.lock().unwrap().clone()
    }

    pub fn worktree_count(&self) -> usize {
        self.worktrees.lock().unwrap().len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.lock().unwrap().len()
    }

    /// Most merges that were in progress at the same time.
    pub fn max_in_merge(&self) -> usize {
        self.max_in_merge.load(Ordering::SeqCst)
    }

    fn finish_merge(&self, branch: &str) -> MergeOutcome {
        if self.conflicts.lock().unwrap().contains(branch) {
            return MergeOutcome::Conflict {
                files: vec!["src/lib.rs".to_string()],
                details: "CONFLICT (content): Merge conflict in src/lib.rs".to_string(),
            };
        }
        let mut merged = self.merged.lock().unwrap();
        merged.push(branch.to_string());
        MergeOutcome::Merged {
            commit: Some(format!("{:040x}", merged.len())),
        }
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn worktree_exists(&self, path: &str) -> DomainResult<bool> {
        Ok(self.worktrees.lock().unwrap().contains(path))
    }

    async fn add_worktree(&self, path: &str, branch: &str, _base_ref: &str) -> DomainResult<()> {
        self.worktrees.lock().unwrap().insert(path.to_string());
        self.branches.lock().unwrap().insert(branch.to_string());
        Ok(())
    }

    async fn remove_worktree(&self, path: &str) -> DomainResult<()> {
        self.worktrees.lock().unwrap().remove(path);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> DomainResult<()> {
        self.branches.lock().unwrap().remove(branch);
        Ok(())
    }

    async fn commit_count(&self, _branch: &str, _trunk: &str) -> DomainResult<u32> {
        Ok(1)
    }

    async fn merge_no_ff(&self, branch: &str, _trunk: &str, _message: &str) -> DomainResult<MergeOutcome> {
        let now = self.in_merge.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_merge.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(MERGE_LATENCY).await;
        let outcome = self.finish_merge(branch);
        self.in_merge.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn abort_merge(&self) -> DomainResult<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config with every path under `dir` and fast timings.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.max_concurrent_tasks = 2;
    config.context.deletion_check_delay_ms = 0;
    config.timeouts.implementation_secs = 1;
    config.timeouts.poll_interval_ms = 10;
    config.storage.backlog_path = dir.path().join("backlog.json").display().to_string();
    config.storage.specs_dir = dir.path().join("specs").display().to_string();
    config.workspace.root = dir.path().join("worktrees").display().to_string();
    config
}

/// A task with one acceptance criterion and the given dependencies.
pub fn task(id: &str, title: &str, deps: &[&str]) -> Task {
    deps.iter().fold(
        Task::new(id, title, format!("Implement {title}.")).with_criterion("tests pass"),
        |t, dep| t.with_dependency(*dep),
    )
}

pub fn backlog(tasks: Vec<Task>) -> Backlog {
    Backlog::new("track-test", tasks).expect("valid backlog")
}
