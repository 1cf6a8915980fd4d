//! Subprocess agent runtime.
//!
//! Implements [`AgentRuntime`] by running a local agent CLI (by default
//! `claude --print --model <model>`) once per prompt. The prompt is written
//! to stdin and stdout becomes the assistant message. Executions are
//! in-memory; deleting one kills its process and forgets its transcript.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentConfig, Workspace, WorkspaceConfig};
use crate::domain::ports::{AgentRuntime, ExecutionHandle, ExecutionStatus, TranscriptMessage};

struct Execution {
    model: String,
    working_dir: PathBuf,
    status: ExecutionStatus,
    messages: Vec<TranscriptMessage>,
    process: Option<JoinHandle<()>>,
}

type Executions = Arc<Mutex<HashMap<ExecutionHandle, Execution>>>;

/// Agent runtime backed by a local command.
pub struct CommandAgentRuntime {
    agent: AgentConfig,
    workspace: WorkspaceConfig,
    executions: Executions,
}

impl CommandAgentRuntime {
    pub fn new(agent: AgentConfig, workspace: WorkspaceConfig) -> Self {
        Self {
            agent,
            workspace,
            executions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Directory the agent runs in.
    ///
    /// Titles start with `<task id>:`; when that task's worktree exists the
    /// agent runs inside it, otherwise in the repository root.
    fn working_dir_for(&self, title: &str) -> PathBuf {
        let repo = Path::new(&self.workspace.repo_path);
        let Some((task_id, _)) = title.split_once(':') else {
            return repo.to_path_buf();
        };
        let worktree = repo.join(Workspace::path_for_task(&self.workspace.root, task_id.trim()));
        if worktree.is_dir() {
            worktree
        } else {
            repo.to_path_buf()
        }
    }

    fn build_command(&self, model: &str, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.agent.program);
        cmd.current_dir(working_dir)
            .args(&self.agent.args)
            .arg(&self.agent.model_flag)
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl std::fmt::Debug for CommandAgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAgentRuntime")
            .field("program", &self.agent.program)
            .finish_non_exhaustive()
    }
}

/// Run one prompt to completion and return `(success, output)`.
async fn run_prompt(mut cmd: Command, prompt: String) -> (bool, String) {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return (false, format!("failed to spawn agent: {e}")),
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            return (false, format!("failed to write prompt: {e}"));
        }
        // Dropping stdin closes it so the agent sees end of input
    }

    match child.wait_with_output().await {
        Ok(output) if output.status.success() => {
            (true, String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => (
            false,
            format!(
                "agent exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ),
        Err(e) => (false, format!("failed to wait for agent: {e}")),
    }
}

#[async_trait]
impl AgentRuntime for CommandAgentRuntime {
    async fn create(&self, title: &str, model: &str) -> DomainResult<ExecutionHandle> {
        let handle = ExecutionHandle::new(Uuid::new_v4().to_string());
        let execution = Execution {
            model: model.to_string(),
            working_dir: self.working_dir_for(title),
            status: ExecutionStatus::Idle,
            messages: Vec::new(),
            process: None,
        };
        debug!(handle = %handle, title, dir = %execution.working_dir.display(), "Execution created");
        self.executions.lock().await.insert(handle.clone(), execution);
        Ok(handle)
    }

    async fn prompt(&self, handle: &ExecutionHandle, text: &str) -> DomainResult<()> {
        let mut executions = self.executions.lock().await;
        let execution = executions
            .get_mut(handle)
            .ok_or_else(|| DomainError::AgentRuntime(format!("unknown execution {handle}")))?;
        if execution.status == ExecutionStatus::Running {
            return Err(DomainError::AgentRuntime(format!(
                "execution {handle} is already running"
            )));
        }

        execution.messages.push(TranscriptMessage::new("user", text));
        execution.status = ExecutionStatus::Running;

        let cmd = self.build_command(&execution.model, &execution.working_dir);
        let prompt = text.to_string();
        let executions_ref = Arc::clone(&self.executions);
        let key = handle.clone();
        execution.process = Some(tokio::spawn(async move {
            let (success, output) = run_prompt(cmd, prompt).await;
            let mut executions = executions_ref.lock().await;
            // Deleted while running
            let Some(execution) = executions.get_mut(&key) else {
                return;
            };
            if success {
                execution.messages.push(TranscriptMessage::new("assistant", output));
                execution.status = ExecutionStatus::Completed;
            } else {
                warn!(handle = %key, error = %output, "Agent command failed");
                execution.messages.push(TranscriptMessage::new("system", output));
                execution.status = ExecutionStatus::Failed;
            }
            execution.process = None;
        }));
        Ok(())
    }

    async fn status(&self, handle: &ExecutionHandle) -> DomainResult<Option<ExecutionStatus>> {
        Ok(self.executions.lock().await.get(handle).map(|e| e.status))
    }

    async fn messages(&self, handle: &ExecutionHandle) -> DomainResult<Vec<TranscriptMessage>> {
        self.executions
            .lock()
            .await
            .get(handle)
            .map(|e| e.messages.clone())
            .ok_or_else(|| DomainError::AgentRuntime(format!("unknown execution {handle}")))
    }

    async fn delete(&self, handle: &ExecutionHandle) -> DomainResult<()> {
        if let Some(execution) = self.executions.lock().await.remove(handle) {
            if let Some(process) = execution.process {
                // Aborting drops the child, which kills it
                process.abort();
            }
            debug!(handle = %handle, "Execution deleted");
        }
        Ok(())
    }
}
