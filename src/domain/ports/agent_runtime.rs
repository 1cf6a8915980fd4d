//! Agent runtime port - interface for the external agent execution service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Opaque identifier of one agent execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionHandle(pub String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by the runtime for a live execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Idle,
}

impl ExecutionStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Idle)
    }
}

/// One message in an execution's transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

impl TranscriptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Join a transcript into the text the hygiene gates inspect.
pub fn transcript_text(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trait for the agent execution service.
///
/// The service runs an LLM against a prompt and exposes the resulting
/// transcript. `delete` must be eventually consistent such that a later
/// `status` call returns `None`.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Create a new execution with a title and model selector.
    async fn create(&self, title: &str, model: &str) -> DomainResult<ExecutionHandle>;

    /// Send a prompt. Fire-and-forget: the response arrives asynchronously.
    async fn prompt(&self, handle: &ExecutionHandle, text: &str) -> DomainResult<()>;

    /// Current status, or `None` if the execution does not exist.
    async fn status(&self, handle: &ExecutionHandle) -> DomainResult<Option<ExecutionStatus>>;

    /// Ordered transcript of the execution.
    async fn messages(&self, handle: &ExecutionHandle) -> DomainResult<Vec<TranscriptMessage>>;

    /// Delete the execution and its remote state.
    async fn delete(&self, handle: &ExecutionHandle) -> DomainResult<()>;
}
