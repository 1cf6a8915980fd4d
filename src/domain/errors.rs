//! Domain errors for the Cleanroom orchestrator.

use std::collections::BTreeSet;

use thiserror::Error;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

fn format_id_set(ids: &BTreeSet<String>) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Domain-level errors that can occur in the Cleanroom system.
///
/// Every variant aborts at most a single task attempt; the scheduler and
/// execution manager keep processing other ready tasks.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<String>),

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("Duplicate task id in backlog: {0}")]
    DuplicateTaskId(String),

    #[error("Task {0} has no acceptance criteria")]
    EmptyAcceptanceCriteria(String),

    #[error("Context budget exceeded: {size_bytes} bytes > {budget_bytes} byte budget")]
    ContextBudgetExceeded { size_bytes: usize, budget_bytes: usize },

    #[error("Planning residue detected: {hits} hit(s) [{}]", .phrases.join(", "))]
    PlanningResidueDetected { hits: usize, phrases: Vec<String> },

    #[error("Cross-task contamination: expected exactly one task id, found {} ({})", .task_ids.len(), format_id_set(.task_ids))]
    CrossTaskContamination { task_ids: BTreeSet<String> },

    #[error("Full file embedding detected: {lines} consecutive lines after a file marker (max {max_lines})")]
    FullFileEmbeddingDetected { lines: usize, max_lines: usize },

    #[error("Context drift exceeded for {task_id}/{phase}: {baseline_bytes} -> {current_bytes} bytes ({growth_percent:.1}% growth, max {max_percent:.1}%)")]
    ContextDriftExceeded {
        task_id: String,
        phase: String,
        baseline_bytes: usize,
        current_bytes: usize,
        growth_percent: f64,
        max_percent: f64,
    },

    #[error("Agent execution {handle} still present after deletion")]
    SessionLeak { handle: String },

    #[error("Task {task_id} timed out after {timeout_secs}s in phase {phase}")]
    TaskExecutionTimeout {
        task_id: String,
        phase: String,
        timeout_secs: u64,
    },

    #[error("Merge conflict merging {branch} for task {task_id}: {details}")]
    MergeConflict {
        task_id: String,
        branch: String,
        details: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Spec version {version} not found for task {task_id}")]
    SpecVersionNotFound { task_id: String, version: u32 },

    #[error("Agent execution failed: {0}")]
    AgentExecutionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Version control error: {0}")]
    VersionControl(String),

    #[error("Agent runtime error: {0}")]
    AgentRuntime(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Short stable name of the variant, used in batch reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DependencyCycle(_) => "dependency_cycle",
            Self::UnknownDependency { .. } => "unknown_dependency",
            Self::DuplicateTaskId(_) => "duplicate_task_id",
            Self::EmptyAcceptanceCriteria(_) => "empty_acceptance_criteria",
            Self::ContextBudgetExceeded { .. } => "context_budget_exceeded",
            Self::PlanningResidueDetected { .. } => "planning_residue_detected",
            Self::CrossTaskContamination { .. } => "cross_task_contamination",
            Self::FullFileEmbeddingDetected { .. } => "full_file_embedding_detected",
            Self::ContextDriftExceeded { .. } => "context_drift_exceeded",
            Self::SessionLeak { .. } => "session_leak",
            Self::TaskExecutionTimeout { .. } => "task_execution_timeout",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::TaskNotFound(_) => "task_not_found",
            Self::SpecVersionNotFound { .. } => "spec_version_not_found",
            Self::AgentExecutionFailed(_) => "agent_execution_failed",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::VersionControl(_) => "version_control",
            Self::AgentRuntime(_) => "agent_runtime",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether this error came from one of the context hygiene gates.
    pub fn is_hygiene_violation(&self) -> bool {
        matches!(
            self,
            Self::ContextBudgetExceeded { .. }
                | Self::PlanningResidueDetected { .. }
                | Self::CrossTaskContamination { .. }
                | Self::FullFileEmbeddingDetected { .. }
                | Self::ContextDriftExceeded { .. }
        )
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
