//! Task domain model.
//!
//! Tasks are discrete units of work handed to one agent execution each.
//! They form a DAG through `depends_on`.

use serde::{Deserialize, Serialize};

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but not yet picked up
    Pending,
    /// Task has been marked ready for dispatch
    Ready,
    /// Task is currently being executed
    InProgress,
    /// Task completed successfully
    Completed,
    /// Task failed; never unblocks dependents
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "in_progress" | "in-progress" | "running" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a task in this state may be claimed for dispatch.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Ready, Self::InProgress],
            Self::Ready => vec![Self::InProgress],
            Self::InProgress => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the work for a task is expected to land.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeHint {
    /// File path hints
    #[serde(default)]
    pub files: Vec<String>,
    /// Estimated effort (relative units, e.g. hours)
    #[serde(default)]
    pub estimated_effort: f64,
}

/// Extra guidance handed to the implementing agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub gotchas: Vec<String>,
}

impl TaskContext {
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.patterns.is_empty() && self.gotchas.is_empty()
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique within a backlog (e.g. `T01`)
    pub id: String,
    pub title: String,
    /// Free-text instructions for the implementing agent
    pub spec: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ordered list of task ids this task depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    /// Number of attempts so far; never decreases
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub scope: ScopeHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
}

impl Task {
    /// Create a new pending task with no dependencies.
    pub fn new(id: impl Into<String>, title: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            spec: spec.into(),
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            acceptance_criteria: Vec::new(),
            attempts: 0,
            scope: ScopeHint::default(),
            context: None,
        }
    }

    /// Builder: add a dependency.
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Builder: add an acceptance criterion.
    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }

    /// Builder: set the context block.
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Builder: set the scope hint.
    pub fn with_scope(mut self, files: Vec<String>, estimated_effort: f64) -> Self {
        self.scope = ScopeHint {
            files,
            estimated_effort,
        };
        self
    }

    /// Render the instructions given to the implementing agent.
    ///
    /// `spec_override` replaces the task's own spec text, e.g. with the
    /// latest stored spec version.
    pub fn render_prompt(&self, spec_override: Option<&str>) -> String {
        let mut prompt = format!("# {}: {}\n\n", self.id, self.title);
        prompt.push_str(spec_override.unwrap_or(&self.spec).trim_end());
        prompt.push_str("\n\n## Acceptance Criteria\n");
        for criterion in &self.acceptance_criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }

        if !self.scope.files.is_empty() {
            prompt.push_str("\n## Scope\n");
            for file in &self.scope.files {
                prompt.push_str(&format!("- {file}\n"));
            }
        }

        if let Some(ctx) = self.context.as_ref().filter(|c| !c.is_empty()) {
            let sections = [
                ("Constraints", &ctx.constraints),
                ("Patterns", &ctx.patterns),
                ("Gotchas", &ctx.gotchas),
            ];
            for (heading, items) in sections {
                if items.is_empty() {
                    continue;
                }
                prompt.push_str(&format!("\n## {heading}\n"));
                for item in items {
                    prompt.push_str(&format!("- {item}\n"));
                }
            }
        }

        prompt
    }
}
