//! Rebase advice models.
//!
//! "Rebase" here means discarding a messy task attempt and regenerating its
//! instructions from scratch instead of patching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of one finished task attempt, as seen by the rebase engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: String,
    /// Attempts made so far, including this one
    pub attempts: u32,
    /// Size of the context handed to the agent, in bytes
    pub context_size_bytes: usize,
    /// Wall-clock duration of the attempt
    pub duration_secs: u64,
    /// Raw execution log / transcript
    #[serde(default)]
    pub log: String,
    /// Commits produced on the task branch
    #[serde(default)]
    pub commit_count: u32,
    pub failed: bool,
    /// Stable name of the failure, e.g. `merge_conflict`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    /// Full error text; may quote transcript content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// The six independent signals of a messy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseIndicator {
    HighAttempts,
    LargeContext,
    LongDuration,
    ErrorPatterns,
    ManyCommits,
    TaskFailed,
}

impl RebaseIndicator {
    pub const ALL: [RebaseIndicator; 6] = [
        Self::HighAttempts,
        Self::LargeContext,
        Self::LongDuration,
        Self::ErrorPatterns,
        Self::ManyCommits,
        Self::TaskFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighAttempts => "high_attempts",
            Self::LargeContext => "large_context",
            Self::LongDuration => "long_duration",
            Self::ErrorPatterns => "error_patterns",
            Self::ManyCommits => "many_commits",
            Self::TaskFailed => "task_failed",
        }
    }
}

/// Advisory output of the rebase engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseRecommendation {
    pub task_id: String,
    pub should_rebase: bool,
    pub indicators: BTreeMap<RebaseIndicator, bool>,
    pub reason: String,
}

impl RebaseRecommendation {
    /// Indicators that fired, in stable order.
    pub fn fired(&self) -> Vec<RebaseIndicator> {
        self.indicators
            .iter()
            .filter(|(_, &on)| on)
            .map(|(&indicator, _)| indicator)
            .collect()
    }
}

/// Result of evaluating a whole batch of attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRebaseReport {
    pub analyzed: usize,
    pub recommended: usize,
    pub recommendations: Vec<RebaseRecommendation>,
}

impl BatchRebaseReport {
    /// Task ids for which a rebase is recommended.
    pub fn recommended_task_ids(&self) -> Vec<&str> {
        self.recommendations
            .iter()
            .filter(|r| r.should_rebase)
            .map(|r| r.task_id.as_str())
            .collect()
    }
}
