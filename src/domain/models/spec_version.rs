//! Versioned task instructions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable snapshot of the instructions given for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecVersion {
    pub task_id: String,
    /// Starts at 1 and increases by one per save
    pub version: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

impl SpecVersion {
    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}

/// Deltas between two versions of the same task's spec (`b - a`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub task_id: String,
    pub from_version: u32,
    pub to_version: u32,
    pub from_size_bytes: usize,
    pub to_size_bytes: usize,
    pub size_delta_bytes: i64,
    pub time_delta_secs: i64,
}

impl VersionComparison {
    pub fn between(a: &SpecVersion, b: &SpecVersion) -> Self {
        let from_size = a.size_bytes();
        let to_size = b.size_bytes();
        Self {
            task_id: a.task_id.clone(),
            from_version: a.version,
            to_version: b.version,
            from_size_bytes: from_size,
            to_size_bytes: to_size,
            size_delta_bytes: i64::try_from(to_size).unwrap_or(i64::MAX)
                - i64::try_from(from_size).unwrap_or(i64::MAX),
            time_delta_secs: (b.created_at - a.created_at).num_seconds(),
        }
    }
}
