//! Backlog domain model.
//!
//! A backlog is the versioned, insertion-ordered set of tasks for one
//! track of work. Exactly one backlog is active per track.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::task::{Task, TaskStatus};
use crate::domain::models::task_graph::DependencyResolver;

/// Current backlog format tag.
pub const BACKLOG_FORMAT_VERSION: &str = "1";

/// Persisted collection of tasks for a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    pub version: String,
    pub track_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl Backlog {
    /// Build a validated backlog.
    ///
    /// Fails fast on unknown dependencies, cycles, duplicate ids and tasks
    /// without acceptance criteria; no partial backlog is ever returned.
    pub fn new(track_id: impl Into<String>, tasks: Vec<Task>) -> DomainResult<Self> {
        let now = Utc::now();
        let backlog = Self {
            version: BACKLOG_FORMAT_VERSION.to_string(),
            track_id: track_id.into(),
            created_at: now,
            updated_at: now,
            tasks,
        };
        backlog.validate()?;
        Ok(backlog)
    }

    /// Validate the task graph invariants.
    pub fn validate(&self) -> DomainResult<()> {
        DependencyResolver::new().validate_graph(&self.tasks)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.get(id).map(|t| t.status)
    }

    /// Bump `updated_at` after a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
