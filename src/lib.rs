//! Cleanroom - dependency-aware agent task orchestrator
//!
//! Cleanroom runs a backlog of small tasks through an external coding agent,
//! each inside its own git worktree, with context hygiene gates before and
//! after every attempt.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the port traits
//! - **Service Layer** (`services`): Scheduling, execution, hygiene gates, merge and rebase logic
//! - **Infrastructure Layer** (`infrastructure`): Config, logging, git and agent adapters
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use cleanroom::{BacklogScheduler, ConfigLoader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let scheduler = BacklogScheduler::load(&config.storage.backlog_path).await?;
//!     for task in scheduler.get_ready_tasks() {
//!         println!("{} is ready", task.id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Backlog, Config, ContextMetrics, ExecutionResult, RebaseRecommendation, SpecVersion, Task,
    TaskStatus, Workspace,
};
pub use domain::ports::{AgentRuntime, ExecutionHandle, ExecutionStatus, VersionControl};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BacklogScheduler, BatchReport, BatchRunner, DriftDetector, HygieneVerifier, ShutdownCoordinator,
    SpecStore, WorkspaceManager,
};
