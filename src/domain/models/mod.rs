//! Domain models for the Cleanroom orchestrator.

pub mod backlog;
pub mod config;
pub mod context;
pub mod rebase;
pub mod spec_version;
pub mod task;
pub mod task_graph;
pub mod workspace;

pub use backlog::{Backlog, BACKLOG_FORMAT_VERSION};
pub use config::{
    AgentConfig, Config, ContextConfig, DriftConfig, LoggingConfig, RebaseThresholds, StorageConfig,
    TimeoutConfig, WorkspaceConfig,
};
pub use context::ContextMetrics;
pub use rebase::{BatchRebaseReport, ExecutionResult, RebaseIndicator, RebaseRecommendation};
pub use spec_version::{SpecVersion, VersionComparison};
pub use task::{ScopeHint, Task, TaskContext, TaskStatus};
pub use task_graph::DependencyResolver;
pub use workspace::{Workspace, WorkspaceStatus};
