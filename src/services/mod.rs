pub mod backlog_scheduler;
pub mod batch_runner;
pub mod context_metrics;
pub mod drift_detector;
pub mod hygiene_verifier;
pub mod rebase_engine;
pub mod shutdown;
pub mod spec_store;
pub mod structured_merge;
pub mod task_classifier;
pub mod workspace_manager;

pub use backlog_scheduler::{BacklogProgress, BacklogScheduler};
pub use batch_runner::{BatchReport, BatchRunner, TaskOutcome};
pub use context_metrics::ContextMetricsExtractor;
pub use drift_detector::DriftDetector;
pub use hygiene_verifier::HygieneVerifier;
pub use shutdown::{ShutdownCoordinator, ShutdownSummary};
pub use spec_store::SpecStore;
pub use structured_merge::merge_plans;
pub use task_classifier::TaskKind;
pub use workspace_manager::WorkspaceManager;
