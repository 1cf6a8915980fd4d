//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - AgentRuntime: the external agent execution service
//! - VersionControl: worktree and merge commands
//!
//! These traits define the contracts that allow the domain to be independent
//! of specific infrastructure implementations.

pub mod agent_runtime;
pub mod version_control;

pub use agent_runtime::{
    transcript_text, AgentRuntime, ExecutionHandle, ExecutionStatus, TranscriptMessage,
};
pub use version_control::{MergeOutcome, VersionControl};
