//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Configuration management
//! - Logging infrastructure
//! - Git command-line adapter for the version control port
//! - Subprocess agent runtime
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod agent;
pub mod config;
pub mod git;
pub mod logging;

pub use agent::CommandAgentRuntime;
pub use git::GitCli;
