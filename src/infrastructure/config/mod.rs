//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Defaults, then `.cleanroom/config.yaml` and `.cleanroom/local.yaml`
//! - `CLEANROOM_*` environment variable overrides
//! - Validation into [`ConfigError`]

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
