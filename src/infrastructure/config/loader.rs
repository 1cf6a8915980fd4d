use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use regex::Regex;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration directory, relative to the working directory.
pub const CONFIG_DIR: &str = ".cleanroom";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "CLEANROOM_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_tasks: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrentTasks(usize),

    #[error("Invalid context budget: {0} bytes. Must be positive")]
    InvalidBudget(usize),

    #[error("Invalid drift max_growth: {0}. Must be positive")]
    InvalidDriftGrowth(f64),

    #[error("Invalid timeout for {0}: must be positive")]
    InvalidTimeout(&'static str),

    #[error("Invalid rebase threshold {0}: must be positive")]
    InvalidRebaseThreshold(&'static str),

    #[error("Invalid task_id_pattern '{pattern}': {reason}")]
    InvalidTaskIdPattern { pattern: String, reason: String },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .cleanroom/config.yaml (project config)
    /// 3. .cleanroom/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CLEANROOM_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_dir`.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Config> {
        let dir = project_dir.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent_tasks == 0 || config.max_concurrent_tasks > 64 {
            return Err(ConfigError::InvalidMaxConcurrentTasks(
                config.max_concurrent_tasks,
            ));
        }

        if config.context.budget_bytes == 0 {
            return Err(ConfigError::InvalidBudget(config.context.budget_bytes));
        }

        if let Err(e) = Regex::new(&config.context.task_id_pattern) {
            return Err(ConfigError::InvalidTaskIdPattern {
                pattern: config.context.task_id_pattern.clone(),
                reason: e.to_string(),
            });
        }

        if config.context.max_embedded_file_lines == 0 {
            return Err(ConfigError::ValidationFailed(
                "context.max_embedded_file_lines must be at least 1".to_string(),
            ));
        }

        if config.drift.max_growth.is_nan() || config.drift.max_growth <= 0.0 {
            return Err(ConfigError::InvalidDriftGrowth(config.drift.max_growth));
        }

        let timeouts = &config.timeouts;
        if timeouts.planning_secs == 0 {
            return Err(ConfigError::InvalidTimeout("planning"));
        }
        if timeouts.implementation_secs == 0 {
            return Err(ConfigError::InvalidTimeout("implementation"));
        }
        if timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout("poll_interval"));
        }

        let rebase = &config.rebase;
        if rebase.attempts == 0 {
            return Err(ConfigError::InvalidRebaseThreshold("attempts"));
        }
        if rebase.context_bytes == 0 {
            return Err(ConfigError::InvalidRebaseThreshold("context_bytes"));
        }
        if rebase.duration_secs == 0 {
            return Err(ConfigError::InvalidRebaseThreshold("duration_secs"));
        }

        if config.workspace.trunk.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "workspace.trunk cannot be empty".to_string(),
            ));
        }
        if config.workspace.root.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "workspace.root cannot be empty".to_string(),
            ));
        }
        if config.agent.program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "agent.program cannot be empty".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.context.budget_bytes, 51_200);
        assert!((config.drift.max_growth - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.timeouts.planning_secs, 600);
        assert_eq!(config.timeouts.implementation_secs, 1800);
        assert_eq!(config.workspace.trunk, "main");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
max_concurrent_tasks: 5
context:
  budget_bytes: 2048
  residue_keywords: [spike]
drift:
  max_growth: 0.25
rebase:
  attempts: 2
workspace:
  trunk: develop
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.context.budget_bytes, 2048);
        assert_eq!(config.context.residue_keywords, vec!["spike"]);
        assert_eq!(config.context.max_embedded_file_lines, 50);
        assert!((config.drift.max_growth - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.rebase.attempts, 2);
        assert_eq!(config.rebase.commits, 10);
        assert_eq!(config.workspace.trunk, "develop");
        assert_eq!(config.workspace.branch_prefix, "cleanroom/task");
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_workers() {
        let config = Config {
            max_concurrent_tasks: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrentTasks(0))
        ));
    }

    #[test]
    fn test_validate_zero_budget() {
        let mut config = Config::default();
        config.context.budget_bytes = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBudget(0))
        ));
    }

    #[test]
    fn test_validate_growth_must_be_positive() {
        let mut config = Config::default();
        config.drift.max_growth = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidDriftGrowth(_))
        ));

        config.drift.max_growth = f64::NAN;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.timeouts.implementation_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTimeout("implementation"))
        ));
    }

    #[test]
    fn test_validate_bad_task_pattern() {
        let mut config = Config::default();
        config.context.task_id_pattern = "T(".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidTaskIdPattern { pattern, .. }) => assert_eq!(pattern, "T("),
            other => panic!("Expected InvalidTaskIdPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_rebase_threshold() {
        let mut config = Config::default();
        config.rebase.attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRebaseThreshold("attempts"))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            _ => panic!("Expected InvalidLogFormat error"),
        }
    }

    #[test]
    fn test_project_files_and_env_override() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.yaml"),
            "max_concurrent_tasks: 4\nlogging:\n  level: warn\n  format: json\n",
        )
        .unwrap();
        std::fs::write(config_dir.join("local.yaml"), "max_concurrent_tasks: 6\n").unwrap();

        temp_env::with_vars(
            [
                ("CLEANROOM_LOGGING__LEVEL", Some("debug")),
                ("CLEANROOM_CONTEXT__BUDGET_BYTES", Some("4096")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.max_concurrent_tasks, 6, "local.yaml should win");
                assert_eq!(config.logging.level, "debug", "env should win");
                assert_eq!(config.logging.format, "json");
                assert_eq!(config.context.budget_bytes, 4096);
            },
        );
    }

    #[test]
    fn test_missing_project_files_use_defaults() {
        let dir = TempDir::new().unwrap();
        temp_env::with_vars_unset(["CLEANROOM_MAX_CONCURRENT_TASKS"], || {
            let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.max_concurrent_tasks, 3);
        });
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_tasks: 0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_tasks"));
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "max_concurrent_tasks: 2\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "max_concurrent_tasks: 8\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.max_concurrent_tasks, 8, "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "json", "Base value should persist");
    }
}
