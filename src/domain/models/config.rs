use serde::{Deserialize, Serialize};

/// Main configuration structure for Cleanroom
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of tasks executing at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Context hygiene configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Drift detection configuration
    #[serde(default)]
    pub drift: DriftConfig,

    /// Per-phase timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Rebase heuristic thresholds
    #[serde(default)]
    pub rebase: RebaseThresholds,

    /// Workspace (git worktree) configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Persisted state locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Agent command configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_concurrent_tasks() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            context: ContextConfig::default(),
            drift: DriftConfig::default(),
            timeouts: TimeoutConfig::default(),
            rebase: RebaseThresholds::default(),
            workspace: WorkspaceConfig::default(),
            storage: StorageConfig::default(),
            agent: AgentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Context hygiene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    /// Hard ceiling on implementation-phase context, in bytes
    #[serde(default = "default_budget_bytes")]
    pub budget_bytes: usize,

    /// Extra planning-residue keywords on top of the built-in phrases
    #[serde(default = "default_residue_keywords")]
    pub residue_keywords: Vec<String>,

    /// Regex matching task identifiers inside transcripts
    #[serde(default = "default_task_id_pattern")]
    pub task_id_pattern: String,

    /// Consecutive lines after a `file:` marker that count as a full file body
    #[serde(default = "default_max_embedded_file_lines")]
    pub max_embedded_file_lines: usize,

    /// Delay before polling a deleted agent execution
    #[serde(default = "default_deletion_check_delay_ms")]
    pub deletion_check_delay_ms: u64,
}

const fn default_budget_bytes() -> usize {
    50 * 1024
}

fn default_residue_keywords() -> Vec<String> {
    vec![
        "brainstorm".to_string(),
        "rejected approach".to_string(),
        "alternatives considered".to_string(),
    ]
}

fn default_task_id_pattern() -> String {
    r"\bT\d{2,}\b".to_string()
}

const fn default_max_embedded_file_lines() -> usize {
    50
}

const fn default_deletion_check_delay_ms() -> u64 {
    2000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_budget_bytes(),
            residue_keywords: default_residue_keywords(),
            task_id_pattern: default_task_id_pattern(),
            max_embedded_file_lines: default_max_embedded_file_lines(),
            deletion_check_delay_ms: default_deletion_check_delay_ms(),
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriftConfig {
    /// Allowed growth relative to the baseline (0.5 = 50%)
    #[serde(default = "default_max_growth")]
    pub max_growth: f64,
}

const fn default_max_growth() -> f64 {
    0.5
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            max_growth: default_max_growth(),
        }
    }
}

/// Per-phase timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    #[serde(default = "default_planning_secs")]
    pub planning_secs: u64,

    #[serde(default = "default_implementation_secs")]
    pub implementation_secs: u64,

    /// Interval between agent status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_planning_secs() -> u64 {
    600
}

const fn default_implementation_secs() -> u64 {
    1800
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

impl TimeoutConfig {
    /// Timeout for a phase; anything that is not planning gets the
    /// implementation timeout.
    pub fn for_phase(&self, phase: &str) -> u64 {
        if phase.starts_with("planning") {
            self.planning_secs
        } else {
            self.implementation_secs
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            planning_secs: default_planning_secs(),
            implementation_secs: default_implementation_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Rebase heuristic thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RebaseThresholds {
    /// Fires when attempts are at or above this
    #[serde(default = "default_rebase_attempts")]
    pub attempts: u32,

    /// Fires when context size is above this
    #[serde(default = "default_rebase_context_bytes")]
    pub context_bytes: usize,

    /// Fires when duration is above this
    #[serde(default = "default_rebase_duration_secs")]
    pub duration_secs: u64,

    /// Fires when commit count is above this
    #[serde(default = "default_rebase_commits")]
    pub commits: u32,
}

const fn default_rebase_attempts() -> u32 {
    3
}

const fn default_rebase_context_bytes() -> usize {
    100_000
}

const fn default_rebase_duration_secs() -> u64 {
    1800
}

const fn default_rebase_commits() -> u32 {
    10
}

impl Default for RebaseThresholds {
    fn default() -> Self {
        Self {
            attempts: default_rebase_attempts(),
            context_bytes: default_rebase_context_bytes(),
            duration_secs: default_rebase_duration_secs(),
            commits: default_rebase_commits(),
        }
    }
}

/// Workspace (git worktree) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkspaceConfig {
    /// Repository the worktrees are created from
    #[serde(default = "default_repo_path")]
    pub repo_path: String,

    /// Directory holding per-task worktrees
    #[serde(default = "default_workspace_root")]
    pub root: String,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Branch every task merges back into
    #[serde(default = "default_trunk")]
    pub trunk: String,
}

fn default_repo_path() -> String {
    ".".to_string()
}

fn default_workspace_root() -> String {
    ".cleanroom/worktrees".to_string()
}

fn default_branch_prefix() -> String {
    "cleanroom/task".to_string()
}

fn default_trunk() -> String {
    "main".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
            root: default_workspace_root(),
            branch_prefix: default_branch_prefix(),
            trunk: default_trunk(),
        }
    }
}

/// Persisted state locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    #[serde(default = "default_backlog_path")]
    pub backlog_path: String,

    #[serde(default = "default_specs_dir")]
    pub specs_dir: String,
}

fn default_backlog_path() -> String {
    ".cleanroom/backlog.json".to_string()
}

fn default_specs_dir() -> String {
    ".cleanroom/specs".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backlog_path: default_backlog_path(),
            specs_dir: default_specs_dir(),
        }
    }
}

/// External agent command used by `cleanroom run`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Executable, looked up on PATH
    #[serde(default = "default_agent_program")]
    pub program: String,

    /// Arguments placed before the model flag; the prompt goes to stdin
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Flag that receives the model selector
    #[serde(default = "default_model_flag")]
    pub model_flag: String,
}

fn default_agent_program() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_model_flag() -> String {
    "--model".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            args: default_agent_args(),
            model_flag: default_model_flag(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
