//! Configuration loading, validation, and management for editstage.
//!
//! Loads configuration from `~/.editstage/config.toml` with environment
//! variable overrides. Validates all settings before handing them out.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.editstage/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditstageConfig {
    /// Agent loop budgets
    #[serde(default, rename = "loop")]
    pub agent_loop: LoopConfig,

    /// Chunked edit retry policy
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Real tool executor policy
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// How many times the user may continue a paused run
    #[serde(default = "default_max_continues")]
    pub max_continues: u32,

    #[serde(default = "default_max_iterations_per_run")]
    pub max_iterations_per_run: u32,

    /// Input + output tokens across all runs of one session
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: u64,
}

fn default_max_continues() -> u32 {
    3
}
fn default_max_iterations_per_run() -> u32 {
    10
}
fn default_max_total_tokens() -> u64 {
    4_000_000
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_continues: default_max_continues(),
            max_iterations_per_run: default_max_iterations_per_run(),
            max_total_tokens: default_max_total_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_max_attempts_per_file")]
    pub max_attempts_per_file: u32,

    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u32,
}

fn default_max_attempts_per_file() -> u32 {
    2
}
fn default_max_total_chunks() -> u32 {
    10
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_file: default_max_attempts_per_file(),
            max_total_chunks: default_max_total_chunks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory all file tools are rooted at
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Root-relative prefixes no tool may touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// If non-empty, only these base commands may run
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_forbidden_paths() -> Vec<String> {
    vec![".git".into()]
}
fn default_command_timeout_secs() -> u64 {
    60
}
fn default_max_search_results() -> usize {
    200
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            forbidden_paths: default_forbidden_paths(),
            allowed_commands: vec![],
            command_timeout_secs: default_command_timeout_secs(),
            max_search_results: default_max_search_results(),
        }
    }
}

impl EditstageConfig {
    /// Load configuration from the default location.
    ///
    /// Environment overrides (highest priority):
    /// - `EDITSTAGE_MAX_CONTINUES`
    /// - `EDITSTAGE_MAX_ITERATIONS_PER_RUN`
    /// - `EDITSTAGE_MAX_TOTAL_TOKENS`
    /// - `EDITSTAGE_WORKSPACE_ROOT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("EDITSTAGE_MAX_CONTINUES") {
            self.agent_loop.max_continues = parse_env("EDITSTAGE_MAX_CONTINUES", &v)?;
        }
        if let Some(v) = lookup("EDITSTAGE_MAX_ITERATIONS_PER_RUN") {
            self.agent_loop.max_iterations_per_run =
                parse_env("EDITSTAGE_MAX_ITERATIONS_PER_RUN", &v)?;
        }
        if let Some(v) = lookup("EDITSTAGE_MAX_TOTAL_TOKENS") {
            self.agent_loop.max_total_tokens = parse_env("EDITSTAGE_MAX_TOTAL_TOKENS", &v)?;
        }
        if let Some(root) = lookup("EDITSTAGE_WORKSPACE_ROOT") {
            self.workspace.root = PathBuf::from(root);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_loop.max_iterations_per_run == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations_per_run must be > 0".into(),
            ));
        }
        if self.agent_loop.max_total_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_total_tokens must be > 0".into(),
            ));
        }
        if self.ledger.max_attempts_per_file == 0 {
            return Err(ConfigError::ValidationError(
                "ledger.max_attempts_per_file must be > 0".into(),
            ));
        }
        if self.ledger.max_total_chunks == 0 {
            return Err(ConfigError::ValidationError(
                "ledger.max_total_chunks must be > 0".into(),
            ));
        }
        if self.workspace.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "workspace.command_timeout_secs must be > 0".into(),
            ));
        }
        if self.workspace.max_search_results == 0 {
            return Err(ConfigError::ValidationError(
                "workspace.max_search_results must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".editstage")
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
