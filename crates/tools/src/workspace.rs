//! The workspace tool executor: real file, search, and command tools rooted at
//! one directory.

use async_trait::async_trait;
use editstage_config::WorkspaceConfig;
use editstage_core::error::ToolError;
use editstage_core::tool::{ToolExecutor, ToolOutcome, ToolRequest};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Executes tool calls against the real filesystem under `root`.
///
/// Failures the agent can act on (missing file, no match, non-zero exit) are
/// reported as a failed [`ToolOutcome`]. Policy violations, timeouts, and
/// unknown tool names are `Err`.
#[derive(Debug, Clone)]
pub struct WorkspaceTools {
    pub(crate) root: PathBuf,
    pub(crate) forbidden_paths: Vec<String>,
    pub(crate) allowed_commands: Vec<String>,
    pub(crate) command_timeout: Duration,
    pub(crate) max_search_results: usize,
}

impl WorkspaceTools {
    /// Default policy rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let config = WorkspaceConfig {
            root: root.into(),
            ..WorkspaceConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self {
            root: config.root.clone(),
            forbidden_paths: config.forbidden_paths.clone(),
            allowed_commands: config.allowed_commands.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            max_search_results: config.max_search_results.max(1),
        }
    }

    pub fn with_allowed_commands(mut self, allowed: Vec<String>) -> Self {
        self.allowed_commands = allowed;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Cap on reported matches. A cap of zero is raised to one so a search
    /// never hides its hits behind "No matches found".
    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a tool-supplied path and return where it lives on disk.
    pub(crate) fn resolve(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        editstage_security::validate_path(&self.root, path, &self.forbidden_paths).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: tool_name.into(),
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl ToolExecutor for WorkspaceTools {
    async fn execute_tool(&self, name: &str, input: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let request = match ToolRequest::parse(name, input) {
            Ok(request) => request,
            Err(msg) => return Ok(ToolOutcome::fail(msg)),
        };

        let started = Instant::now();
        let result = match request {
            ToolRequest::ReadFile(input) => self.read_file(input).await,
            ToolRequest::WriteFile(input) => self.write_file(input).await,
            ToolRequest::EditFile(input) => self.edit_file(input).await,
            ToolRequest::ListDirectory(input) => self.list_directory(input).await,
            ToolRequest::SearchFiles(input) => self.search_files(input).await,
            ToolRequest::RunCommand(input) => self.run_command(input).await,
            ToolRequest::Other { name, .. } => Err(ToolError::NotFound(name)),
        };

        debug!(
            tool = name,
            ok = result.as_ref().is_ok_and(|o| o.success),
            duration_ms = started.elapsed().as_millis() as u64,
            "Workspace tool finished"
        );
        result
    }
}
