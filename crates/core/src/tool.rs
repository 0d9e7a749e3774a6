//! Tool boundary: the capability every file-tool executor exposes.
//!
//! The agent loop hands tool calls to a [`ToolExecutor`] by name with a JSON
//! input. Executors can be stacked: the staged overlay in `editstage-staging`
//! wraps a real executor and intercepts mutations.
//!
//! Inputs arrive untyped from the LLM, so [`ToolRequest::parse`] turns the
//! known shapes into typed structs and keeps everything else as an
//! open-ended passthrough.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ToolError;

pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const READ_FILE: &str = "read_file";
pub const RUN_COMMAND: &str = "run_command";
pub const SEARCH_FILES: &str = "search_files";
pub const LIST_DIRECTORY: &str = "list_directory";

/// The result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool did what was asked
    pub success: bool,

    /// Output text on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Human-readable failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The error message, or a generic placeholder when the executor gave none.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Anything that can execute file tools by name.
///
/// `Err` is reserved for executor infrastructure failures. A tool that ran
/// and failed (file missing, bad input) reports `Ok(ToolOutcome::fail(..))`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(&self, name: &str, input: &Value) -> Result<ToolOutcome, ToolError>;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute_tool(&self, name: &str, input: &Value) -> Result<ToolOutcome, ToolError> {
        (**self).execute_tool(name, input).await
    }
}

/// Which tool a call names, before its input is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    WriteFile,
    EditFile,
    ReadFile,
    RunCommand,
    SearchFiles,
    ListDirectory,
    Other,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            WRITE_FILE => Self::WriteFile,
            EDIT_FILE => Self::EditFile,
            READ_FILE => Self::ReadFile,
            RUN_COMMAND => Self::RunCommand,
            SEARCH_FILES => Self::SearchFiles,
            LIST_DIRECTORY => Self::ListDirectory,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFileInput {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFileInput {
    pub path: String,
    pub old_text: String,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFileInput {
    pub path: String,
    pub offset: Option<usize>,
    pub max_lines: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommandInput {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilesInput {
    pub pattern: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDirectoryInput {
    pub path: Option<String>,
}

/// A tool call with its input decoded into the shape its name implies.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    WriteFile(WriteFileInput),
    EditFile(EditFileInput),
    ReadFile(ReadFileInput),
    RunCommand(RunCommandInput),
    SearchFiles(SearchFilesInput),
    ListDirectory(ListDirectoryInput),
    /// A tool this crate does not know; the input is kept verbatim.
    Other { name: String, input: Value },
}

impl ToolRequest {
    /// Decode a named call. The error is the agent-facing validation message.
    pub fn parse(name: &str, input: &Value) -> Result<Self, String> {
        Ok(match ToolKind::from_name(name) {
            ToolKind::WriteFile => Self::WriteFile(WriteFileInput::from_value(input)?),
            ToolKind::EditFile => Self::EditFile(EditFileInput::from_value(input)?),
            ToolKind::ReadFile => Self::ReadFile(ReadFileInput::from_value(input)?),
            ToolKind::RunCommand => Self::RunCommand(RunCommandInput {
                command: required_str(input, "command")?,
            }),
            ToolKind::SearchFiles => Self::SearchFiles(SearchFilesInput {
                pattern: required_str(input, "pattern")?,
                path: optional_str(input, "path"),
            }),
            ToolKind::ListDirectory => Self::ListDirectory(ListDirectoryInput {
                path: optional_str(input, "path"),
            }),
            ToolKind::Other => Self::Other {
                name: name.to_string(),
                input: input.clone(),
            },
        })
    }
}

impl WriteFileInput {
    pub fn from_value(input: &Value) -> Result<Self, String> {
        Ok(Self {
            path: required_str(input, "path")?,
            content: required_text(input, "content")?,
        })
    }
}

impl EditFileInput {
    pub fn from_value(input: &Value) -> Result<Self, String> {
        Ok(Self {
            path: required_str(input, "path")?,
            old_text: required_str(input, "old_text")?,
            new_text: required_text(input, "new_text")?,
        })
    }
}

impl ReadFileInput {
    pub fn from_value(input: &Value) -> Result<Self, String> {
        Ok(Self {
            path: required_str(input, "path")?,
            offset: optional_usize(input, "offset"),
            max_lines: optional_usize(input, "max_lines"),
        })
    }
}

/// Message used for every missing or empty required field.
pub fn missing_parameter(name: &str) -> String {
    format!("Missing required parameter: {name}")
}

/// A required, non-empty string field.
fn required_str(input: &Value, key: &str) -> Result<String, String> {
    match input.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(missing_parameter(key)),
    }
}

/// A required string field where the empty string is meaningful content.
fn required_text(input: &Value, key: &str) -> Result<String, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing_parameter(key))
}

fn optional_str(input: &Value, key: &str) -> Option<String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_usize(input: &Value, key: &str) -> Option<usize> {
    input
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
}

/// Apply read windowing: split on `\n`, skip `offset` lines (0-based), then
/// keep at most `max_lines`. Shared by the real executor and the staged overlay.
pub fn window_lines(content: &str, offset: Option<usize>, max_lines: Option<usize>) -> String {
    if offset.is_none() && max_lines.is_none() {
        return content.to_string();
    }
    let lines = content.split('\n').skip(offset.unwrap_or(0));
    let selected: Vec<&str> = match max_lines {
        Some(max) => lines.take(max).collect(),
        None => lines.collect(),
    };
    selected.join("\n")
}
