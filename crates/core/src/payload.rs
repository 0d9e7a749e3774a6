//! Externally observable payload shapes.
//!
//! These are produced by the staging and session layers and consumed by
//! whatever hosts the loop (event log, UI, persistence). Field names are
//! part of the wire contract and serialize in `snake_case`.

use serde::{Deserialize, Serialize};

/// What applying a staged file would do on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One row of a staged-buffer summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFileSummary {
    pub path: String,
    pub action: FileAction,
    pub edit_count: u32,
}

/// Cumulative LLM token usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

/// Why an agent run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    MaxTokens,
    EndTurn,
    Error,
    UserStop,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::MaxTokens => write!(f, "max_tokens"),
            Self::EndTurn => write!(f, "end_turn"),
            Self::Error => write!(f, "error"),
            Self::UserStop => write!(f, "user_stop"),
        }
    }
}

/// Emitted when a loop run pauses and the user may choose to continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPausedPayload {
    pub session_id: String,
    pub task_id: String,
    pub step_id: String,
    pub reason: Option<StopReason>,
    pub iteration_count: u32,
    pub continue_count: u32,
    pub max_continues: u32,
    pub can_continue: bool,
    pub remaining_continues: u32,
    pub staged_files: Vec<StagedFileSummary>,
    pub staged_files_count: usize,
    pub total_tokens: TokenUsage,
    pub final_text: String,
    pub tool_calls_count: u32,
}

/// Per-file row of a proposed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    /// Changed lines (additions + deletions).
    pub lines: u32,
}

/// Emitted when staged edits are offered for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffProposedPayload {
    pub diff_id: String,
    pub step_id: String,
    pub source: String,
    pub session_id: String,
    pub files_changed: Vec<FileChange>,
    pub total_additions: u32,
    pub total_deletions: u32,
}

/// Per-file row of an applied diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFileChange {
    pub path: String,
    pub action: FileAction,
    pub additions: u32,
    pub deletions: u32,
}

/// Emitted after approved edits were written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffAppliedPayload {
    pub diff_id: String,
    pub step_id: String,
    pub session_id: String,
    pub checkpoint_id: String,
    pub iterations: u32,
    pub tool_calls: u32,
    pub files_changed: Vec<AppliedFileChange>,
    pub total_additions: u32,
    pub total_deletions: u32,
}
