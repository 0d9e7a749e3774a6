//! Error types for the editstage domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; callers match on the one
//! their operation returns.
//!
//! Note that most agent-facing failures (missing tool parameters, ambiguous
//! edits, failed disk reads during an edit) are *not* errors at this level:
//! they travel as `ToolOutcome { success: false, .. }` values. The types here
//! cover infrastructure failures and precondition violations.

use thiserror::Error;

/// Failures of a tool executor itself, as opposed to a tool call that
/// ran and reported `success: false`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

/// Precondition violations on the edit-attempt ledger.
///
/// These indicate an orchestrator bug (the target file list and the path
/// being marked disagree) and are never expected during normal control flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Unknown path in edit ledger: {0}")]
    UnknownPath(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted record {id}: {reason}")]
    Corrupted { id: String, reason: String },
}
