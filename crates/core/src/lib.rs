//! # editstage core
//!
//! Domain types, traits, and error definitions shared by the staged-edit
//! runtime. This crate defines the boundary every other crate implements
//! against:
//!
//! - the tool-execution capability ([`ToolExecutor`]) and its typed requests
//! - the payloads hosts observe (`loop_paused`, `diff_proposed`, `diff_applied`)
//! - the event bus that records tool calls and loop transitions

pub mod error;
pub mod event;
pub mod payload;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{LedgerError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus, EventRecord, correlation_id, extract_file_paths};
pub use payload::{
    AppliedFileChange, DiffAppliedPayload, DiffProposedPayload, FileAction, FileChange,
    LoopPausedPayload, StagedFileSummary, StopReason, TokenUsage,
};
pub use tool::{ToolExecutor, ToolKind, ToolOutcome, ToolRequest, window_lines};
