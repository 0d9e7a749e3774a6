//! Staged editing for editstage agents.
//!
//! An agent proposes file mutations that are held in memory until a human
//! approves them:
//!
//! - [`StagedEditBuffer`] holds the pending content per path
//! - [`StagedToolProvider`] puts the buffer in front of a real tool executor
//! - [`diff`] turns staged work into `diff_proposed` / `diff_applied` payloads

pub mod buffer;
pub mod diff;
pub mod provider;

pub use buffer::{
    EditError, StagedBufferSnapshot, StagedEditBuffer, StagedFile, StagedFileSnapshot, replace_unique,
};
pub use diff::{ApplyContext, ProposalIds, build_diff_applied, build_diff_proposed};
pub use provider::StagedToolProvider;
