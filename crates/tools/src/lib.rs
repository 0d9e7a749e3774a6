//! Built-in tool implementations for editstage.
//!
//! [`WorkspaceTools`] is the real executor a [`StagedToolProvider`] delegates
//! to: it reads, writes, edits, lists, and searches files under one workspace
//! root, and runs shell commands there. Every path goes through
//! `editstage-security` before it touches disk.
//!
//! [`StagedToolProvider`]: editstage_staging::StagedToolProvider

pub mod files;
pub mod search;
pub mod shell;
pub mod workspace;

pub use workspace::WorkspaceTools;
