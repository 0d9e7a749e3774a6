//! Security policy for editstage's real tool executor.
//!
//! Provides:
//! - **Path validation**: every file tool stays inside the workspace root
//! - **Command allowlist**: `run_command` only runs approved base commands

pub mod command;
pub mod path;

pub use command::{CommandPolicyError, check_command};
pub use path::{
    PathValidationError, forbidden_match, normalize_path, relative_display, validate_path,
};
