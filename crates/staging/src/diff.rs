//! Diff statistics and proposal/applied payload builders.
//!
//! The buffer only knows staged content; the original content of each path
//! comes from the caller (usually read through the real tool executor before
//! proposing). Paths missing from `originals` are treated as empty files.

use editstage_core::payload::{
    AppliedFileChange, DiffAppliedPayload, DiffProposedPayload, FileChange,
};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;

use crate::buffer::{StagedEditBuffer, StagedFile};

/// Identifiers stamped on a proposal.
#[derive(Debug, Clone)]
pub struct ProposalIds {
    pub diff_id: String,
    pub step_id: String,
    pub session_id: String,
    /// Who produced the edits, e.g. `"agent_loop"`.
    pub source: String,
}

/// Context of an apply that already happened.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    pub diff_id: String,
    pub step_id: String,
    pub session_id: String,
    pub checkpoint_id: String,
    pub iterations: u32,
    pub tool_calls: u32,
}

/// Count added and removed lines between two texts.
pub fn line_stats(old: &str, new: &str) -> (u32, u32) {
    let diff = TextDiff::from_lines(old, new);
    let mut additions = 0;
    let mut deletions = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    (additions, deletions)
}

/// Unified diff with three lines of context, or an empty string when equal.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Hex SHA-256 of file content, used as a base revision marker.
pub fn content_sha(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn file_stats(file: &StagedFile, originals: &HashMap<String, String>) -> (u32, u32) {
    let old = originals.get(&file.path).map(String::as_str).unwrap_or("");
    let new = if file.is_deleted { "" } else { file.content.as_str() };
    line_stats(old, new)
}

/// Build the `diff_proposed` payload for everything currently staged.
pub fn build_diff_proposed(
    buffer: &StagedEditBuffer,
    originals: &HashMap<String, String>,
    ids: ProposalIds,
) -> DiffProposedPayload {
    let mut total_additions = 0;
    let mut total_deletions = 0;
    let files_changed = buffer
        .all()
        .into_iter()
        .map(|file| {
            let (additions, deletions) = file_stats(file, originals);
            total_additions += additions;
            total_deletions += deletions;
            FileChange {
                path: file.path.clone(),
                action: file.action(),
                lines: additions + deletions,
            }
        })
        .collect();

    DiffProposedPayload {
        diff_id: ids.diff_id,
        step_id: ids.step_id,
        source: ids.source,
        session_id: ids.session_id,
        files_changed,
        total_additions,
        total_deletions,
    }
}

/// Build the `diff_applied` payload once the staged files reached disk.
pub fn build_diff_applied(
    buffer: &StagedEditBuffer,
    originals: &HashMap<String, String>,
    ctx: ApplyContext,
) -> DiffAppliedPayload {
    let files_changed: Vec<AppliedFileChange> = buffer
        .all()
        .into_iter()
        .map(|file| {
            let (additions, deletions) = file_stats(file, originals);
            AppliedFileChange {
                path: file.path.clone(),
                action: file.action(),
                additions,
                deletions,
            }
        })
        .collect();

    DiffAppliedPayload {
        total_additions: files_changed.iter().map(|f| f.additions).sum(),
        total_deletions: files_changed.iter().map(|f| f.deletions).sum(),
        diff_id: ctx.diff_id,
        step_id: ctx.step_id,
        session_id: ctx.session_id,
        checkpoint_id: ctx.checkpoint_id,
        iterations: ctx.iterations,
        tool_calls: ctx.tool_calls,
        files_changed,
    }
}
