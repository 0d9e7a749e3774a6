//! Edit-attempt ledger: retry and chunk caps for a chunked multi-file edit.
//!
//! A step that edits several files one chunk at a time registers its target
//! files here. The ledger hands out the next file to work on (untried files
//! before retries), counts attempts, and tells the caller when to stop so
//! truncation or repeated failures cannot loop forever. It never retries by
//! itself; the decision stays with the caller.

use editstage_config::LedgerConfig;
use editstage_core::error::LedgerError;
use editstage_core::payload::FileAction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS_PER_FILE: u32 = 2;
pub const DEFAULT_MAX_TOTAL_CHUNKS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAttemptStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    InProgress,
    Completed,
    Paused,
    Failed,
}

/// A file the step intends to edit, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub path: String,
    pub reason: String,
}

impl TargetFile {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The diff a finished chunk produced for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDiff {
    pub unified_diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEditAttempt {
    pub path: String,
    pub reason: String,
    pub status: FileAttemptStatus,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub completed_diff: Option<CompletedDiff>,
}

/// Full serializable ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditAttemptLedgerState {
    pub files: Vec<FileEditAttempt>,
    pub total_chunks_attempted: u32,
    pub max_attempts_per_file: u32,
    pub max_total_chunks: u32,
    pub status: LedgerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOptions {
    pub max_attempts_per_file: u32,
    pub max_total_chunks: u32,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            max_attempts_per_file: DEFAULT_MAX_ATTEMPTS_PER_FILE,
            max_total_chunks: DEFAULT_MAX_TOTAL_CHUNKS,
        }
    }
}

impl From<&LedgerConfig> for LedgerOptions {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_attempts_per_file: config.max_attempts_per_file,
            max_total_chunks: config.max_total_chunks,
        }
    }
}

/// A completed file ready for the apply step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchedFile {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,
}

/// Per-status file counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProgress {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Per-step bookkeeping of chunked edit attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditAttemptLedger {
    state: EditAttemptLedgerState,
}

impl EditAttemptLedger {
    /// Register target files, all `Pending`. Empty and repeated paths are dropped.
    pub fn new(targets: Vec<TargetFile>, options: LedgerOptions) -> Self {
        let mut seen = HashSet::new();
        let mut files = Vec::with_capacity(targets.len());
        for target in targets {
            if target.path.is_empty() || !seen.insert(target.path.clone()) {
                warn!(path = %target.path, "Ignoring empty or duplicate ledger target");
                continue;
            }
            files.push(FileEditAttempt {
                path: target.path,
                reason: target.reason,
                status: FileAttemptStatus::Pending,
                attempts: 0,
                last_error: None,
                skip_reason: None,
                completed_diff: None,
            });
        }

        Self {
            state: EditAttemptLedgerState {
                files,
                total_chunks_attempted: 0,
                max_attempts_per_file: options.max_attempts_per_file,
                max_total_chunks: options.max_total_chunks,
                status: LedgerStatus::Pending,
            },
        }
    }

    /// Restore from a previously exported state, trusting it as-is.
    pub fn from_state(state: EditAttemptLedgerState) -> Self {
        let mut ledger = Self::new(Vec::new(), LedgerOptions::default());
        ledger.state = state;
        ledger
    }

    pub fn state(&self) -> &EditAttemptLedgerState {
        &self.state
    }

    pub fn files(&self) -> &[FileEditAttempt] {
        &self.state.files
    }

    pub fn get(&self, path: &str) -> Option<&FileEditAttempt> {
        self.state.files.iter().find(|f| f.path == path)
    }

    pub fn status(&self) -> LedgerStatus {
        self.state.status
    }

    /// Record an external decision about the step (pause, failure, ...).
    pub fn set_status(&mut self, status: LedgerStatus) {
        debug!(?status, "Ledger status set");
        self.state.status = status;
    }

    pub fn total_chunks_attempted(&self) -> u32 {
        self.state.total_chunks_attempted
    }

    fn chunk_budget_spent(&self) -> bool {
        self.state.total_chunks_attempted >= self.state.max_total_chunks
    }

    /// The next file to work on: untried files first, then retriable failures.
    /// `None` once the chunk budget is spent.
    pub fn next_file(&self) -> Option<&FileEditAttempt> {
        if self.chunk_budget_spent() {
            return None;
        }
        let files = &self.state.files;
        files
            .iter()
            .find(|f| f.status == FileAttemptStatus::Pending)
            .or_else(|| {
                files.iter().find(|f| {
                    f.status == FileAttemptStatus::Failed
                        && f.attempts < self.state.max_attempts_per_file
                })
            })
    }

    fn file_mut(&mut self, path: &str) -> Result<&mut FileEditAttempt, LedgerError> {
        self.state
            .files
            .iter_mut()
            .find(|f| f.path == path)
            .ok_or_else(|| LedgerError::UnknownPath(path.to_string()))
    }

    /// Start a chunk: counts one attempt for the file and one chunk overall.
    pub fn mark_in_progress(&mut self, path: &str) -> Result<(), LedgerError> {
        let file = self.file_mut(path)?;
        file.status = FileAttemptStatus::InProgress;
        file.attempts += 1;
        let attempts = file.attempts;
        self.state.total_chunks_attempted += 1;
        self.state.status = LedgerStatus::InProgress;
        debug!(
            path,
            attempts,
            total_chunks = self.state.total_chunks_attempted,
            "Chunk started"
        );
        Ok(())
    }

    pub fn mark_done(&mut self, path: &str, result: CompletedDiff) -> Result<(), LedgerError> {
        let file = self.file_mut(path)?;
        file.status = FileAttemptStatus::Done;
        file.completed_diff = Some(result);
        file.last_error = None;
        debug!(path, "Chunk done");
        Ok(())
    }

    /// Record a failed chunk. Attempts were already counted when it started.
    pub fn mark_failed(&mut self, path: &str, error: impl Into<String>) -> Result<(), LedgerError> {
        let file = self.file_mut(path)?;
        file.status = FileAttemptStatus::Failed;
        let error = error.into();
        warn!(path, attempts = file.attempts, error = %error, "Chunk failed");
        file.last_error = Some(error);
        Ok(())
    }

    pub fn mark_skipped(&mut self, path: &str, reason: Option<String>) -> Result<(), LedgerError> {
        let file = self.file_mut(path)?;
        file.status = FileAttemptStatus::Skipped;
        file.skip_reason = reason;
        debug!(path, "File skipped");
        Ok(())
    }

    /// A human-readable reason to pause, if the step should stop here.
    pub fn should_pause(&self) -> Option<String> {
        let pending = self
            .state
            .files
            .iter()
            .filter(|f| f.status == FileAttemptStatus::Pending)
            .count();
        if self.chunk_budget_spent() && pending > 0 {
            return Some(format!(
                "Chunk budget exhausted ({}/{} chunks) with {pending} file(s) still pending",
                self.state.total_chunks_attempted, self.state.max_total_chunks
            ));
        }

        self.state
            .files
            .iter()
            .find(|f| {
                f.status == FileAttemptStatus::Failed
                    && f.attempts >= self.state.max_attempts_per_file
            })
            .map(|f| {
                format!(
                    "{} failed after {} attempt(s): {}",
                    f.path,
                    f.attempts,
                    f.last_error.as_deref().unwrap_or("unknown error")
                )
            })
    }

    /// Every file is done or skipped.
    pub fn is_complete(&self) -> bool {
        self.state.files.iter().all(|f| {
            matches!(
                f.status,
                FileAttemptStatus::Done | FileAttemptStatus::Skipped
            )
        })
    }

    /// Settle the ledger status after a chunk: `Completed` when every file is
    /// finished, `Paused` when [`Self::should_pause`] has a reason.
    pub fn finalize(&mut self) -> LedgerStatus {
        if self.is_complete() {
            self.state.status = LedgerStatus::Completed;
            info!(files = self.state.files.len(), "Edit ledger completed");
        } else if let Some(reason) = self.should_pause() {
            self.state.status = LedgerStatus::Paused;
            info!(%reason, "Edit ledger paused");
        }
        self.state.status
    }

    fn completed(&self) -> impl Iterator<Item = (&FileEditAttempt, &CompletedDiff)> {
        self.state.files.iter().filter_map(|f| match (&f.status, &f.completed_diff) {
            (FileAttemptStatus::Done, Some(diff)) => Some((f, diff)),
            _ => None,
        })
    }

    /// All completed unified diffs joined by newlines, skipping empty ones.
    pub fn combined_diff(&self) -> String {
        self.completed()
            .map(|(_, diff)| diff.unified_diff.as_str())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn touched_files(&self) -> Vec<TouchedFile> {
        self.completed()
            .map(|(f, diff)| TouchedFile {
                path: f.path.clone(),
                action: diff.action,
                new_content: diff.new_content.clone(),
                base_sha: diff.base_sha.clone(),
            })
            .collect()
    }

    pub fn progress(&self) -> LedgerProgress {
        let mut progress = LedgerProgress {
            total: self.state.files.len(),
            ..Default::default()
        };
        for file in &self.state.files {
            match file.status {
                FileAttemptStatus::Pending => progress.pending += 1,
                FileAttemptStatus::InProgress => progress.in_progress += 1,
                FileAttemptStatus::Done => progress.done += 1,
                FileAttemptStatus::Failed => progress.failed += 1,
                FileAttemptStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.state)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_state(serde_json::from_str(json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(paths: &[&str]) -> EditAttemptLedger {
        EditAttemptLedger::new(
            paths.iter().map(|p| TargetFile::new(*p, "refactor")).collect(),
            LedgerOptions::default(),
        )
    }

    fn diff(text: &str) -> CompletedDiff {
        CompletedDiff {
            unified_diff: text.into(),
            new_content: Some(format!("content for {text}")),
            action: FileAction::Update,
            base_sha: Some("abc123".into()),
        }
    }

    #[test]
    fn new_ledger_is_pending() {
        let l = ledger(&["a.rs", "b.rs"]);
        assert_eq!(l.status(), LedgerStatus::Pending);
        assert!(l.files().iter().all(|f| f.status == FileAttemptStatus::Pending && f.attempts == 0));
        assert_eq!(l.state().max_attempts_per_file, 2);
        assert_eq!(l.state().max_total_chunks, 10);
    }

    #[test]
    fn duplicate_and_empty_targets_dropped() {
        let l = ledger(&["a.rs", "", "a.rs", "b.rs"]);
        let paths: Vec<_> = l.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn untried_files_come_before_retries() {
        let mut l = ledger(&["a.rs", "b.rs"]);
        assert_eq!(l.next_file().unwrap().path, "a.rs");
        l.mark_in_progress("a.rs").unwrap();
        l.mark_failed("a.rs", "truncated").unwrap();
        assert_eq!(l.next_file().unwrap().path, "b.rs");

        l.mark_in_progress("b.rs").unwrap();
        l.mark_done("b.rs", diff("b")).unwrap();
        assert_eq!(l.next_file().unwrap().path, "a.rs");

        l.mark_in_progress("a.rs").unwrap();
        l.mark_failed("a.rs", "truncated again").unwrap();
        assert!(l.next_file().is_none());
    }

    #[test]
    fn mark_in_progress_counts_attempt_and_chunk() {
        let mut l = ledger(&["a.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        let f = l.get("a.rs").unwrap();
        assert_eq!(f.status, FileAttemptStatus::InProgress);
        assert_eq!(f.attempts, 1);
        assert_eq!(l.total_chunks_attempted(), 1);
        assert_eq!(l.status(), LedgerStatus::InProgress);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let mut l = ledger(&["a.rs"]);
        assert_eq!(
            l.mark_in_progress("ghost.rs"),
            Err(LedgerError::UnknownPath("ghost.rs".into()))
        );
        assert!(l.mark_done("ghost.rs", diff("x")).is_err());
        assert!(l.mark_failed("ghost.rs", "x").is_err());
        assert!(l.mark_skipped("ghost.rs", None).is_err());
        assert_eq!(l.total_chunks_attempted(), 0);
    }

    #[test]
    fn mark_failed_does_not_count_attempts() {
        let mut l = ledger(&["a.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        l.mark_failed("a.rs", "boom").unwrap();
        l.mark_failed("a.rs", "boom again").unwrap();
        let f = l.get("a.rs").unwrap();
        assert_eq!(f.attempts, 1);
        assert_eq!(f.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn mark_done_clears_last_error() {
        let mut l = ledger(&["a.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        l.mark_failed("a.rs", "boom").unwrap();
        l.mark_in_progress("a.rs").unwrap();
        l.mark_done("a.rs", diff("a")).unwrap();
        assert!(l.get("a.rs").unwrap().last_error.is_none());
    }

    #[test]
    fn chunk_cap_stops_handing_out_files() {
        let mut l = EditAttemptLedger::new(
            vec![TargetFile::new("a.rs", ""), TargetFile::new("b.rs", "")],
            LedgerOptions {
                max_attempts_per_file: 5,
                max_total_chunks: 1,
            },
        );
        l.mark_in_progress("a.rs").unwrap();
        l.mark_done("a.rs", diff("a")).unwrap();
        assert!(l.next_file().is_none());
        let reason = l.should_pause().unwrap();
        assert!(reason.contains("1/1"));
        assert!(reason.contains("1 file(s)"));
        assert_eq!(l.finalize(), LedgerStatus::Paused);
    }

    #[test]
    fn exhausted_file_pauses_and_blocks_completion() {
        let mut l = ledger(&["a.rs", "b.rs"]);
        l.mark_in_progress("b.rs").unwrap();
        l.mark_done("b.rs", diff("b")).unwrap();
        for _ in 0..2 {
            l.mark_in_progress("a.rs").unwrap();
            l.mark_failed("a.rs", "syntax error").unwrap();
        }
        let reason = l.should_pause().unwrap();
        assert!(reason.contains("a.rs failed after 2 attempt(s): syntax error"));
        assert!(!l.is_complete());
        assert_eq!(l.finalize(), LedgerStatus::Paused);
    }

    #[test]
    fn retriable_failure_does_not_pause() {
        let mut l = ledger(&["a.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        l.mark_failed("a.rs", "once").unwrap();
        assert!(l.should_pause().is_none());
        assert_eq!(l.finalize(), LedgerStatus::InProgress);
    }

    #[test]
    fn done_and_skipped_complete_the_ledger() {
        let mut l = ledger(&["a.rs", "b.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        l.mark_done("a.rs", diff("a")).unwrap();
        assert!(!l.is_complete());
        l.mark_skipped("b.rs", Some("already up to date".into())).unwrap();
        assert!(l.is_complete());
        assert_eq!(l.finalize(), LedgerStatus::Completed);
        assert_eq!(l.get("b.rs").unwrap().skip_reason.as_deref(), Some("already up to date"));
    }

    #[test]
    fn combined_diff_and_touched_files() {
        let mut l = ledger(&["a.rs", "b.rs", "c.rs", "d.rs"]);
        for p in ["a.rs", "b.rs", "c.rs"] {
            l.mark_in_progress(p).unwrap();
        }
        l.mark_done("a.rs", diff("--- a\n+++ a")).unwrap();
        l.mark_done("b.rs", diff("")).unwrap();
        l.mark_done("c.rs", diff("--- c\n+++ c")).unwrap();
        l.mark_skipped("d.rs", None).unwrap();

        assert_eq!(l.combined_diff(), "--- a\n+++ a\n--- c\n+++ c");
        let touched = l.touched_files();
        assert_eq!(touched.len(), 3);
        assert_eq!(touched[0].path, "a.rs");
        assert_eq!(touched[0].base_sha.as_deref(), Some("abc123"));
        assert_eq!(touched[0].action, FileAction::Update);
    }

    #[test]
    fn progress_counts() {
        let mut l = ledger(&["a.rs", "b.rs", "c.rs"]);
        l.mark_in_progress("a.rs").unwrap();
        l.mark_in_progress("b.rs").unwrap();
        l.mark_failed("b.rs", "x").unwrap();
        let p = l.progress();
        assert_eq!(p.in_progress, 1);
        assert_eq!(p.failed, 1);
        assert_eq!(p.pending, 1);
        assert_eq!(p.total, 3);
    }

    #[test]
    fn json_round_trip_restores_everything() {
        let mut l = EditAttemptLedger::new(
            vec![TargetFile::new("a.rs", "fix"), TargetFile::new("b.rs", "fix")],
            LedgerOptions {
                max_attempts_per_file: 3,
                max_total_chunks: 4,
            },
        );
        l.mark_in_progress("a.rs").unwrap();
        l.mark_done("a.rs", diff("a")).unwrap();
        l.mark_in_progress("b.rs").unwrap();
        l.mark_failed("b.rs", "oops").unwrap();

        let restored = EditAttemptLedger::from_json(&l.to_json().unwrap()).unwrap();
        assert_eq!(restored, l);
        assert_eq!(restored.state().max_total_chunks, 4);
        assert_eq!(restored.next_file().unwrap().path, "b.rs");
    }

    #[test]
    fn from_state_trusts_input() {
        let state = EditAttemptLedgerState {
            files: vec![
                FileEditAttempt {
                    path: "dup.rs".into(),
                    reason: String::new(),
                    status: FileAttemptStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    skip_reason: None,
                    completed_diff: None,
                };
                2
            ],
            total_chunks_attempted: 0,
            max_attempts_per_file: 2,
            max_total_chunks: 10,
            status: LedgerStatus::Pending,
        };
        assert_eq!(EditAttemptLedger::from_state(state).files().len(), 2);
    }
}
