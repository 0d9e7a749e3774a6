//! Staged edit buffer: pending file mutations held in memory.
//!
//! The buffer answers "what would be on disk if the agent's proposal were
//! applied" without ever touching disk. Each path has at most one entry;
//! writes and edits overwrite it in place.
//!
//! The buffer is a plain owned value with no internal locking. It belongs to
//! exactly one loop session and moves between sessions only through
//! [`StagedEditBuffer::to_snapshot`] / [`StagedEditBuffer::from_snapshot`].

use chrono::{DateTime, Utc};
use editstage_core::payload::{FileAction, StagedFileSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One pending mutation for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    /// Full content after staging. Empty when deleted.
    pub content: String,
    /// The file did not exist before staging began. Set on first write only.
    pub is_new: bool,
    pub is_deleted: bool,
    pub edit_count: u32,
    pub last_modified: DateTime<Utc>,
}

impl StagedFile {
    pub fn action(&self) -> FileAction {
        if self.is_deleted {
            FileAction::Delete
        } else if self.is_new {
            FileAction::Create
        } else {
            FileAction::Update
        }
    }
}

/// Serialized form of one staged file. `last_modified` is not carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFileSnapshot {
    pub path: String,
    pub content: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub edit_count: u32,
}

/// JSON-safe projection of a whole buffer, used for pause/resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedBufferSnapshot {
    pub files: Vec<StagedFileSnapshot>,
}

/// Why a find-and-replace edit was rejected. The buffer is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("File not found in staged buffer: {path}")]
    NotStaged { path: String },

    #[error("File not found in staged buffer (staged for deletion): {path}")]
    Deleted { path: String },

    #[error("old_text not found in {path}")]
    TextNotFound { path: String },

    #[error(
        "old_text found multiple times in {path}; include more surrounding context so it matches exactly once"
    )]
    Ambiguous { path: String },
}

/// In-memory overlay of pending file mutations, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct StagedEditBuffer {
    files: BTreeMap<String, StagedFile>,
}

impl StagedEditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage full content for `path`.
    ///
    /// An existing entry keeps its original `is_new` flag and bumps its edit
    /// count; a fresh entry takes `is_new` as given. Always clears deletion.
    pub fn write(&mut self, path: &str, content: impl Into<String>, is_new: bool) {
        let content = content.into();
        let now = Utc::now();
        match self.files.get_mut(path) {
            Some(file) => {
                file.content = content;
                file.is_deleted = false;
                file.edit_count += 1;
                file.last_modified = now;
                debug!(path, edit_count = file.edit_count, "Staged write");
            }
            None => {
                self.files.insert(
                    path.to_string(),
                    StagedFile {
                        path: path.to_string(),
                        content,
                        is_new,
                        is_deleted: false,
                        edit_count: 1,
                        last_modified: now,
                    },
                );
                debug!(path, is_new, "Staged new entry");
            }
        }
    }

    /// Replace the single occurrence of `old_text` with `new_text`.
    ///
    /// Matches against the staged content when the path is staged, otherwise
    /// against `current_content` (the caller's disk snapshot). `old_text` must
    /// occur exactly once; overlapping occurrences count as a second match.
    pub fn edit(
        &mut self,
        path: &str,
        old_text: &str,
        new_text: &str,
        current_content: Option<&str>,
    ) -> Result<(), EditError> {
        let base = match self.files.get(path) {
            Some(file) if file.is_deleted => {
                return Err(EditError::Deleted { path: path.into() });
            }
            Some(file) => file.content.as_str(),
            None => current_content.ok_or_else(|| EditError::NotStaged { path: path.into() })?,
        };

        let updated = replace_unique(base, old_text, new_text, path)?;

        match self.files.get_mut(path) {
            Some(file) => {
                file.content = updated;
                file.edit_count += 1;
                file.last_modified = Utc::now();
                debug!(path, edit_count = file.edit_count, "Staged edit");
            }
            None => {
                self.files.insert(
                    path.to_string(),
                    StagedFile {
                        path: path.to_string(),
                        content: updated,
                        is_new: false,
                        is_deleted: false,
                        edit_count: 1,
                        last_modified: Utc::now(),
                    },
                );
                debug!(path, "Staged edit against disk content");
            }
        }
        Ok(())
    }

    /// Stage a deletion. Idempotent, and valid for paths never staged.
    pub fn delete(&mut self, path: &str) {
        let now = Utc::now();
        let file = self
            .files
            .entry(path.to_string())
            .or_insert_with(|| StagedFile {
                path: path.to_string(),
                content: String::new(),
                is_new: false,
                is_deleted: true,
                edit_count: 0,
                last_modified: now,
            });
        file.content.clear();
        file.is_deleted = true;
        file.edit_count = 0;
        file.last_modified = now;
        debug!(path, "Staged deletion");
    }

    /// Staged content, or `None` when unstaged *or* deleted.
    pub fn read(&self, path: &str) -> Option<&str> {
        self.files
            .get(path)
            .filter(|f| !f.is_deleted)
            .map(|f| f.content.as_str())
    }

    pub fn has(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn is_deleted(&self, path: &str) -> bool {
        self.files.get(path).is_some_and(|f| f.is_deleted)
    }

    pub fn get(&self, path: &str) -> Option<&StagedFile> {
        self.files.get(path)
    }

    pub fn staged_paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn all(&self) -> Vec<&StagedFile> {
        self.files.values().collect()
    }

    /// Entries that carry content, i.e. everything except deletions.
    pub fn modified_files(&self) -> Vec<&StagedFile> {
        self.files.values().filter(|f| !f.is_deleted).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn to_summary(&self) -> Vec<StagedFileSummary> {
        self.files
            .values()
            .map(|f| StagedFileSummary {
                path: f.path.clone(),
                action: f.action(),
                edit_count: f.edit_count,
            })
            .collect()
    }

    pub fn to_snapshot(&self) -> StagedBufferSnapshot {
        StagedBufferSnapshot {
            files: self
                .files
                .values()
                .map(|f| StagedFileSnapshot {
                    path: f.path.clone(),
                    content: f.content.clone(),
                    is_new: f.is_new,
                    is_deleted: f.is_deleted,
                    edit_count: f.edit_count,
                })
                .collect(),
        }
    }

    /// Rebuild a buffer. Every entry is re-stamped with the current time.
    pub fn from_snapshot(snapshot: &StagedBufferSnapshot) -> Self {
        let now = Utc::now();
        let files = snapshot
            .files
            .iter()
            .map(|f| {
                (
                    f.path.clone(),
                    StagedFile {
                        path: f.path.clone(),
                        content: f.content.clone(),
                        is_new: f.is_new,
                        is_deleted: f.is_deleted,
                        edit_count: f.edit_count,
                        last_modified: now,
                    },
                )
            })
            .collect();
        Self { files }
    }
}

/// Exact-substring replacement that refuses ambiguous matches.
pub fn replace_unique(
    content: &str,
    old_text: &str,
    new_text: &str,
    path: &str,
) -> Result<String, EditError> {
    if old_text.is_empty() {
        return Err(EditError::Ambiguous { path: path.into() });
    }
    let Some(first) = content.find(old_text) else {
        return Err(EditError::TextNotFound { path: path.into() });
    };

    // Resume one character past the match start so overlapping hits count.
    let step = old_text.chars().next().map_or(1, char::len_utf8);
    if content[first + step..].contains(old_text) {
        return Err(EditError::Ambiguous { path: path.into() });
    }

    let mut updated = String::with_capacity(content.len() - old_text.len() + new_text.len());
    updated.push_str(&content[..first]);
    updated.push_str(new_text);
    updated.push_str(&content[first + old_text.len()..]);
    Ok(updated)
}
