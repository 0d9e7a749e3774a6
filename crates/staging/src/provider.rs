//! Staged tool provider: routes mutations into the buffer, reads through it.
//!
//! Wraps any [`ToolExecutor`]. `write_file` and `edit_file` land in the
//! [`StagedEditBuffer`] instead of on disk; `read_file` sees staged content
//! first and falls back to the delegate; everything else passes through
//! untouched. A session that writes then reads a path always sees its own
//! write, whichever spelling of the path it uses.
//!
//! The buffer sits behind a mutex so the provider can be shared as a
//! `ToolExecutor`, but the lock is never held across a delegate call. Callers
//! are still expected to drive one tool call at a time.

use async_trait::async_trait;
use editstage_core::event::{DomainEvent, EventBus};
use editstage_core::payload::StagedFileSummary;
use editstage_core::tool::{
    EditFileInput, READ_FILE, ReadFileInput, ToolExecutor, ToolKind, ToolOutcome, WriteFileInput,
    window_lines,
};
use editstage_core::ToolError;
use editstage_security::normalize_path;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use crate::buffer::{StagedBufferSnapshot, StagedEditBuffer};

const STAGED_TAG: &str = "[staged]";

/// A [`ToolExecutor`] that stages file mutations in memory.
pub struct StagedToolProvider<D> {
    delegate: D,
    buffer: Mutex<StagedEditBuffer>,
    events: Option<(Arc<EventBus>, String)>,
}

impl<D: ToolExecutor> StagedToolProvider<D> {
    /// Wrap `delegate` with an empty buffer.
    pub fn new(delegate: D) -> Self {
        Self::with_buffer(delegate, StagedEditBuffer::new())
    }

    /// Wrap `delegate` around an existing buffer, e.g. one restored on resume.
    pub fn with_buffer(delegate: D, buffer: StagedEditBuffer) -> Self {
        Self {
            delegate,
            buffer: Mutex::new(buffer),
            events: None,
        }
    }

    /// Record every tool call on `bus`, tagged with `session_id`.
    pub fn with_events(mut self, bus: Arc<EventBus>, session_id: impl Into<String>) -> Self {
        self.events = Some((bus, session_id.into()));
        self
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Lock the buffer for direct inspection or mutation.
    pub fn buffer(&self) -> MutexGuard<'_, StagedEditBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StagedBufferSnapshot {
        self.buffer().to_snapshot()
    }

    pub fn summary(&self) -> Vec<StagedFileSummary> {
        self.buffer().to_summary()
    }

    /// Give up the provider and keep the staged work.
    pub fn into_buffer(self) -> StagedEditBuffer {
        self.buffer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn write_file(&self, input: WriteFileInput) -> ToolOutcome {
        let Some(path) = staging_key(&input.path) else {
            return ToolOutcome::fail(format!("Invalid path: {}", input.path));
        };
        let staged = self.buffer().has(&path);
        let exists = if staged {
            true
        } else {
            match self.exists_on_delegate(&path).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(path = %path, error = %e, "Delegate refused write target");
                    return ToolOutcome::fail(format!("Cannot write file: {e}"));
                }
            }
        };

        let bytes = input.content.len();
        self.buffer().write(&path, input.content, !exists);

        let verb = if exists { "Wrote" } else { "Created" };
        ToolOutcome::ok(format!("{verb} {path} ({bytes} bytes) {STAGED_TAG}"))
    }

    async fn edit_file(&self, input: EditFileInput) -> ToolOutcome {
        let Some(path) = staging_key(&input.path) else {
            return ToolOutcome::fail(format!("Invalid path: {}", input.path));
        };
        let staged = self.buffer().has(&path);
        let current = if staged {
            None
        } else {
            match self.read_from_delegate(&path).await {
                Ok(content) => Some(content),
                Err(reason) => return ToolOutcome::fail(format!("Cannot read file for edit: {reason}")),
            }
        };

        let result = self.buffer().edit(
            &path,
            &input.old_text,
            &input.new_text,
            current.as_deref(),
        );
        match result {
            Ok(()) => ToolOutcome::ok(format!("Edited {path} {STAGED_TAG}")),
            Err(e) => ToolOutcome::fail(e.to_string()),
        }
    }

    /// Serve a read from the buffer, or `None` when the path is not staged.
    fn read_staged(&self, input: &ReadFileInput) -> Option<ToolOutcome> {
        let path = staging_key(&input.path)?;
        let buffer = self.buffer();
        let file = buffer.get(&path)?;
        if file.is_deleted {
            return Some(ToolOutcome::fail(format!(
                "File {path} has been deleted {STAGED_TAG}"
            )));
        }
        Some(ToolOutcome::ok(window_lines(
            &file.content,
            input.offset,
            input.max_lines,
        )))
    }

    /// One-line read against the delegate to see whether the file exists. An
    /// `Err` means the delegate will not touch this path at all.
    async fn exists_on_delegate(&self, path: &str) -> Result<bool, ToolError> {
        let request = json!({ "path": path, "max_lines": 1 });
        let outcome = self.delegate.execute_tool(READ_FILE, &request).await?;
        Ok(outcome.success)
    }

    async fn read_from_delegate(&self, path: &str) -> Result<String, String> {
        match self.delegate.execute_tool(READ_FILE, &json!({ "path": path })).await {
            Ok(outcome) if outcome.success => Ok(outcome.output.unwrap_or_default()),
            Ok(outcome) => Err(outcome.error_message().to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn record(&self, tool_name: &str, success: bool, staged: bool, started: Instant) {
        if let Some((bus, session_id)) = &self.events {
            bus.publish(DomainEvent::ToolExecuted {
                session_id: session_id.clone(),
                tool_name: tool_name.to_string(),
                success,
                staged,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }
    }
}

/// Buffer key for a tool path, so `./a.rs` and `a.rs` stage the same file.
fn staging_key(path: &str) -> Option<String> {
    let key = normalize_path(path);
    (!key.is_empty()).then_some(key)
}

#[async_trait]
impl<D: ToolExecutor> ToolExecutor for StagedToolProvider<D> {
    async fn execute_tool(&self, name: &str, input: &Value) -> Result<ToolOutcome, ToolError> {
        let started = Instant::now();
        let staged = match ToolKind::from_name(name) {
            ToolKind::WriteFile => Some(match WriteFileInput::from_value(input) {
                Ok(input) => self.write_file(input).await,
                Err(msg) => ToolOutcome::fail(msg),
            }),
            ToolKind::EditFile => Some(match EditFileInput::from_value(input) {
                Ok(input) => self.edit_file(input).await,
                Err(msg) => ToolOutcome::fail(msg),
            }),
            // A read the buffer cannot key is the delegate's to answer.
            ToolKind::ReadFile => ReadFileInput::from_value(input)
                .ok()
                .and_then(|input| self.read_staged(&input)),
            _ => None,
        };

        if let Some(outcome) = staged {
            debug!(tool = name, success = outcome.success, "Served from staged buffer");
            self.record(name, outcome.success, true, started);
            return Ok(outcome);
        }

        debug!(tool = name, "Passing through to delegate");
        let result = self.delegate.execute_tool(name, input).await;
        self.record(
            name,
            result.as_ref().is_ok_and(|o| o.success),
            false,
            started,
        );
        result
    }
}
