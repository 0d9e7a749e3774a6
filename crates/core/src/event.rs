//! Domain event system: evidence of every tool call and loop transition.
//!
//! Events are persisted to the bus's log first and only then fanned out to
//! subscribers, so a subscriber that lags or drops never loses history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::payload::{DiffAppliedPayload, DiffProposedPayload, LoopPausedPayload};

/// All domain events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A tool call went through an executor
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        /// Whether the call was served by the staged overlay
        staged: bool,
        duration_ms: u64,
    },

    /// A run stopped and awaits a user decision
    LoopPaused(LoopPausedPayload),

    /// The user continued a paused run
    LoopResumed {
        session_id: String,
        continue_count: u32,
    },

    /// Staged edits were offered for approval
    DiffProposed(DiffProposedPayload),

    /// Approved edits were written to disk
    DiffApplied(DiffAppliedPayload),
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolExecuted { .. } => "tool_executed",
            Self::LoopPaused(_) => "loop_paused",
            Self::LoopResumed { .. } => "loop_resumed",
            Self::DiffProposed(_) => "diff_proposed",
            Self::DiffApplied(_) => "diff_applied",
        }
    }
}

/// A logged event with its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: DomainEvent,
}

/// A broadcast-based event bus backed by an append-only log.
pub struct EventBus {
    sender: broadcast::Sender<Arc<EventRecord>>,
    log: Mutex<Vec<EventRecord>>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Append the event to the log, then publish it to all subscribers.
    pub fn publish(&self, event: DomainEvent) -> u64 {
        let record = {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            let record = EventRecord {
                seq: log.len() as u64 + 1,
                timestamp: Utc::now(),
                event,
            };
            log.push(record.clone());
            record
        };
        let seq = record.seq;
        debug!(seq, kind = record.event.kind(), "Event published");

        // No subscribers is fine; the log already has it.
        let _ = self.sender.send(Arc::new(record));
        seq
    }

    /// Subscribe to receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EventRecord>> {
        self.sender.subscribe()
    }

    /// Every event published so far, in order.
    pub fn history(&self) -> Vec<EventRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Correlation key of an arbitrary event payload.
///
/// `proposal_id` takes priority over `diff_id`; neither present yields `None`.
pub fn correlation_id(payload: &Value) -> Option<String> {
    ["proposal_id", "diff_id"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// File paths listed under `files_changed[].path` of a diff payload.
pub fn extract_file_paths(payload: &Value) -> Vec<String> {
    payload
        .get("files_changed")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|f| f.get("path").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
