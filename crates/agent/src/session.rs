//! Loop session state: budgets and counters for one resumable agent run.
//!
//! Everything here is pure: no I/O, no hidden state. Transitions take a
//! session by reference and return the next value, so the previous state
//! stays valid for persistence or comparison.
//!
//! ```text
//! idle → running → { paused(reason) → running (increment_continue) }* → completed | failed
//! ```
//!
//! A session stops offering Continue once [`LoopSession::can_continue`] is
//! false. Hitting a budget is a normal pause, not an error.

use chrono::{DateTime, Utc};
use editstage_config::LoopConfig;
use editstage_core::payload::{LoopPausedPayload, StagedFileSummary, StopReason, TokenUsage};
use editstage_staging::{StagedBufferSnapshot, StagedEditBuffer};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_MAX_CONTINUES: u32 = 3;
pub const DEFAULT_MAX_ITERATIONS_PER_RUN: u32 = 10;
pub const DEFAULT_MAX_TOTAL_TOKENS: u64 = 4_000_000;

/// Configured ceilings for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopBudgets {
    pub max_continues: u32,
    pub max_iterations_per_run: u32,
    pub max_total_tokens: u64,
}

impl Default for LoopBudgets {
    fn default() -> Self {
        Self {
            max_continues: DEFAULT_MAX_CONTINUES,
            max_iterations_per_run: DEFAULT_MAX_ITERATIONS_PER_RUN,
            max_total_tokens: DEFAULT_MAX_TOTAL_TOKENS,
        }
    }
}

impl From<&LoopConfig> for LoopBudgets {
    fn from(config: &LoopConfig) -> Self {
        Self {
            max_continues: config.max_continues,
            max_iterations_per_run: config.max_iterations_per_run,
            max_total_tokens: config.max_total_tokens,
        }
    }
}

/// Inputs for [`LoopSession::create`].
#[derive(Debug, Clone, Default)]
pub struct LoopSessionParams {
    /// Generated when absent.
    pub session_id: Option<String>,
    pub task_id: String,
    pub step_id: String,
    pub budgets: LoopBudgets,
}

impl LoopSessionParams {
    pub fn new(task_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            step_id: step_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_budgets(mut self, budgets: LoopBudgets) -> Self {
        self.budgets = budgets;
        self
    }
}

/// What one execution burst produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub iterations: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u32,
    pub stop_reason: Option<StopReason>,
    pub final_text: String,
    pub staged_snapshot: Option<StagedBufferSnapshot>,
    pub conversation_snapshot: Option<serde_json::Value>,
}

/// One agent run's resumable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSession {
    pub session_id: String,
    pub task_id: String,
    pub step_id: String,

    /// Cumulative across every continue.
    pub iteration_count: u32,
    pub continue_count: u32,

    pub max_continues: u32,
    pub max_iterations_per_run: u32,
    pub max_total_tokens: u64,

    pub total_tokens: TokenUsage,
    pub stop_reason: Option<StopReason>,
    pub final_text: String,
    pub tool_calls_count: u32,

    /// Captured at pause time for resume.
    pub staged_snapshot: Option<StagedBufferSnapshot>,
    pub conversation_snapshot: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoopSession {
    /// Start a fresh session with zeroed counters.
    pub fn create(params: LoopSessionParams) -> Self {
        let now = Utc::now();
        let session = Self {
            session_id: params
                .session_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            task_id: params.task_id,
            step_id: params.step_id,
            iteration_count: 0,
            continue_count: 0,
            max_continues: params.budgets.max_continues,
            max_iterations_per_run: params.budgets.max_iterations_per_run,
            max_total_tokens: params.budgets.max_total_tokens,
            total_tokens: TokenUsage::default(),
            stop_reason: None,
            final_text: String::new(),
            tool_calls_count: 0,
            staged_snapshot: None,
            conversation_snapshot: None,
            created_at: now,
            updated_at: now,
        };
        debug!(session_id = %session.session_id, step_id = %session.step_id, "Loop session created");
        session
    }

    /// Hard iteration ceiling across the initial run and every continue.
    pub fn max_total_iterations(&self) -> u32 {
        self.max_continues
            .saturating_add(1)
            .saturating_mul(self.max_iterations_per_run)
    }

    pub fn is_iteration_budget_exhausted(&self) -> bool {
        self.iteration_count >= self.max_total_iterations()
    }

    pub fn is_token_budget_exhausted(&self) -> bool {
        self.total_tokens.total() >= self.max_total_tokens
    }

    /// Continues left, and neither budget exhausted.
    pub fn can_continue(&self) -> bool {
        self.continue_count < self.max_continues
            && !self.is_iteration_budget_exhausted()
            && !self.is_token_budget_exhausted()
    }

    /// Continues left by count alone.
    pub fn remaining_continues(&self) -> u32 {
        self.max_continues.saturating_sub(self.continue_count)
    }

    /// Runs that still fit in the iteration ceiling. Used by the pause payload.
    pub fn remaining_continues_by_iterations(&self) -> u32 {
        if self.max_iterations_per_run == 0 {
            return 0;
        }
        self.max_total_iterations()
            .saturating_sub(self.iteration_count)
            .div_ceil(self.max_iterations_per_run)
    }

    /// The budget that is spent, if any. Tokens are reported first.
    pub fn exhausted_budget(&self) -> Option<StopReason> {
        if self.is_token_budget_exhausted() {
            Some(StopReason::MaxTokens)
        } else if self.is_iteration_budget_exhausted() {
            Some(StopReason::MaxIterations)
        } else {
            None
        }
    }

    /// Fold one run into the session.
    ///
    /// Counters accumulate; stop reason, final text and both snapshots are
    /// replaced by the run's values.
    #[must_use]
    pub fn update_after_run(&self, result: &RunResult) -> Self {
        let next = Self {
            iteration_count: self.iteration_count.saturating_add(result.iterations),
            total_tokens: TokenUsage {
                input: self.total_tokens.input.saturating_add(result.input_tokens),
                output: self.total_tokens.output.saturating_add(result.output_tokens),
            },
            tool_calls_count: self.tool_calls_count.saturating_add(result.tool_calls),
            stop_reason: result.stop_reason,
            final_text: result.final_text.clone(),
            staged_snapshot: result.staged_snapshot.clone(),
            conversation_snapshot: result.conversation_snapshot.clone(),
            updated_at: Utc::now(),
            ..self.clone()
        };
        debug!(
            session_id = %next.session_id,
            iteration_count = next.iteration_count,
            tokens = next.total_tokens.total(),
            stop_reason = ?next.stop_reason,
            "Session updated after run"
        );
        next
    }

    /// Consume one continue and clear the stop reason.
    #[must_use]
    pub fn increment_continue(&self) -> Self {
        let next = Self {
            continue_count: self.continue_count.saturating_add(1),
            stop_reason: None,
            updated_at: Utc::now(),
            ..self.clone()
        };
        debug!(
            session_id = %next.session_id,
            continue_count = next.continue_count,
            "Session continued"
        );
        next
    }

    /// Assemble the `loop_paused` notification.
    pub fn build_paused_payload(&self, staged_files: Vec<StagedFileSummary>) -> LoopPausedPayload {
        LoopPausedPayload {
            session_id: self.session_id.clone(),
            task_id: self.task_id.clone(),
            step_id: self.step_id.clone(),
            reason: self.stop_reason,
            iteration_count: self.iteration_count,
            continue_count: self.continue_count,
            max_continues: self.max_continues,
            can_continue: self.can_continue(),
            remaining_continues: self.remaining_continues_by_iterations(),
            staged_files_count: staged_files.len(),
            staged_files,
            total_tokens: self.total_tokens,
            final_text: self.final_text.clone(),
            tool_calls_count: self.tool_calls_count,
        }
    }

    /// Rehydrate the staged buffer captured at the last pause.
    pub fn restore_buffer(&self) -> StagedEditBuffer {
        self.staged_snapshot
            .as_ref()
            .map(StagedEditBuffer::from_snapshot)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editstage_core::payload::FileAction;

    fn session() -> LoopSession {
        LoopSession::create(LoopSessionParams::new("task-1", "step-1"))
    }

    fn run(iterations: u32, input: u64, output: u64, tools: u32) -> RunResult {
        RunResult {
            iterations,
            input_tokens: input,
            output_tokens: output,
            tool_calls: tools,
            stop_reason: Some(StopReason::MaxIterations),
            final_text: format!("ran {iterations}"),
            ..Default::default()
        }
    }

    #[test]
    fn create_uses_defaults() {
        let s = session();
        assert_eq!(s.max_continues, 3);
        assert_eq!(s.max_iterations_per_run, 10);
        assert_eq!(s.max_total_tokens, 4_000_000);
        assert_eq!(s.iteration_count, 0);
        assert!(s.stop_reason.is_none());
        assert!(s.staged_snapshot.is_none());
        assert!(s.conversation_snapshot.is_none());
        assert!(!s.session_id.is_empty());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn explicit_session_id_and_budgets() {
        let s = LoopSession::create(
            LoopSessionParams::new("t", "s")
                .with_session_id("sess-42")
                .with_budgets(LoopBudgets {
                    max_continues: 1,
                    max_iterations_per_run: 50,
                    max_total_tokens: 100,
                }),
        );
        assert_eq!(s.session_id, "sess-42");
        assert_eq!(s.max_total_iterations(), 100);
    }

    #[test]
    fn max_total_iterations_formula() {
        for (continues, per_run) in [(0, 10), (3, 10), (2, 50), (5, 1)] {
            let s = LoopSession::create(LoopSessionParams::new("t", "s").with_budgets(LoopBudgets {
                max_continues: continues,
                max_iterations_per_run: per_run,
                ..LoopBudgets::default()
            }));
            assert_eq!(s.max_total_iterations(), (continues + 1) * per_run);
        }
    }

    #[test]
    fn iteration_budget_boundary_is_exact() {
        let mut s = session();
        assert_eq!(s.max_total_iterations(), 40);
        s.iteration_count = 39;
        assert!(!s.is_iteration_budget_exhausted());
        s.iteration_count = 40;
        assert!(s.is_iteration_budget_exhausted());
        assert!(!s.can_continue());
        assert_eq!(s.exhausted_budget(), Some(StopReason::MaxIterations));
    }

    #[test]
    fn token_budget_counts_input_plus_output() {
        let s = session().update_after_run(&run(1, 3_000_000, 999_999, 0));
        assert!(!s.is_token_budget_exhausted());
        let s = s.update_after_run(&run(1, 0, 1, 0));
        assert!(s.is_token_budget_exhausted());
        assert!(!s.can_continue());
        assert_eq!(s.exhausted_budget(), Some(StopReason::MaxTokens));
    }

    #[test]
    fn can_continue_is_conjunction() {
        let mut s = session();
        assert!(s.can_continue());

        s.continue_count = 3;
        assert_eq!(s.remaining_continues(), 0);
        assert!(!s.can_continue());

        // Continues left but iterations spent.
        let mut s = session();
        s.iteration_count = 40;
        assert_eq!(s.remaining_continues(), 3);
        assert!(!s.can_continue());
    }

    #[test]
    fn runs_accumulate() {
        let s = session()
            .update_after_run(&run(5, 100, 50, 4))
            .update_after_run(&run(3, 10, 5, 2));
        assert_eq!(s.iteration_count, 8);
        assert_eq!(s.total_tokens, TokenUsage { input: 110, output: 55 });
        assert_eq!(s.tool_calls_count, 6);
        assert_eq!(s.final_text, "ran 3");
    }

    #[test]
    fn update_replaces_snapshots() {
        let mut buffer = StagedEditBuffer::new();
        buffer.write("a.rs", "a", true);
        let first = RunResult {
            staged_snapshot: Some(buffer.to_snapshot()),
            conversation_snapshot: Some(serde_json::json!([{"role": "user"}])),
            ..run(1, 0, 0, 0)
        };
        let s = session().update_after_run(&first);
        assert!(s.staged_snapshot.is_some());

        let s = s.update_after_run(&RunResult {
            stop_reason: Some(StopReason::EndTurn),
            ..Default::default()
        });
        assert!(s.staged_snapshot.is_none());
        assert!(s.conversation_snapshot.is_none());
        assert_eq!(s.stop_reason, Some(StopReason::EndTurn));
    }

    #[test]
    fn update_leaves_original_untouched() {
        let original = session();
        let next = original.update_after_run(&run(2, 1, 1, 1));
        assert_eq!(original.iteration_count, 0);
        assert_eq!(next.iteration_count, 2);
        assert!(next.updated_at >= original.updated_at);
        assert_eq!(next.created_at, original.created_at);
    }

    #[test]
    fn increment_continue_clears_stop_reason_only() {
        let s = session().update_after_run(&run(10, 5, 5, 3));
        assert_eq!(s.stop_reason, Some(StopReason::MaxIterations));
        let resumed = s.increment_continue();
        assert_eq!(resumed.continue_count, 1);
        assert!(resumed.stop_reason.is_none());
        assert_eq!(resumed.iteration_count, 10);
        assert_eq!(resumed.total_tokens, s.total_tokens);
        assert_eq!(resumed.final_text, s.final_text);
    }

    #[test]
    fn remaining_continues_by_iterations_formula() {
        let mut s = session();
        s.iteration_count = 10;
        assert_eq!(s.remaining_continues_by_iterations(), 3);
        s.iteration_count = 11;
        assert_eq!(s.remaining_continues_by_iterations(), 3);
        s.iteration_count = 31;
        assert_eq!(s.remaining_continues_by_iterations(), 1);
        s.iteration_count = 45;
        assert_eq!(s.remaining_continues_by_iterations(), 0);
    }

    #[test]
    fn zero_per_run_budget_leaves_no_continues() {
        let s = LoopSession::create(LoopSessionParams::new("t", "s").with_budgets(LoopBudgets {
            max_continues: 3,
            max_iterations_per_run: 0,
            max_total_tokens: 1_000,
        }));
        assert_eq!(s.max_total_iterations(), 0);
        assert!(s.is_iteration_budget_exhausted());
        assert!(!s.can_continue());
        assert_eq!(s.remaining_continues(), 3);
        assert_eq!(s.remaining_continues_by_iterations(), 0);

        let paused = s.build_paused_payload(Vec::new());
        assert_eq!(paused.remaining_continues, 0);
        assert!(!paused.can_continue);
    }

    #[test]
    fn paused_payload_fields() {
        let s = session().update_after_run(&run(10, 200, 100, 7));
        let summary = vec![StagedFileSummary {
            path: "src/main.rs".into(),
            action: FileAction::Update,
            edit_count: 2,
        }];
        let payload = s.build_paused_payload(summary.clone());
        assert_eq!(payload.session_id, s.session_id);
        assert_eq!(payload.step_id, "step-1");
        assert_eq!(payload.reason, Some(StopReason::MaxIterations));
        assert_eq!(payload.iteration_count, 10);
        assert_eq!(payload.continue_count, 0);
        assert_eq!(payload.max_continues, 3);
        assert!(payload.can_continue);
        assert_eq!(payload.remaining_continues, 3);
        assert_eq!(payload.staged_files, summary);
        assert_eq!(payload.staged_files_count, 1);
        assert_eq!(payload.total_tokens.total(), 300);
        assert_eq!(payload.final_text, "ran 10");
        assert_eq!(payload.tool_calls_count, 7);
    }

    #[test]
    fn session_json_round_trip_and_buffer_restore() {
        let mut buffer = StagedEditBuffer::new();
        buffer.write("x.rs", "x", true);
        buffer.delete("y.rs");
        let s = session().update_after_run(&RunResult {
            staged_snapshot: Some(buffer.to_snapshot()),
            ..run(4, 1, 2, 3)
        });

        let json = serde_json::to_string(&s).unwrap();
        let back: LoopSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);

        let restored = back.restore_buffer();
        assert_eq!(restored.read("x.rs"), Some("x"));
        assert!(restored.is_deleted("y.rs"));
        assert!(session().restore_buffer().is_empty());
    }

    #[test]
    fn budgets_from_config() {
        let config = LoopConfig {
            max_continues: 1,
            max_iterations_per_run: 50,
            max_total_tokens: 9,
        };
        let budgets = LoopBudgets::from(&config);
        assert_eq!(budgets.max_iterations_per_run, 50);
        assert_eq!(budgets.max_total_tokens, 9);
    }
}
