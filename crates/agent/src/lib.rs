//! Resumable agent-loop state for editstage.
//!
//! An agent run is bounded by per-run iteration and session-wide token
//! budgets. When a run stops short, the host pauses it, shows the user what
//! is staged, and may continue it later:
//!
//! 1. **Run** the loop against a [`StagedToolProvider`](editstage_staging::StagedToolProvider)
//! 2. **Fold** the run into the [`LoopSession`] with [`LoopSession::update_after_run`]
//! 3. **Pause**: build a `loop_paused` payload and persist the session in a [`SessionStore`]
//! 4. **Continue**: reload, [`LoopSession::increment_continue`], restore the staged buffer
//!
//! Chunked multi-file edits track their retries in an [`EditAttemptLedger`].

pub mod ledger;
pub mod session;
pub mod store;

pub use ledger::{
    CompletedDiff, EditAttemptLedger, EditAttemptLedgerState, FileAttemptStatus, FileEditAttempt,
    LedgerOptions, LedgerProgress, LedgerStatus, TargetFile, TouchedFile,
};
pub use session::{LoopBudgets, LoopSession, LoopSessionParams, RunResult};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
