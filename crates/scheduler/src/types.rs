use serde::Serialize;
use tickwork_core::{OwnerId, TaskId, Tick};

use crate::task::{ExecutionMode, TaskState};

/// Read-only snapshot of a live task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub owner: OwnerId,
    pub mode: ExecutionMode,
    pub state: TaskState,
    /// `None` for one-shot tasks.
    pub period: Option<u64>,
    pub next_due: Tick,
    pub registered_at: Tick,
    /// Executions started so far.
    pub runs: u64,
}

impl TaskInfo {
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }
}

/// What a single `advance` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    pub tick: Tick,
    /// Synchronous actions executed inline (including failed ones).
    pub executed_sync: usize,
    /// Synchronous actions that returned an error or panicked.
    pub failed_sync: usize,
    /// Asynchronous actions handed to the worker pool.
    pub submitted_async: usize,
    /// The tick was a duplicate or went backwards, nothing was dispatched.
    pub skipped: bool,
}

impl AdvanceReport {
    pub(crate) fn skipped_at(tick: Tick) -> Self {
        Self { tick, skipped: true, ..Self::default() }
    }

    /// Total actions started during the pass.
    pub fn dispatched(&self) -> usize {
        self.executed_sync + self.submitted_async
    }
}
