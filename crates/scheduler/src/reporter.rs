use std::sync::Mutex;

use tickwork_core::{OwnerId, TaskError, TaskId, Tick};
use tracing::warn;

use crate::task::ExecutionMode;

/// A task action that failed during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub task_id: TaskId,
    pub owner: OwnerId,
    /// Scheduler tick when the failure was observed.
    pub tick: Tick,
    pub mode: ExecutionMode,
    pub error: TaskError,
}

/// Receives execution failures. Called outside the registry lock, so an
/// implementation may call back into the scheduler (e.g. to cancel the task).
pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: &ActionFailure);
}

/// Default reporter: logs each failure at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &ActionFailure) {
        warn!(
            task = %failure.task_id,
            owner = %failure.owner,
            tick = failure.tick.0,
            mode = ?failure.mode,
            error = %failure.error,
            "scheduled task failed"
        );
    }
}

/// Keeps every reported failure in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    failures: Mutex<Vec<ActionFailure>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures reported so far, oldest first.
    pub fn failures(&self) -> Vec<ActionFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn failures_for(&self, owner: &OwnerId) -> Vec<ActionFailure> {
        self.failures()
            .into_iter()
            .filter(|f| &f.owner == owner)
            .collect()
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, failure: &ActionFailure) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure.clone());
    }
}
