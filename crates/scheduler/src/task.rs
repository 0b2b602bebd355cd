use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tickwork_core::TaskError;

/// A unit of work the scheduler can execute.
///
/// Any `Fn() -> Result<(), TaskError> + Send + Sync` closure is an action.
/// Implement the trait directly when the work carries its own state.
pub trait Action: Send + Sync {
    /// Run the work once. An error is reported, it never stops the task's schedule.
    fn run(&self) -> Result<(), TaskError>;
}

impl<F> Action for F
where
    F: Fn() -> Result<(), TaskError> + Send + Sync,
{
    fn run(&self) -> Result<(), TaskError> {
        self()
    }
}

/// Where a task's action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Inline on the dispatch thread, serialized with other synchronous tasks.
    Synchronous,
    /// On the worker pool; may overlap with dispatch and other async tasks.
    Asynchronous,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Scheduled,
    Running,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

/// Answer to a status query: a task state, or `NotFound` for ids the scheduler
/// never issued (or has forgotten).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Scheduled,
    Running,
    Completed,
    Cancelled,
    NotFound,
}

impl From<TaskState> for TaskStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Scheduled => TaskStatus::Scheduled,
            TaskState::Running => TaskStatus::Running,
            TaskState::Completed => TaskStatus::Completed,
            TaskState::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Run an action, turning a panic into [`TaskError::Panicked`].
pub(crate) fn run_guarded(action: &dyn Action) -> Result<(), TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| action.run())) {
        Ok(result) => result,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(TaskError::Panicked(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_actions() {
        let ok = || -> Result<(), TaskError> { Ok(()) };
        let failing = || -> Result<(), TaskError> { Err("no balance".into()) };
        assert!(ok.run().is_ok());
        assert_eq!(failing.run(), Err(TaskError::Failed("no balance".into())));
    }

    #[test]
    fn panics_are_captured() {
        let boom = || -> Result<(), TaskError> { panic!("economy ledger missing") };
        match run_guarded(&boom) {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("ledger missing")),
            other => panic!("expected panic capture, got {other:?}"),
        }
    }

    #[test]
    fn formatted_panic_payload() {
        let boom = || -> Result<(), TaskError> { panic!("player {} offline", 7) };
        assert_eq!(
            run_guarded(&boom),
            Err(TaskError::Panicked("player 7 offline".into()))
        );
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Scheduled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert_eq!(TaskStatus::from(TaskState::Running), TaskStatus::Running);
    }
}
