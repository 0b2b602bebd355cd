use thiserror::Error;

/// Registration failures, surfaced synchronously to the caller of `schedule`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid schedule parameters: {0}")]
    InvalidScheduleParameters(String),

    #[error("scheduler is shut down")]
    ShutDown,
}

/// Error returned by a task action.
///
/// Never propagated past the dispatcher: it is handed to the failure reporter
/// and the task carries on with its schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<String> for TaskError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for TaskError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}
