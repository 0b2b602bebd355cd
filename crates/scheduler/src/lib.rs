//! Tick-synchronized task scheduler.
//!
//! Plugins register deferred and periodic work with a [`Scheduler`]; the host
//! calls [`Scheduler::advance`] once per server tick. Synchronous tasks run
//! inline on the dispatch thread in `(due tick, id)` order, asynchronous tasks
//! run on a bounded worker pool.

pub mod config;
pub mod error;
pub mod metrics;
mod registry;
pub mod reporter;
pub mod runner;
pub mod task;
pub mod types;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use metrics::SchedulerMetrics;
pub use reporter::{ActionFailure, CollectingReporter, FailureReporter, TracingReporter};
pub use runner::Scheduler;
pub use task::{Action, ExecutionMode, TaskState, TaskStatus};
pub use types::{AdvanceReport, TaskInfo};

pub use tickwork_core::{OwnerId, ScheduleError, TaskError, TaskId, Tick};
