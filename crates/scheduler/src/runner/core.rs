use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tickwork_core::{OwnerId, ScheduleError, TaskError, TaskId, Tick};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::registry::Registry;
use crate::reporter::{FailureReporter, TracingReporter};
use crate::task::{Action, ExecutionMode, TaskStatus};
use crate::types::TaskInfo;

/// Count of asynchronous executions currently on the worker pool.
#[derive(Default)]
pub(super) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn enter(&self) {
        *self.lock() += 1;
    }

    pub(super) fn exit(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub(super) fn current(&self) -> usize {
        *self.lock()
    }

    pub(super) fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .idle
            .wait_timeout_while(guard, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == 0
    }
}

/// State shared between the dispatch thread and pool workers.
pub(super) struct Shared {
    pub(super) registry: Mutex<Registry>,
    pub(super) metrics: RwLock<SchedulerMetrics>,
    pub(super) reporter: Arc<dyn FailureReporter>,
    pub(super) in_flight: InFlight,
}

impl Shared {
    /// Registry state stays consistent across a poisoned lock: actions never
    /// run while it is held.
    pub(super) fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn write_metrics(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        let mut m = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut m);
    }
}

/// The tick scheduler. Plugins register work through it; the host drives it
/// with [`Scheduler::advance`] once per tick.
///
/// Share it as `Arc<Scheduler>`: every method takes `&self`.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) shared: Arc<Shared>,
    /// Held for the whole of an `advance` pass.
    pub(super) dispatching: Mutex<()>,
    /// Runs asynchronous actions.
    pub(super) pool: rayon::ThreadPool,
}

impl Scheduler {
    /// Create a scheduler that logs task failures through `tracing`.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Create a scheduler that hands task failures to `reporter`.
    pub fn with_reporter(
        config: SchedulerConfig,
        reporter: Arc<dyn FailureReporter>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let num_workers = config.resolved_worker_threads();
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(|_| error!("worker thread panicked outside a task action"))
            .build()?;

        info!(
            "Scheduler starting with {} async workers (retired history: {})",
            num_workers, config.retired_history
        );

        Ok(Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new(config.retired_history)),
                metrics: RwLock::new(SchedulerMetrics::default()),
                reporter,
                in_flight: InFlight::default(),
            }),
            dispatching: Mutex::new(()),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a task. It first becomes due `initial_delay` ticks after the
    /// current tick; `period` makes it repeat that many ticks after each run.
    pub fn schedule<F>(
        &self,
        owner: impl Into<OwnerId>,
        action: F,
        initial_delay: u64,
        period: Option<u64>,
        mode: ExecutionMode,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.schedule_action(owner, Arc::new(action), initial_delay, period, mode)
    }

    /// Register a task from an [`Action`] trait object.
    pub fn schedule_action(
        &self,
        owner: impl Into<OwnerId>,
        action: Arc<dyn Action>,
        initial_delay: u64,
        period: Option<u64>,
        mode: ExecutionMode,
    ) -> Result<TaskId, ScheduleError> {
        let owner = owner.into();
        let (id, due) = {
            let mut reg = self.shared.lock_registry();
            let id = reg.insert(owner.clone(), action, initial_delay, period, mode)?;
            (id, reg.current_tick().saturating_add(initial_delay))
        };
        self.shared.write_metrics(|m| m.record_scheduled());
        debug!(
            task = %id,
            owner = %owner,
            due = due.0,
            period = ?period,
            mode = ?mode,
            "task scheduled"
        );
        Ok(id)
    }

    /// Run once on the next tick, on the dispatch thread.
    pub fn run_task<F>(&self, owner: impl Into<OwnerId>, action: F) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.schedule(owner, action, 0, None, ExecutionMode::Synchronous)
    }

    /// Run once after `delay` ticks, on the dispatch thread.
    pub fn run_task_later<F>(
        &self,
        owner: impl Into<OwnerId>,
        action: F,
        delay: u64,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.schedule(owner, action, delay, None, ExecutionMode::Synchronous)
    }

    /// Run every `period` ticks after an initial `delay`, on the dispatch thread.
    pub fn run_task_timer<F>(
        &self,
        owner: impl Into<OwnerId>,
        action: F,
        delay: u64,
        period: u64,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.schedule(owner, action, delay, Some(period), ExecutionMode::Synchronous)
    }

    /// Run on the worker pool after `delay` ticks, repeating if `period` is set.
    pub fn run_task_async<F>(
        &self,
        owner: impl Into<OwnerId>,
        action: F,
        delay: u64,
        period: Option<u64>,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.schedule(owner, action, delay, period, ExecutionMode::Asynchronous)
    }

    // ── Cancellation ────────────────────────────────────────────────

    /// Cancel a task. Unknown or already finished ids are a no-op.
    ///
    /// A running execution is not interrupted; it finishes and the task is
    /// not rescheduled. Returns whether a live task was cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let cancelled = self.shared.lock_registry().cancel(id);
        if cancelled {
            self.shared.write_metrics(|m| m.record_cancelled(1));
            debug!(task = %id, "task cancelled");
        }
        cancelled
    }

    /// Cancel every task registered by `owner` (e.g. when the plugin unloads).
    pub fn cancel_all(&self, owner: &OwnerId) -> usize {
        let count = self.shared.lock_registry().cancel_owner(owner);
        if count > 0 {
            self.shared.write_metrics(|m| m.record_cancelled(count));
            info!(owner = %owner, count, "cancelled owner tasks");
        }
        count
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_state(&self, id: TaskId) -> TaskStatus {
        self.shared.lock_registry().status(id)
    }

    /// Whether the task is waiting for a future tick.
    pub fn is_queued(&self, id: TaskId) -> bool {
        self.get_state(id) == TaskStatus::Scheduled
    }

    /// Whether an execution of the task is in progress. Stays `true` for a
    /// task cancelled mid-execution until that execution returns.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.shared.lock_registry().is_executing(id)
    }

    /// Live tasks (scheduled or running), sorted by id.
    pub fn pending_tasks(&self) -> Vec<TaskInfo> {
        self.shared.lock_registry().snapshot(|_| true)
    }

    pub fn pending_tasks_for(&self, owner: &OwnerId) -> Vec<TaskInfo> {
        self.shared.lock_registry().snapshot(|t| &t.owner == owner)
    }

    pub fn live_tasks(&self) -> usize {
        self.shared.lock_registry().live_count()
    }

    /// The last tick passed to `advance` (`Tick::ZERO` before the first call).
    pub fn current_tick(&self) -> Tick {
        self.shared.lock_registry().current_tick()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Asynchronous executions currently on the worker pool.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.current()
    }

    /// Block until no asynchronous execution is in flight. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.in_flight.wait_idle(timeout)
    }

    /// Refuse new registrations, cancel every task and wait up to `timeout`
    /// for in-flight asynchronous executions. Returns whether the pool drained.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let cancelled = {
            let mut reg = self.shared.lock_registry();
            reg.close();
            reg.cancel_all()
        };
        self.shared.write_metrics(|m| m.record_cancelled(cancelled));
        info!("Scheduler shutdown requested, {} tasks cancelled", cancelled);

        let drained = self.wait_idle(timeout);
        if drained {
            info!("Scheduler stopped");
        } else {
            error!(
                in_flight = self.in_flight(),
                "Scheduler stopped with asynchronous tasks still running"
            );
        }
        drained
    }
}
