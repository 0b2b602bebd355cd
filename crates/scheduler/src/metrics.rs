use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tickwork_core::{OwnerId, Tick};

use crate::task::ExecutionMode;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule`.
    pub tasks_scheduled: u64,
    /// Tasks cancelled (explicitly, by owner, or at shutdown).
    pub tasks_cancelled: u64,
    /// Completed synchronous executions.
    pub sync_executions: u64,
    /// Completed asynchronous executions.
    pub async_executions: u64,
    /// Executions per owner.
    pub executions_by_owner: HashMap<String, u64>,
    /// Failed executions per owner.
    pub failures_by_owner: HashMap<String, u64>,
    /// Average action duration per owner.
    pub avg_duration_by_owner: HashMap<String, Duration>,
    /// Wall-clock time of the last completed execution per owner.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Last tick the dispatcher advanced to.
    pub last_tick: Option<Tick>,
}

impl SchedulerMetrics {
    /// Record a finished execution.
    pub fn record_execution(
        &mut self,
        owner: &OwnerId,
        mode: ExecutionMode,
        duration: Duration,
        failed: bool,
    ) {
        let key = owner.as_str();
        match mode {
            ExecutionMode::Synchronous => self.sync_executions += 1,
            ExecutionMode::Asynchronous => self.async_executions += 1,
        }
        if failed {
            *self.failures_by_owner.entry(key.to_string()).or_default() += 1;
        }
        let count = {
            let c = self.executions_by_owner.entry(key.to_string()).or_default();
            *c += 1;
            *c
        };
        self.last_run.insert(key.to_string(), Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let prev_avg = self
            .avg_duration_by_owner
            .get(key)
            .copied()
            .unwrap_or_default();
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
        self.avg_duration_by_owner.insert(key.to_string(), new_avg);
    }

    pub fn record_scheduled(&mut self) {
        self.tasks_scheduled += 1;
    }

    pub fn record_cancelled(&mut self, count: usize) {
        self.tasks_cancelled += count as u64;
    }

    /// All executions regardless of mode.
    pub fn total_executions(&self) -> u64 {
        self.sync_executions + self.async_executions
    }

    pub fn total_failures(&self) -> u64 {
        self.failures_by_owner.values().sum()
    }
}
