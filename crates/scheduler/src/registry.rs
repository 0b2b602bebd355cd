//! Task registry: every live task plus a bounded memory of retired ones.
//!
//! Pure bookkeeping, no locking and no action calls. The runner wraps it in a
//! single `Mutex` and only holds that lock while calling into this module.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tickwork_core::{OwnerId, ScheduleError, TaskId, Tick};

use crate::task::{Action, ExecutionMode, TaskState, TaskStatus};
use crate::types::TaskInfo;

pub(crate) struct TaskEntry {
    pub owner: OwnerId,
    pub action: Arc<dyn Action>,
    pub period: Option<u64>,
    pub mode: ExecutionMode,
    pub state: TaskState,
    pub next_due: Tick,
    pub registered_at: Tick,
    pub runs: u64,
}

/// A task taken out of `Scheduled` for execution.
#[derive(Clone)]
pub(crate) struct Claim {
    pub id: TaskId,
    pub owner: OwnerId,
    pub action: Arc<dyn Action>,
    pub mode: ExecutionMode,
}

/// Outcome of bookkeeping after an execution finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Rescheduled(Tick),
    Completed,
    Cancelled,
}

/// How a requested tick relates to the previous one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickStart {
    /// Due task ids in dispatch order.
    Due(Vec<TaskId>),
    Duplicate,
    Rewind { last: Tick },
}

pub(crate) struct Registry {
    tasks: HashMap<TaskId, TaskEntry>,
    retired: HashMap<TaskId, TaskState>,
    retired_order: VecDeque<TaskId>,
    retired_capacity: usize,
    next_id: u64,
    current_tick: Tick,
    last_advanced: Option<Tick>,
    accepting: bool,
}

impl Registry {
    pub fn new(retired_capacity: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            retired: HashMap::new(),
            retired_order: VecDeque::new(),
            retired_capacity,
            next_id: 1,
            current_tick: Tick::ZERO,
            last_advanced: None,
            accepting: true,
        }
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn live_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting registrations.
    pub fn close(&mut self) {
        self.accepting = false;
    }

    pub fn insert(
        &mut self,
        owner: OwnerId,
        action: Arc<dyn Action>,
        initial_delay: u64,
        period: Option<u64>,
        mode: ExecutionMode,
    ) -> Result<TaskId, ScheduleError> {
        if !self.accepting {
            return Err(ScheduleError::ShutDown);
        }
        if period == Some(0) {
            return Err(ScheduleError::InvalidScheduleParameters(
                "period must be greater than zero".into(),
            ));
        }
        let next_due = self.current_tick.checked_add(initial_delay).ok_or_else(|| {
            ScheduleError::InvalidScheduleParameters(format!(
                "initial delay {initial_delay} overflows the tick counter at {}",
                self.current_tick
            ))
        })?;

        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(
            id,
            TaskEntry {
                owner,
                action,
                period,
                mode,
                state: TaskState::Scheduled,
                next_due,
                registered_at: self.current_tick,
                runs: 0,
            },
        );
        Ok(id)
    }

    /// Move the clock to `tick` and list the tasks due on it.
    pub fn begin_tick(&mut self, tick: Tick) -> TickStart {
        if let Some(last) = self.last_advanced {
            if tick == last {
                return TickStart::Duplicate;
            }
            if tick < last {
                return TickStart::Rewind { last };
            }
        }
        self.last_advanced = Some(tick);
        self.current_tick = tick;

        let mut due: Vec<(Tick, TaskId)> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.state == TaskState::Scheduled && t.next_due <= tick)
            .map(|(id, t)| (t.next_due, *id))
            .collect();
        due.sort_unstable();
        TickStart::Due(due.into_iter().map(|(_, id)| id).collect())
    }

    /// Mark a due task `Running`. `None` if it was cancelled (or otherwise
    /// stopped being due) since `begin_tick` listed it.
    pub fn claim(&mut self, id: TaskId) -> Option<Claim> {
        let tick = self.current_tick;
        let entry = self.tasks.get_mut(&id)?;
        if entry.state != TaskState::Scheduled || entry.next_due > tick {
            return None;
        }
        entry.state = TaskState::Running;
        entry.runs += 1;
        Some(Claim {
            id,
            owner: entry.owner.clone(),
            action: Arc::clone(&entry.action),
            mode: entry.mode,
        })
    }

    /// Called by a pool worker as it picks up a claimed job. A job cancelled
    /// while it waited in the pool queue is retired here and must not run.
    pub fn begin_execution(&mut self, id: TaskId) -> bool {
        match self.tasks.get(&id).map(|t| t.state) {
            Some(TaskState::Running) => true,
            Some(TaskState::Cancelled) => {
                self.retire(id, TaskState::Cancelled);
                false
            }
            _ => false,
        }
    }

    /// Reschedule or retire a task whose execution just ended. `None` if the
    /// id is not live.
    pub fn finish(&mut self, id: TaskId) -> Option<Finish> {
        let tick = self.current_tick;
        let entry = self.tasks.get_mut(&id)?;
        let finish = match (entry.state, entry.period) {
            (TaskState::Cancelled, _) => {
                self.retire(id, TaskState::Cancelled);
                Finish::Cancelled
            }
            (_, Some(period)) => {
                entry.state = TaskState::Scheduled;
                entry.next_due = tick.saturating_add(period);
                Finish::Rescheduled(entry.next_due)
            }
            (_, None) => {
                self.retire(id, TaskState::Completed);
                Finish::Completed
            }
        };
        Some(finish)
    }

    /// Cancel one task. Returns `true` if a live task changed to `Cancelled`.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return false;
        };
        match entry.state {
            TaskState::Scheduled => {
                self.retire(id, TaskState::Cancelled);
                true
            }
            // In flight: the execution finishes, `finish` retires it.
            TaskState::Running => {
                entry.state = TaskState::Cancelled;
                true
            }
            TaskState::Cancelled | TaskState::Completed => false,
        }
    }

    pub fn cancel_owner(&mut self, owner: &OwnerId) -> usize {
        let ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, t)| &t.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn status(&self, id: TaskId) -> TaskStatus {
        if let Some(entry) = self.tasks.get(&id) {
            return entry.state.into();
        }
        self.retired
            .get(&id)
            .map(|s| TaskStatus::from(*s))
            .unwrap_or(TaskStatus::NotFound)
    }

    /// A live task that is not waiting to be due is mid-execution.
    pub fn is_executing(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|t| t.state != TaskState::Scheduled)
    }

    /// Live tasks matching `filter`, sorted by id.
    pub fn snapshot(&self, filter: impl Fn(&TaskEntry) -> bool) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self
            .tasks
            .iter()
            .filter(|(_, t)| filter(t))
            .map(|(id, t)| TaskInfo {
                id: *id,
                owner: t.owner.clone(),
                mode: t.mode,
                state: t.state,
                period: t.period,
                next_due: t.next_due,
                registered_at: t.registered_at,
                runs: t.runs,
            })
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Remove a live task and remember its terminal state.
    fn retire(&mut self, id: TaskId, state: TaskState) {
        self.tasks.remove(&id);
        if self.retired_capacity == 0 {
            return;
        }
        self.retired.insert(id, state);
        self.retired_order.push_back(id);
        while self.retired_order.len() > self.retired_capacity {
            if let Some(old) = self.retired_order.pop_front() {
                self.retired.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tickwork_core::TaskError;

    use super::*;

    fn noop() -> Arc<dyn Action> {
        Arc::new(|| -> Result<(), TaskError> { Ok(()) })
    }

    fn owner(name: &str) -> OwnerId {
        OwnerId::new(name)
    }

    fn due(reg: &mut Registry, tick: u64) -> Vec<TaskId> {
        match reg.begin_tick(Tick(tick)) {
            TickStart::Due(ids) => ids,
            other => panic!("expected due list, got {other:?}"),
        }
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let mut reg = Registry::new(16);
        let a = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        let b = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        assert_eq!(a, TaskId(1));
        assert_eq!(b, TaskId(2));
    }

    #[test]
    fn zero_period_rejected_without_consuming_id() {
        let mut reg = Registry::new(16);
        let err = reg
            .insert(owner("p"), noop(), 0, Some(0), ExecutionMode::Synchronous)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidScheduleParameters(_)));
        assert_eq!(reg.live_count(), 0);
        let id = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        assert_eq!(id, TaskId(1));
    }

    #[test]
    fn overflowing_delay_rejected() {
        let mut reg = Registry::new(16);
        due(&mut reg, 10);
        let err = reg
            .insert(owner("p"), noop(), u64::MAX, None, ExecutionMode::Synchronous)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidScheduleParameters(_)));
    }

    #[test]
    fn due_order_is_due_tick_then_id() {
        let mut reg = Registry::new(16);
        let late = reg.insert(owner("p"), noop(), 3, None, ExecutionMode::Synchronous).unwrap();
        let early_a = reg.insert(owner("p"), noop(), 1, None, ExecutionMode::Synchronous).unwrap();
        let early_b = reg.insert(owner("p"), noop(), 1, None, ExecutionMode::Asynchronous).unwrap();
        assert_eq!(due(&mut reg, 5), vec![early_a, early_b, late]);
    }

    #[test]
    fn duplicate_and_rewind_ticks() {
        let mut reg = Registry::new(16);
        due(&mut reg, 4);
        assert_eq!(reg.begin_tick(Tick(4)), TickStart::Duplicate);
        assert_eq!(reg.begin_tick(Tick(2)), TickStart::Rewind { last: Tick(4) });
        assert_eq!(reg.current_tick(), Tick(4));
    }

    #[test]
    fn periodic_task_reschedules_from_completion_tick() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, Some(20), ExecutionMode::Synchronous).unwrap();
        assert_eq!(due(&mut reg, 0), vec![id]);
        assert!(reg.claim(id).is_some());
        assert_eq!(reg.status(id), TaskStatus::Running);
        assert_eq!(reg.finish(id), Some(Finish::Rescheduled(Tick(20))));
        assert_eq!(reg.status(id), TaskStatus::Scheduled);
    }

    #[test]
    fn one_shot_task_retires_as_completed() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        due(&mut reg, 1);
        reg.claim(id).unwrap();
        assert_eq!(reg.finish(id), Some(Finish::Completed));
        assert_eq!(reg.status(id), TaskStatus::Completed);
        assert_eq!(reg.live_count(), 0);
        assert!(!reg.cancel(id));
        assert_eq!(reg.status(id), TaskStatus::Completed);
    }

    #[test]
    fn cancel_scheduled_removes_immediately() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, Some(5), ExecutionMode::Synchronous).unwrap();
        assert!(reg.cancel(id));
        assert!(!reg.cancel(id));
        assert_eq!(reg.status(id), TaskStatus::Cancelled);
        assert!(due(&mut reg, 10).is_empty());
    }

    #[test]
    fn cancel_after_listing_prevents_claim() {
        let mut reg = Registry::new(16);
        let a = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        let b = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap();
        assert_eq!(due(&mut reg, 1), vec![a, b]);
        reg.cancel(b);
        assert!(reg.claim(a).is_some());
        assert!(reg.claim(b).is_none());
    }

    #[test]
    fn cancel_running_periodic_suppresses_reschedule() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, Some(1), ExecutionMode::Asynchronous).unwrap();
        due(&mut reg, 0);
        reg.claim(id).unwrap();
        assert!(reg.cancel(id));
        assert_eq!(reg.status(id), TaskStatus::Cancelled);
        assert!(reg.is_executing(id));
        assert!(!reg.cancel(id));
        assert_eq!(reg.finish(id), Some(Finish::Cancelled));
        assert!(!reg.is_executing(id));
        assert_eq!(reg.live_count(), 0);
        assert_eq!(reg.status(id), TaskStatus::Cancelled);
    }

    #[test]
    fn queued_job_cancelled_before_start_is_retired_unrun() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, Some(3), ExecutionMode::Asynchronous).unwrap();
        due(&mut reg, 0);
        reg.claim(id).unwrap();
        assert!(reg.cancel(id));
        assert!(!reg.begin_execution(id));
        assert_eq!(reg.status(id), TaskStatus::Cancelled);
        assert!(!reg.is_executing(id));
        assert_eq!(reg.live_count(), 0);
        assert_eq!(reg.finish(id), None);
    }

    #[test]
    fn claimed_job_starts_normally() {
        let mut reg = Registry::new(16);
        let id = reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Asynchronous).unwrap();
        due(&mut reg, 0);
        reg.claim(id).unwrap();
        assert!(reg.begin_execution(id));
        assert_eq!(reg.status(id), TaskStatus::Running);
        assert!(!reg.begin_execution(TaskId(99)));
    }

    #[test]
    fn cancel_owner_only_touches_that_owner() {
        let mut reg = Registry::new(16);
        let a = reg.insert(owner("economy"), noop(), 0, Some(10), ExecutionMode::Synchronous).unwrap();
        let b = reg.insert(owner("chat"), noop(), 0, Some(10), ExecutionMode::Synchronous).unwrap();
        let c = reg.insert(owner("economy"), noop(), 4, None, ExecutionMode::Asynchronous).unwrap();
        assert_eq!(reg.cancel_owner(&owner("economy")), 2);
        assert_eq!(reg.status(a), TaskStatus::Cancelled);
        assert_eq!(reg.status(b), TaskStatus::Scheduled);
        assert_eq!(reg.status(c), TaskStatus::Cancelled);
        assert_eq!(reg.cancel_owner(&owner("economy")), 0);
    }

    #[test]
    fn retired_history_is_bounded() {
        let mut reg = Registry::new(2);
        let ids: Vec<TaskId> = (0..3)
            .map(|_| reg.insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous).unwrap())
            .collect();
        for id in &ids {
            reg.cancel(*id);
        }
        assert_eq!(reg.status(ids[0]), TaskStatus::NotFound);
        assert_eq!(reg.status(ids[1]), TaskStatus::Cancelled);
        assert_eq!(reg.status(ids[2]), TaskStatus::Cancelled);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let reg = Registry::new(16);
        assert_eq!(reg.status(TaskId(99)), TaskStatus::NotFound);
    }

    #[test]
    fn closed_registry_refuses_tasks() {
        let mut reg = Registry::new(16);
        reg.close();
        let err = reg
            .insert(owner("p"), noop(), 0, None, ExecutionMode::Synchronous)
            .unwrap_err();
        assert_eq!(err, ScheduleError::ShutDown);
    }

    #[test]
    fn snapshot_sorted_and_filtered() {
        let mut reg = Registry::new(16);
        reg.insert(owner("b"), noop(), 2, None, ExecutionMode::Synchronous).unwrap();
        reg.insert(owner("a"), noop(), 1, Some(3), ExecutionMode::Asynchronous).unwrap();
        let all = reg.snapshot(|_| true);
        assert_eq!(all.iter().map(|i| i.id.0).collect::<Vec<_>>(), vec![1, 2]);
        let only_a = reg.snapshot(|t| t.owner.as_str() == "a");
        assert_eq!(only_a.len(), 1);
        assert!(only_a[0].is_periodic());
        assert_eq!(only_a[0].next_due, Tick(1));
    }
}
