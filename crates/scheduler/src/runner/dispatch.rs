use std::sync::{Arc, TryLockError};
use std::time::{Duration, Instant};

use tickwork_core::{TaskError, Tick};
use tracing::{debug, warn};

use crate::registry::{Claim, Finish, TickStart};
use crate::reporter::ActionFailure;
use crate::task::{run_guarded, ExecutionMode};
use crate::types::AdvanceReport;

use super::core::Shared;
use super::Scheduler;

/// Releases an in-flight slot when the worker job ends, even by unwinding.
struct InFlightGuard(Arc<Shared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.exit();
    }
}

impl Shared {
    /// Run a claimed action on the current thread and book the outcome.
    /// Returns `false` if the action failed.
    fn execute(&self, claim: Claim) -> bool {
        let started = Instant::now();
        let outcome = run_guarded(claim.action.as_ref());
        self.complete(&claim, outcome, started.elapsed())
    }

    /// Worker-side entry point for an asynchronous claim.
    fn execute_queued(&self, claim: Claim) {
        let start = self.lock_registry().begin_execution(claim.id);
        if !start {
            debug!(task = %claim.id, owner = %claim.owner, "task cancelled while queued, not run");
            return;
        }
        self.execute(claim);
    }

    fn complete(&self, claim: &Claim, outcome: Result<(), TaskError>, elapsed: Duration) -> bool {
        let (tick, finish) = {
            let mut reg = self.lock_registry();
            let finish = reg.finish(claim.id);
            (reg.current_tick(), finish)
        };
        let failed = outcome.is_err();
        self.write_metrics(|m| m.record_execution(&claim.owner, claim.mode, elapsed, failed));

        match finish {
            Some(Finish::Rescheduled(next)) => {
                debug!(task = %claim.id, owner = %claim.owner, next_due = next.0, "task rescheduled")
            }
            Some(Finish::Completed) => {
                debug!(task = %claim.id, owner = %claim.owner, "task completed")
            }
            Some(Finish::Cancelled) => {
                debug!(task = %claim.id, owner = %claim.owner, "cancelled task finished its last run")
            }
            None => {}
        }

        // Reported outside the registry lock so the reporter may call back in.
        if let Err(error) = outcome {
            self.reporter.report(&ActionFailure {
                task_id: claim.id,
                owner: claim.owner.clone(),
                tick,
                mode: claim.mode,
                error,
            });
        }
        !failed
    }
}

impl Scheduler {
    /// Advance the clock to `tick` and dispatch every task due on it.
    ///
    /// Due tasks start in `(due tick, id)` order. Synchronous actions run here,
    /// one at a time, before the next due task is looked at; asynchronous ones
    /// are handed to the worker pool and never waited on. A tick equal to or
    /// lower than the previous one dispatches nothing.
    ///
    /// Only one pass runs at a time. A call made while another pass is in
    /// progress (from another thread, or from inside a synchronous action)
    /// dispatches nothing and leaves the clock alone.
    pub fn advance(&self, tick: Tick) -> AdvanceReport {
        let _pass = match self.dispatching.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!(tick = tick.0, "advance called during another pass, ignored");
                return AdvanceReport::skipped_at(tick);
            }
        };

        let start = self.shared.lock_registry().begin_tick(tick);
        let due = match start {
            TickStart::Due(ids) => ids,
            TickStart::Duplicate => {
                debug!(tick = tick.0, "duplicate tick ignored");
                return AdvanceReport::skipped_at(tick);
            }
            TickStart::Rewind { last } => {
                warn!(tick = tick.0, last = last.0, "tick went backwards, ignored");
                return AdvanceReport::skipped_at(tick);
            }
        };
        self.shared.write_metrics(|m| m.last_tick = Some(tick));

        let mut report = AdvanceReport { tick, ..AdvanceReport::default() };
        for id in due {
            // A cancel issued since the due list was built wins.
            let claim = self.shared.lock_registry().claim(id);
            let Some(claim) = claim else {
                debug!(task = %id, "due task no longer scheduled, skipped");
                continue;
            };

            match claim.mode {
                ExecutionMode::Synchronous => {
                    report.executed_sync += 1;
                    if !self.shared.execute(claim) {
                        report.failed_sync += 1;
                    }
                }
                ExecutionMode::Asynchronous => {
                    self.submit(claim);
                    report.submitted_async += 1;
                }
            }
        }

        if report.dispatched() > 0 {
            debug!(
                tick = tick.0,
                sync = report.executed_sync,
                failed = report.failed_sync,
                submitted = report.submitted_async,
                "tick dispatched"
            );
        }
        report
    }

    /// Hand an asynchronous action to the worker pool.
    fn submit(&self, claim: Claim) {
        self.shared.in_flight.enter();
        let guard = InFlightGuard(Arc::clone(&self.shared));
        self.pool.spawn(move || {
            guard.0.execute_queued(claim);
            drop(guard);
        });
    }
}
