//! Shared engine state handed to the strategies.
//!
//! The context owns the registry, the resource tracker and the futures
//! table. Strategies only change them through the operations defined here,
//! so no strategy ever keeps its own copy of resource counts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::{
    Demand, EventKind, JobOutcome, JobSpec, JobTemplate, QueueCounts, RunId, SchedulerEvent, TaskId,
    TaskName, TaskSpec,
};
use crate::error::{ResourceError, SchedulerError};
use crate::ports::{Clock, EventSink, IdGenerator, JobHandle, LaunchStatus, ResolvedTask, RestartHook};
use crate::queue::{FuturesTable, TaskFuture, TaskRecord, TaskRegistry};
use crate::resources::ResourceTracker;
use crate::strategy::SubmissionStrategy;

/// How a resolved future was folded back into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Failed,
    /// The future had already been removed; nothing happened.
    Stale,
}

pub struct SchedulerContext {
    pub(crate) run_id: RunId,
    pub(crate) registry: TaskRegistry,
    pub(crate) tracker: ResourceTracker,
    pub(crate) futures: FuturesTable,
    pub(crate) handle: Arc<dyn JobHandle>,
    pub(crate) template: JobTemplate,
    pub(crate) restart: Box<dyn RestartHook>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
}

impl SchedulerContext {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub fn futures(&self) -> &FuturesTable {
        &self.futures
    }

    pub fn template(&self) -> &JobTemplate {
        &self.template
    }

    /// The one job handle of this process.
    pub fn handle(&self) -> &Arc<dyn JobHandle> {
        &self.handle
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn counts(&self) -> QueueCounts {
        self.registry.counts().with_free(self.tracker.available())
    }

    pub(crate) fn emit(&self, kind: EventKind) {
        let event = SchedulerEvent {
            at: self.clock.now(),
            counts: self.counts(),
            kind,
        };
        self.events.emit(&event);
    }

    /// Add a pending task. Its demand is fixed here from the template.
    ///
    /// Both the demand and what `submission` would reserve for the task must
    /// fit the allocation; otherwise no pass could ever admit it.
    pub fn enqueue(
        &mut self,
        spec: TaskSpec,
        submission: &dyn SubmissionStrategy,
    ) -> Result<TaskId, SchedulerError> {
        let demand = self.template.request_for(&spec).demand();
        let id = self.ids.generate_task_id();
        let record = TaskRecord::new(id, spec, demand, self.clock.now());

        let total = self.tracker.total();
        let cost = submission.cost(&record);
        if let Some(needed) = [demand, cost].into_iter().find(|d| !d.fits_within(total)) {
            return Err(SchedulerError::Unsatisfiable {
                name: record.name().clone(),
                demand: needed,
                total,
            });
        }

        let name = record.name().clone();
        self.registry.insert(record)?;
        debug!(task_id = %id, name = %name, ?demand, "task queued");
        self.emit(EventKind::TaskQueued { task_id: id, name });
        Ok(id)
    }

    /// Pending -> in flight. Called once the launcher accepted the job and
    /// `reservation` was taken from the tracker.
    pub(crate) fn track(&mut self, future: TaskFuture) -> Result<(), SchedulerError> {
        let id = future.task_id();
        let reserved = future.reservation();
        let job_ref = future.job_ref();
        self.registry.mark_submitted(id, self.clock.now())?;
        self.registry.attach_job(id, future.spec().clone())?;
        self.futures.insert(future)?;

        let name = self.task_name(id)?;
        debug!(task_id = %id, name = %name, job = %job_ref, ?reserved, "task submitted");
        self.emit(EventKind::TaskSubmitted {
            task_id: id,
            name,
            reserved,
        });
        Ok(())
    }

    /// The launcher declined the job: give the reservation back and fail the
    /// task. It is not retried.
    pub(crate) fn reject(
        &mut self,
        id: TaskId,
        reservation: Demand,
        job: JobSpec,
        reason: String,
    ) -> Result<(), SchedulerError> {
        self.release(reservation)?;
        let now = self.clock.now();
        self.registry.mark_submitted(id, now)?;
        self.registry.attach_job(id, job)?;
        self.registry.fail(id, reason.clone(), now)?;

        let name = self.task_name(id)?;
        warn!(task_id = %id, name = %name, %reason, "submission rejected");
        self.emit(EventKind::SubmissionRejected {
            task_id: id,
            name,
            reason,
        });
        Ok(())
    }

    /// Poll one outstanding future without blocking. `None` if the future is
    /// no longer in the table.
    pub fn poll(&mut self, id: TaskId) -> Option<LaunchStatus> {
        self.futures.get_mut(id).map(TaskFuture::poll)
    }

    /// Record that the launcher reported the job as started.
    pub fn note_running(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if self.registry.mark_running(id, self.clock.now())? {
            let name = self.task_name(id)?;
            self.emit(EventKind::TaskRunning { task_id: id, name });
        }
        Ok(())
    }

    /// Fold a resolved future back into the engine.
    ///
    /// The task moves to `completed` or `failed`, its reservation goes back
    /// to the tracker, the restart hook runs once, and only then is the
    /// future removed from the table. A second resolution of the same id is
    /// ignored.
    pub fn resolve(&mut self, id: TaskId, outcome: JobOutcome) -> Result<Resolution, SchedulerError> {
        let Some(future) = self.futures.get_mut(id) else {
            debug!(task_id = %id, "duplicate resolution ignored");
            return Ok(Resolution::Stale);
        };
        let reservation = future.reservation();
        let workdir = future.spec().workdir.clone();
        let job_ref = future.job_ref();

        let name = match self.registry.get(id) {
            Some(record) => record.name().clone(),
            None => {
                return Err(SchedulerError::invariant(format!(
                    "future {job_ref} resolved for task {id} which has no registry entry"
                )));
            }
        };

        let now = self.clock.now();
        let resolution = match outcome.failure_reason() {
            None => {
                self.registry.complete(id, now)?;
                Resolution::Completed
            }
            Some(reason) => {
                self.registry.fail(id, reason, now)?;
                Resolution::Failed
            }
        };
        self.release(reservation)?;

        let resolved = ResolvedTask {
            task_id: id,
            name: &name,
            outcome: &outcome,
            workdir: &workdir,
        };
        if let Err(err) = self.restart.on_resolved(resolved) {
            warn!(task_id = %id, name = %name, error = %err, "restart hook failed");
        }
        self.futures.remove(id);

        match resolution {
            Resolution::Completed => {
                info!(task_id = %id, name = %name, job = %job_ref, "task completed");
                self.emit(EventKind::TaskCompleted { task_id: id, name });
            }
            _ => {
                warn!(task_id = %id, name = %name, job = %job_ref, ?outcome, "task failed");
                self.emit(EventKind::TaskFailed {
                    task_id: id,
                    name,
                    outcome,
                });
            }
        }
        Ok(resolution)
    }

    /// Queue partition plus resource conservation:
    /// `available + sum(in-flight reservations) == total`.
    pub fn check_invariants(&self) -> Result<(), SchedulerError> {
        self.registry.check_partition()?;

        let total = self.tracker.total();
        let accounted = self.tracker.available().saturating_add(self.futures.reserved());
        if accounted != total {
            return Err(SchedulerError::invariant(format!(
                "resource leak: available + reserved = {accounted:?}, total = {total:?}"
            )));
        }

        let in_flight = self.registry.running().count();
        if in_flight != self.futures.len() {
            return Err(SchedulerError::invariant(format!(
                "{in_flight} task(s) in flight but {} outstanding future(s)",
                self.futures.len()
            )));
        }
        Ok(())
    }

    fn release(&self, demand: Demand) -> Result<(), SchedulerError> {
        match self.tracker.release(demand) {
            Ok(_) => Ok(()),
            Err(err @ ResourceError::OverRelease { .. }) => {
                error!(error = %err, "double release detected");
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn task_name(&self, id: TaskId) -> Result<TaskName, SchedulerError> {
        self.registry
            .get(id)
            .map(|record| record.name().clone())
            .ok_or_else(|| SchedulerError::invariant(format!("no registry entry for task {id}")))
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("run_id", &self.run_id)
            .field("counts", &self.counts())
            .field("futures", &self.futures.len())
            .finish_non_exhaustive()
    }
}
