//! The scheduling super-loop.
//!
//! While anything is pending or running: run the submission strategy's
//! admission pass, run the processing strategy's reaping pass, check the
//! bookkeeping invariants, repeat. Individual task failures never end the
//! loop; only running out of work does.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::domain::{EventKind, TaskId, TaskSpec};
use crate::error::SchedulerError;
use crate::queue::{RetryPolicy, TaskRegistry};
use crate::resources::ResourceTracker;
use crate::strategy::{PassSummary, ProcessingStrategy, SubmissionStrategy};

use super::context::SchedulerContext;
use super::report::RunReport;

/// What one super-loop pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub pass: u64,
    /// Attempts made by the admission pass at the top of the loop.
    pub submitted: usize,
    pub processing: PassSummary,
    pub pending: usize,
    pub running: usize,
}

impl PassReport {
    /// Nothing moved and nothing can: tasks are pending, none are running,
    /// and the active strategy admitted none of them.
    pub fn is_stalled(&self) -> bool {
        self.pending > 0
            && self.running == 0
            && self.submitted == 0
            && self.processing.backfilled == 0
            && self.processing.reaped() == 0
    }
}

pub struct Scheduler {
    ctx: SchedulerContext,
    submission: Box<dyn SubmissionStrategy>,
    processing: Box<dyn ProcessingStrategy>,
    buffer_time: Duration,
    passes: u64,
}

impl Scheduler {
    pub(crate) fn new(
        ctx: SchedulerContext,
        submission: Box<dyn SubmissionStrategy>,
        processing: Box<dyn ProcessingStrategy>,
        buffer_time: Duration,
    ) -> Self {
        Self {
            ctx,
            submission,
            processing,
            buffer_time,
            passes: 0,
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.ctx.registry()
    }

    pub fn tracker(&self) -> &ResourceTracker {
        self.ctx.tracker()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn buffer_time(&self) -> Duration {
        self.buffer_time
    }

    pub fn submission(&self) -> &dyn SubmissionStrategy {
        self.submission.as_ref()
    }

    pub fn processing(&self) -> &dyn ProcessingStrategy {
        self.processing.as_ref()
    }

    /// Swap the submission strategy. Takes effect on the next pass.
    pub fn set_submission(&mut self, strategy: Box<dyn SubmissionStrategy>) {
        debug!(from = self.submission.name(), to = strategy.name(), "submission strategy swapped");
        self.submission = strategy;
    }

    /// Swap the processing strategy. Takes effect on the next pass.
    pub fn set_processing(&mut self, strategy: Box<dyn ProcessingStrategy>) {
        debug!(from = self.processing.name(), to = strategy.name(), "processing strategy swapped");
        self.processing = strategy;
    }

    /// Pending or running tasks remain.
    pub fn has_work(&self) -> bool {
        self.ctx.registry.has_pending() || self.ctx.registry.has_running()
    }

    /// Add a task between passes. Its name must not be in use yet; retries
    /// of a failed task keep its name but only come from `retry_failed`.
    pub fn inject(&mut self, spec: TaskSpec) -> Result<TaskId, SchedulerError> {
        if self.ctx.registry.find_by_name(spec.name.as_str()).is_some() {
            return Err(SchedulerError::DuplicateTaskName(spec.name));
        }
        self.ctx.enqueue(spec, self.submission.as_ref())
    }

    /// One super-loop pass.
    pub async fn step(&mut self) -> Result<PassReport, SchedulerError> {
        self.passes += 1;
        let pass = self.passes;
        debug!(pass, submission = self.submission.name(), processing = self.processing.name(), "pass start");

        let submitted = self
            .submission
            .submit_until_exhausted(&mut self.ctx, self.buffer_time)
            .await?;
        let processing = self
            .processing
            .process_futures(&mut self.ctx, self.submission.as_ref(), self.buffer_time)
            .await?;

        if let Err(err) = self.ctx.check_invariants() {
            error!(pass, error = %err, "bookkeeping corrupted, aborting");
            return Err(err);
        }

        let counts = self.ctx.counts();
        self.ctx.emit(EventKind::Progress { pass });
        debug!(
            pass,
            submitted,
            backfilled = processing.backfilled,
            pending = counts.pending,
            running = counts.running,
            completed = counts.completed,
            failed = counts.failed,
            free_cores = counts.free_cores,
            free_gpus = counts.free_gpus,
            "pass done"
        );

        Ok(PassReport {
            pass,
            submitted,
            processing,
            pending: counts.pending,
            running: counts.running,
        })
    }

    /// Run passes until nothing is pending or running.
    pub async fn run(&mut self) -> Result<RunReport, SchedulerError> {
        let started = Instant::now();
        let counts = self.ctx.counts();
        info!(
            run_id = %self.ctx.run_id(),
            pending = counts.pending,
            total_cores = self.ctx.tracker.total().cores,
            total_gpus = self.ctx.tracker.total().gpus,
            submission = self.submission.name(),
            processing = self.processing.name(),
            "run started"
        );

        self.drain().await?;

        let report = self.report(started.elapsed());
        info!(
            run_id = %report.run_id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            passes = report.passes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    /// `run`, then up to `policy.max_attempts - 1` rounds of retrying
    /// whatever failed, each after the policy's backoff delay.
    pub async fn run_with_retries(&mut self, policy: &RetryPolicy) -> Result<RunReport, SchedulerError> {
        let started = Instant::now();
        self.drain().await?;

        let mut round = 1;
        loop {
            let retried = self.retry_failed(policy)?;
            if retried.is_empty() {
                break;
            }
            let delay = policy.next_delay(round);
            info!(round, tasks = retried.len(), delay_ms = delay.as_millis() as u64, "retrying failed tasks");
            tokio::time::sleep(delay).await;
            self.drain().await?;
            round += 1;
        }

        Ok(self.report(started.elapsed()))
    }

    /// Derive a fresh pending task from every failed task `policy` still
    /// allows another attempt for. The loop itself never does this.
    pub fn retry_failed(&mut self, policy: &RetryPolicy) -> Result<Vec<TaskId>, SchedulerError> {
        let candidates: Vec<TaskId> = self
            .ctx
            .registry
            .failed()
            .iter()
            .copied()
            .filter(|id| !self.ctx.registry.is_retried(*id))
            .filter(|id| {
                self.ctx
                    .registry
                    .get(*id)
                    .is_some_and(|record| policy.allows_retry(record.attempt))
            })
            .collect();

        let mut retried = Vec::with_capacity(candidates.len());
        for failed in candidates {
            let new_id = self.ctx.ids.generate_task_id();
            let id = self.ctx.registry.derive_retry(failed, new_id, self.ctx.now())?;
            if let Some(record) = self.ctx.registry.get(id) {
                let name = record.name().clone();
                debug!(task_id = %id, retry_of = %failed, attempt = record.attempt, name = %name, "retry queued");
                self.ctx.emit(EventKind::TaskQueued { task_id: id, name });
            }
            retried.push(id);
        }
        Ok(retried)
    }

    /// Snapshot of `completed` and `failed` as they are now.
    pub fn report(&self, elapsed: Duration) -> RunReport {
        RunReport::collect(self.ctx.run_id(), &self.ctx.registry, self.passes, elapsed)
    }

    async fn drain(&mut self) -> Result<(), SchedulerError> {
        while self.has_work() {
            let pass = self.step().await?;
            if pass.is_stalled() {
                let err = SchedulerError::Stalled {
                    pending: pass.pending,
                    strategy: self.submission.name().to_string(),
                };
                error!(error = %err, "no pass can make progress");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("ctx", &self.ctx)
            .field("submission", &self.submission.name())
            .field("processing", &self.processing.name())
            .field("buffer_time", &self.buffer_time)
            .field("passes", &self.passes)
            .finish()
    }
}
