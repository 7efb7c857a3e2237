//! Submission strategies: which pending task goes next and what it costs.
//!
//! Every variant shares one admission loop (`admit`); they only differ in
//! eligibility, cost and the job spec they build.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::app::SchedulerContext;
use crate::domain::{Demand, JobSpec, JobTemplate, ResourceSnapshot};
use crate::error::{LaunchError, ResourceError, SchedulerError};
use crate::ports::{JobHandle, LaunchFuture};
use crate::queue::{TaskFuture, TaskRecord};

#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this strategy handles `task` at all.
    fn is_eligible(&self, task: &TaskRecord) -> bool;

    /// Resources reserved while `task` is in flight.
    fn cost(&self, task: &TaskRecord) -> Demand {
        task.demand
    }

    /// Whether `cost` may be admitted given the current tracker view.
    fn fits(&self, cost: Demand, snapshot: &ResourceSnapshot) -> bool {
        cost.fits_within(snapshot.available)
    }

    fn job_spec(&self, task: &TaskRecord, template: &JobTemplate) -> JobSpec {
        template.per_task_spec(&task.spec)
    }

    /// Build one job request and hand it to the shared job handle.
    async fn submit(
        &self,
        handle: &dyn JobHandle,
        template: &JobTemplate,
        task: &TaskRecord,
    ) -> Result<(JobSpec, Box<dyn LaunchFuture>), LaunchError> {
        let spec = self.job_spec(task, template);
        let future = handle.submit(&spec).await?;
        Ok((spec, future))
    }

    /// Admit pending tasks until the next eligible one no longer fits.
    /// Returns the number of submission attempts made.
    async fn submit_until_exhausted(
        &self,
        ctx: &mut SchedulerContext,
        buffer_time: Duration,
    ) -> Result<usize, SchedulerError> {
        admit(self, ctx, buffer_time).await
    }
}

/// The admission loop shared by every submission strategy.
///
/// Tasks are taken FIFO among the eligible ones. When the head does not
/// fit the pass ends; later, smaller tasks do not jump ahead of it.
/// Resources are reserved before `submit` is called and given back if the
/// launcher rejects the job.
pub async fn admit<S>(
    strategy: &S,
    ctx: &mut SchedulerContext,
    buffer_time: Duration,
) -> Result<usize, SchedulerError>
where
    S: SubmissionStrategy + ?Sized,
{
    let mut attempts = 0;

    loop {
        let Some(id) = ctx.registry.first_pending(|task| strategy.is_eligible(task)) else {
            break;
        };
        let task = ctx
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::invariant(format!("pending task {id} has no record")))?;

        let cost = strategy.cost(&task);
        let snapshot = ctx.tracker.snapshot();
        if !strategy.fits(cost, &snapshot) {
            debug!(
                strategy = strategy.name(),
                task_id = %id,
                ?cost,
                available = ?snapshot.available,
                "next task does not fit, admission pass ends"
            );
            break;
        }
        match ctx.tracker.reserve(cost) {
            Ok(_) => {}
            Err(ResourceError::Insufficient { .. }) => break,
            Err(err) => return Err(err.into()),
        }

        let handle = ctx.handle.clone();
        match strategy.submit(handle.as_ref(), &ctx.template, &task).await {
            Ok((spec, inner)) => {
                let future = TaskFuture::new(id, spec, cost, ctx.now(), inner);
                ctx.track(future)?;
            }
            Err(err) => {
                let job = strategy.job_spec(&task, &ctx.template);
                ctx.reject(id, cost, job, err.to_string())?;
            }
        }
        attempts += 1;

        tokio::time::sleep(buffer_time).await;
    }

    Ok(attempts)
}
