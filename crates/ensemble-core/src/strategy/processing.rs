//! Processing strategies: how outstanding futures are reaped.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::app::{Resolution, SchedulerContext};
use crate::error::SchedulerError;
use crate::ports::LaunchStatus;

use super::submission::SubmissionStrategy;

/// What one processing pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Futures found resolved and folded back.
    pub completed: usize,
    pub failed: usize,
    /// Submission attempts made from inside the pass (adaptive backfill).
    pub backfilled: usize,
}

impl PassSummary {
    pub fn reaped(&self) -> usize {
        self.completed + self.failed
    }
}

#[async_trait]
pub trait ProcessingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// One scan over the outstanding futures, then a `buffer_time` sleep.
    async fn process_futures(
        &self,
        ctx: &mut SchedulerContext,
        submission: &dyn SubmissionStrategy,
        buffer_time: Duration,
    ) -> Result<PassSummary, SchedulerError>;
}

/// Reap, and refill freed resources right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct Adaptive;

#[async_trait]
impl ProcessingStrategy for Adaptive {
    fn name(&self) -> &str {
        "adaptive"
    }

    async fn process_futures(
        &self,
        ctx: &mut SchedulerContext,
        submission: &dyn SubmissionStrategy,
        buffer_time: Duration,
    ) -> Result<PassSummary, SchedulerError> {
        scan(ctx, Some(submission), buffer_time).await
    }
}

/// Reap only. Freed resources wait for the next super-loop pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonAdaptive;

#[async_trait]
impl ProcessingStrategy for NonAdaptive {
    fn name(&self) -> &str {
        "non_adaptive"
    }

    async fn process_futures(
        &self,
        ctx: &mut SchedulerContext,
        _submission: &dyn SubmissionStrategy,
        buffer_time: Duration,
    ) -> Result<PassSummary, SchedulerError> {
        scan(ctx, None, buffer_time).await
    }
}

/// Scan every future outstanding at the start of the pass, in submission
/// order. With `backfill`, each resolution is followed by an admission
/// pass before the scan continues. Futures submitted during the scan are
/// left for the next pass.
pub async fn scan(
    ctx: &mut SchedulerContext,
    backfill: Option<&dyn SubmissionStrategy>,
    buffer_time: Duration,
) -> Result<PassSummary, SchedulerError> {
    let mut summary = PassSummary::default();

    for id in ctx.futures.scan_order() {
        let Some(status) = ctx.poll(id) else {
            continue;
        };
        let outcome = match status {
            LaunchStatus::Pending => continue,
            LaunchStatus::Running => {
                ctx.note_running(id)?;
                continue;
            }
            LaunchStatus::Resolved(outcome) => outcome,
        };

        match ctx.resolve(id, outcome)? {
            Resolution::Completed => summary.completed += 1,
            Resolution::Failed => summary.failed += 1,
            Resolution::Stale => continue,
        }

        if let Some(submission) = backfill {
            summary.backfilled += submission.submit_until_exhausted(ctx, buffer_time).await?;
        }
    }

    debug!(
        completed = summary.completed,
        failed = summary.failed,
        backfilled = summary.backfilled,
        outstanding = ctx.futures.len(),
        "processing pass done"
    );
    tokio::time::sleep(buffer_time).await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::SchedulerBuilder;
    use crate::config::{ProcessingKind, SchedulerConfig};
    use crate::domain::TaskSpec;
    use crate::impls::SimulatedLauncher;

    /// One core, two 1 s tasks, 2 s buffer: the first task is done by the
    /// time the first processing pass scans it.
    async fn first_pass(kind: ProcessingKind) -> crate::app::PassReport {
        let config = SchedulerConfig::new(1, 0)
            .with_buffer_time(Duration::from_secs(2))
            .with_processing(kind);
        let mut scheduler = SchedulerBuilder::new(config)
            .job_handle(Arc::new(SimulatedLauncher::new()))
            .tasks([TaskSpec::new("a"), TaskSpec::new("b")])
            .build()
            .unwrap();
        scheduler.step().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn adaptive_backfills_inside_the_pass() {
        let pass = first_pass(ProcessingKind::Adaptive).await;
        assert_eq!(pass.submitted, 1);
        assert_eq!(pass.processing.completed, 1);
        assert_eq!(pass.processing.backfilled, 1);
        assert_eq!(pass.pending, 0);
        assert_eq!(pass.running, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_adaptive_leaves_freed_resources_for_the_next_pass() {
        let pass = first_pass(ProcessingKind::NonAdaptive).await;
        assert_eq!(pass.submitted, 1);
        assert_eq!(pass.processing.completed, 1);
        assert_eq!(pass.processing.backfilled, 0);
        assert_eq!(pass.pending, 1);
        assert_eq!(pass.running, 0);
    }

    #[test]
    fn reaped_counts_both_outcomes() {
        let summary = PassSummary {
            completed: 2,
            failed: 1,
            backfilled: 0,
        };
        assert_eq!(summary.reaped(), 3);
    }
}
