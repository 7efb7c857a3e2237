//! Launcher port: the single job submission channel.
//!
//! One `JobHandle` lives for the whole process and is shared by every
//! submission. Each submission yields a `LaunchFuture` the engine polls
//! without blocking. Whatever background work the launcher does to drive
//! those futures is its own business, hence `Send + Sync`.

use async_trait::async_trait;

use crate::domain::{JobOutcome, JobSpec};
use crate::error::LaunchError;

/// Non-blocking view of a launched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    /// Accepted, not started yet.
    Pending,
    /// Started, no result yet.
    Running,
    /// Finished.
    Resolved(JobOutcome),
}

impl LaunchStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, LaunchStatus::Resolved(_))
    }
}

/// Handle to one launched job.
pub trait LaunchFuture: Send {
    /// Launcher-side job id, for logs.
    fn job_ref(&self) -> String;

    /// Check progress without blocking. Once `Resolved` is returned, later
    /// calls keep returning the same outcome.
    fn poll(&mut self) -> LaunchStatus;
}

/// The submission channel.
#[async_trait]
pub trait JobHandle: Send + Sync {
    /// Submit one job. Fails when the launcher declines it.
    async fn submit(&self, spec: &JobSpec) -> Result<Box<dyn LaunchFuture>, LaunchError>;
}
