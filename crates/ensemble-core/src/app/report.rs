//! Final state of a run.

use std::time::Duration;

use serde::Serialize;

use crate::domain::{JobSpec, RunId, TaskId, TaskName};
use crate::queue::{TaskRecord, TaskRegistry};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub name: TaskName,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask {
    pub task_id: TaskId,
    pub name: TaskName,
    pub attempt: u32,
    pub reason: String,
    pub job: Option<JobSpec>,
}

/// Contents of `completed` and `failed` once the loop ran out of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// In resolution order.
    pub completed: Vec<CompletedTask>,
    /// Failures not superseded by a caller-requested retry.
    pub failed: Vec<FailedTask>,
    /// Failures that were retried.
    pub retried: usize,
    pub passes: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn collect(
        run_id: RunId,
        registry: &TaskRegistry,
        passes: u64,
        elapsed: Duration,
    ) -> Self {
        let completed = registry
            .completed()
            .iter()
            .filter_map(|id| registry.get(*id))
            .map(|record| CompletedTask {
                task_id: record.id,
                name: record.name().clone(),
                attempt: record.attempt,
            })
            .collect();

        let (retried, failed): (Vec<&TaskRecord>, Vec<&TaskRecord>) = registry
            .failed()
            .iter()
            .filter_map(|id| registry.get(*id))
            .partition(|record| registry.is_retried(record.id));

        let failed = failed
            .into_iter()
            .map(|record| FailedTask {
                task_id: record.id,
                name: record.name().clone(),
                attempt: record.attempt,
                reason: record.failure.clone().unwrap_or_default(),
                job: record.job.clone(),
            })
            .collect();

        Self {
            run_id,
            completed,
            failed,
            retried: retried.len(),
            passes,
            elapsed,
        }
    }

    /// Every task completed, possibly after retries.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn completed_names(&self) -> impl Iterator<Item = &TaskName> + '_ {
        self.completed.iter().map(|t| &t.name)
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &TaskName> + '_ {
        self.failed.iter().map(|t| &t.name)
    }
}
