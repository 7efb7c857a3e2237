//! Scheduler events: the status surface consumed by `EventSink`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::outcome::JobOutcome;
use super::resources::Demand;
use super::task::TaskName;

/// Queue sizes plus free resources at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub free_cores: u32,
    pub free_gpus: u32,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }

    pub fn with_free(mut self, free: Demand) -> Self {
        self.free_cores = free.cores;
        self.free_gpus = free.gpus;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    TaskQueued { task_id: TaskId, name: TaskName },
    TaskSubmitted { task_id: TaskId, name: TaskName, reserved: Demand },
    TaskRunning { task_id: TaskId, name: TaskName },
    TaskCompleted { task_id: TaskId, name: TaskName },
    TaskFailed { task_id: TaskId, name: TaskName, outcome: JobOutcome },
    SubmissionRejected { task_id: TaskId, name: TaskName, reason: String },
    /// Emitted once per super-loop pass.
    Progress { pass: u64 },
}

/// One observable state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub at: DateTime<Utc>,
    pub counts: QueueCounts,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SchedulerEvent {
    pub fn task_id(&self) -> Option<TaskId> {
        match &self.kind {
            EventKind::TaskQueued { task_id, .. }
            | EventKind::TaskSubmitted { task_id, .. }
            | EventKind::TaskRunning { task_id, .. }
            | EventKind::TaskCompleted { task_id, .. }
            | EventKind::TaskFailed { task_id, .. }
            | EventKind::SubmissionRejected { task_id, .. } => Some(*task_id),
            EventKind::Progress { .. } => None,
        }
    }
}
