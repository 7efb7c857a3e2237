//! Task record: spec + identity + lifecycle.

use chrono::{DateTime, Utc};

use crate::domain::{Demand, JobSpec, TaskId, TaskName, TaskSpec, TaskState};

/// Registry entry for one task.
///
/// All state changes go through `transition`, which refuses to move a task
/// backward.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub spec: TaskSpec,
    pub state: TaskState,

    /// Resources the task asks for, fixed when the task is enqueued.
    pub demand: Demand,

    /// 1 for a fresh task, +1 for every caller-requested retry.
    pub attempt: u32,

    /// The failed task this one was derived from.
    pub retry_of: Option<TaskId>,

    pub failure: Option<String>,

    /// Job spec of the last submission, kept for reporting.
    pub job: Option<JobSpec>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, spec: TaskSpec, demand: Demand, now: DateTime<Utc>) -> Self {
        Self {
            id,
            spec,
            state: TaskState::Pending,
            demand,
            attempt: 1,
            retry_of: None,
            failure: None,
            job: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &TaskName {
        &self.spec.name
    }

    /// Move to `next`. Returns the previous state, or `None` (unchanged) if
    /// the transition is not allowed.
    pub(crate) fn transition(&mut self, next: TaskState, now: DateTime<Utc>) -> Option<TaskState> {
        if !self.state.can_transition_to(next) {
            return None;
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = now;
        Some(previous)
    }
}
