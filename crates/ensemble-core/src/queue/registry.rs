//! Task registry: every task's record plus the four queues.
//!
//! Invariant: each task id is in exactly one of `pending`, `running`,
//! `completed`, `failed`, and that queue matches the record's state
//! (Submitted and Running tasks both live in `running`).

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::record::TaskRecord;
use crate::domain::{JobSpec, QueueCounts, TaskId, TaskName, TaskState};
use crate::error::SchedulerError;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: HashMap<TaskId, TaskRecord>,

    /// FIFO admission order.
    pending: VecDeque<TaskId>,
    running: HashSet<TaskId>,
    /// Resolution order.
    completed: Vec<TaskId>,
    failed: Vec<TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new pending task.
    pub fn insert(&mut self, record: TaskRecord) -> Result<TaskId, SchedulerError> {
        let id = record.id;
        if record.state != TaskState::Pending {
            return Err(SchedulerError::invariant(format!(
                "task {id} enqueued in state {:?}",
                record.state
            )));
        }
        if self.records.contains_key(&id) {
            return Err(SchedulerError::invariant(format!("task {id} enqueued twice")));
        }
        self.records.insert(id, record);
        self.pending.push_back(id);
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&id)
    }

    /// Most recent task with this name (retries share the name).
    pub fn find_by_name(&self, name: &str) -> Option<&TaskRecord> {
        self.records
            .values()
            .filter(|r| r.name().as_str() == name)
            .max_by_key(|r| (r.attempt, r.created_at))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &TaskRecord> + '_ {
        self.pending.iter().filter_map(|id| self.records.get(id))
    }

    pub fn completed(&self) -> &[TaskId] {
        &self.completed
    }

    pub fn failed(&self) -> &[TaskId] {
        &self.failed
    }

    pub fn running(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.running.iter().copied()
    }

    /// First pending task (FIFO) accepted by `eligible`.
    pub fn first_pending(&self, eligible: impl Fn(&TaskRecord) -> bool) -> Option<TaskId> {
        self.pending()
            .find(|record| eligible(record))
            .map(|record| record.id)
    }

    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            pending: self.pending.len(),
            running: self.running.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            ..QueueCounts::default()
        }
    }

    /// Pending -> Submitted; the task moves to `running`.
    pub fn mark_submitted(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(id, TaskState::Submitted, now)?;
        let Some(position) = self.pending.iter().position(|p| *p == id) else {
            return Err(SchedulerError::invariant(format!(
                "submitted task {id} was not in the pending queue"
            )));
        };
        self.pending.remove(position);
        self.running.insert(id);
        Ok(())
    }

    /// Remember the job spec a task was submitted with.
    pub fn attach_job(&mut self, id: TaskId, job: JobSpec) -> Result<(), SchedulerError> {
        self.record_mut(id)?.job = Some(job);
        Ok(())
    }

    /// Whether a retry was already derived from `id`.
    pub fn is_retried(&self, id: TaskId) -> bool {
        self.records.values().any(|r| r.retry_of == Some(id))
    }

    /// Submitted -> Running. Returns false if the task already ran.
    pub fn mark_running(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let state = self.record_mut(id)?.state;
        match state {
            TaskState::Running => Ok(false),
            _ => {
                self.transition(id, TaskState::Running, now)?;
                Ok(true)
            }
        }
    }

    /// In flight -> Completed.
    pub fn complete(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.leave_running(id, TaskState::Completed, now)?;
        self.completed.push(id);
        Ok(())
    }

    /// In flight -> Failed.
    pub fn fail(
        &mut self,
        id: TaskId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.leave_running(id, TaskState::Failed, now)?;
        self.record_mut(id)?.failure = Some(reason.into());
        self.failed.push(id);
        Ok(())
    }

    /// Create a fresh pending task from a failed one.
    pub fn derive_retry(
        &mut self,
        failed: TaskId,
        new_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<TaskId, SchedulerError> {
        let source = self
            .records
            .get(&failed)
            .ok_or(SchedulerError::UnknownTask(failed))?;
        if source.state != TaskState::Failed {
            return Err(SchedulerError::invariant(format!(
                "only failed tasks can be retried, {failed} is {:?}",
                source.state
            )));
        }

        let mut record = TaskRecord::new(new_id, source.spec.clone(), source.demand, now);
        record.attempt = source.attempt + 1;
        record.retry_of = Some(failed);
        self.insert(record)
    }

    /// Verify the queue-partition invariant.
    pub fn check_partition(&self) -> Result<(), SchedulerError> {
        let queued = self.pending.len() + self.running.len() + self.completed.len() + self.failed.len();
        if queued != self.records.len() {
            return Err(SchedulerError::invariant(format!(
                "queues hold {queued} ids but the registry has {} tasks",
                self.records.len()
            )));
        }

        let mut seen = HashSet::with_capacity(queued);
        let members = self
            .pending
            .iter()
            .map(|id| (*id, "pending"))
            .chain(self.running.iter().map(|id| (*id, "running")))
            .chain(self.completed.iter().map(|id| (*id, "completed")))
            .chain(self.failed.iter().map(|id| (*id, "failed")));

        for (id, queue) in members {
            if !seen.insert(id) {
                return Err(SchedulerError::invariant(format!("task {id} is in more than one queue")));
            }
            let record = self
                .records
                .get(&id)
                .ok_or_else(|| SchedulerError::invariant(format!("queue {queue} holds unknown task {id}")))?;
            let matches = match queue {
                "pending" => record.state == TaskState::Pending,
                "running" => record.state.is_in_flight(),
                "completed" => record.state == TaskState::Completed,
                _ => record.state == TaskState::Failed,
            };
            if !matches {
                return Err(SchedulerError::invariant(format!(
                    "task {id} is in {queue} but its state is {:?}",
                    record.state
                )));
            }
        }
        Ok(())
    }

    pub fn names_of<'a>(&'a self, ids: &'a [TaskId]) -> impl Iterator<Item = &'a TaskName> + 'a {
        ids.iter().filter_map(|id| self.records.get(id)).map(TaskRecord::name)
    }

    fn leave_running(
        &mut self,
        id: TaskId,
        next: TaskState,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if !self.running.remove(&id) {
            return Err(SchedulerError::invariant(format!(
                "task {id} resolved but is not running"
            )));
        }
        if let Err(err) = self.transition(id, next, now) {
            self.running.insert(id);
            return Err(err);
        }
        Ok(())
    }

    fn transition(&mut self, id: TaskId, next: TaskState, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let record = self.record_mut(id)?;
        let from = record.state;
        record.transition(next, now).map(|_| ()).ok_or_else(|| {
            SchedulerError::invariant(format!("illegal transition {from:?} -> {next:?} for task {id}"))
        })
    }

    fn record_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, SchedulerError> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::invariant(format!("no registry entry for task {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Demand, TaskSpec};
    use ulid::Ulid;

    fn record(name: &str) -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            TaskSpec::new(name),
            Demand::new(1, 0),
            Utc::now(),
        )
    }

    #[test]
    fn lifecycle_moves_between_queues() {
        let mut reg = TaskRegistry::new();
        let a = reg.insert(record("a")).unwrap();
        let b = reg.insert(record("b")).unwrap();
        let now = Utc::now();

        assert_eq!(reg.counts().pending, 2);

        reg.mark_submitted(a, now).unwrap();
        assert!(reg.mark_running(a, now).unwrap());
        assert!(!reg.mark_running(a, now).unwrap());
        reg.mark_submitted(b, now).unwrap();
        assert_eq!(reg.counts().running, 2);

        reg.complete(a, now).unwrap();
        reg.fail(b, "exited with code 1", now).unwrap();

        let counts = reg.counts();
        assert_eq!((counts.pending, counts.running, counts.completed, counts.failed), (0, 0, 1, 1));
        assert_eq!(reg.get(b).unwrap().failure.as_deref(), Some("exited with code 1"));
        reg.check_partition().unwrap();
    }

    #[test]
    fn first_pending_is_fifo_over_eligible_tasks() {
        let mut reg = TaskRegistry::new();
        let _a = reg.insert(record("a")).unwrap();
        let b = reg.insert(record("b")).unwrap();

        let picked = reg.first_pending(|r| r.name().as_str() == "b");
        assert_eq!(picked, Some(b));
        assert_eq!(reg.first_pending(|_| false), None);
    }

    #[test]
    fn tasks_never_move_backward() {
        let mut reg = TaskRegistry::new();
        let a = reg.insert(record("a")).unwrap();
        let now = Utc::now();

        assert!(matches!(reg.complete(a, now), Err(SchedulerError::InvariantViolation(_))));

        reg.mark_submitted(a, now).unwrap();
        reg.complete(a, now).unwrap();
        assert!(matches!(reg.fail(a, "late", now), Err(SchedulerError::InvariantViolation(_))));
        assert!(matches!(reg.mark_submitted(a, now), Err(SchedulerError::InvariantViolation(_))));
        reg.check_partition().unwrap();
    }

    #[test]
    fn derive_retry_creates_new_pending_task() {
        let mut reg = TaskRegistry::new();
        let a = reg.insert(record("a")).unwrap();
        let now = Utc::now();
        reg.mark_submitted(a, now).unwrap();
        reg.fail(a, "boom", now).unwrap();

        assert!(!reg.is_retried(a));
        let retry = reg.derive_retry(a, TaskId::from_ulid(Ulid::new()), now).unwrap();
        assert!(reg.is_retried(a));
        let r = reg.get(retry).unwrap();
        assert_eq!(r.attempt, 2);
        assert_eq!(r.retry_of, Some(a));
        assert_eq!(r.state, TaskState::Pending);
        // the failed task stays failed
        assert_eq!(reg.failed(), &[a]);
        assert_eq!(reg.find_by_name("a").unwrap().id, retry);
        reg.check_partition().unwrap();
    }

    #[test]
    fn retry_of_non_failed_task_is_rejected() {
        let mut reg = TaskRegistry::new();
        let a = reg.insert(record("a")).unwrap();
        let err = reg.derive_retry(a, TaskId::from_ulid(Ulid::new()), Utc::now());
        assert!(err.is_err());
    }
}
