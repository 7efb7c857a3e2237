//! Outstanding futures, keyed by task id.
//!
//! Futures resolve out of order, so they are only ever looked up and removed
//! by task id. Removing an id twice is a no-op the second time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{Demand, JobSpec, TaskId};
use crate::error::SchedulerError;
use crate::ports::{LaunchFuture, LaunchStatus};

/// A launcher future bound to its task, the spec it was launched with and
/// the resources reserved for it. All three are set in `new` and never
/// change.
pub struct TaskFuture {
    task_id: TaskId,
    spec: JobSpec,
    reservation: Demand,
    submitted_at: DateTime<Utc>,
    seq: u64,
    inner: Box<dyn LaunchFuture>,
}

impl TaskFuture {
    pub fn new(
        task_id: TaskId,
        spec: JobSpec,
        reservation: Demand,
        submitted_at: DateTime<Utc>,
        inner: Box<dyn LaunchFuture>,
    ) -> Self {
        Self {
            task_id,
            spec,
            reservation,
            submitted_at,
            seq: 0,
            inner,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn reservation(&self) -> Demand {
        self.reservation
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn job_ref(&self) -> String {
        self.inner.job_ref()
    }

    pub fn poll(&mut self) -> LaunchStatus {
        self.inner.poll()
    }
}

impl std::fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("task_id", &self.task_id)
            .field("label", &self.spec.label)
            .field("reservation", &self.reservation)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct FuturesTable {
    entries: HashMap<TaskId, TaskFuture>,
    next_seq: u64,
}

impl FuturesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new future. A task can have at most one outstanding future.
    pub fn insert(&mut self, mut future: TaskFuture) -> Result<(), SchedulerError> {
        let id = future.task_id;
        if self.entries.contains_key(&id) {
            return Err(SchedulerError::invariant(format!(
                "task {id} already has an outstanding future"
            )));
        }
        future.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, future);
        Ok(())
    }

    pub fn remove(&mut self, id: TaskId) -> Option<TaskFuture> {
        self.entries.remove(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskFuture> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in submission order: the order one processing pass scans them.
    pub fn scan_order(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = self.entries.values().map(|f| (f.seq, f.task_id)).collect();
        ids.sort_unstable_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Sum of all reservations held by outstanding futures.
    pub fn reserved(&self) -> Demand {
        self.entries
            .values()
            .fold(Demand::ZERO, |acc, f| acc.saturating_add(f.reservation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobTemplate, JobOutcome, TaskSpec};
    use ulid::Ulid;

    struct Done;

    impl LaunchFuture for Done {
        fn job_ref(&self) -> String {
            "done".to_string()
        }

        fn poll(&mut self) -> LaunchStatus {
            LaunchStatus::Resolved(JobOutcome::success())
        }
    }

    fn future(id: TaskId, cores: u32) -> TaskFuture {
        let spec = JobTemplate::default().per_task_spec(&TaskSpec::new("t"));
        TaskFuture::new(id, spec, Demand::new(cores, 0), Utc::now(), Box::new(Done))
    }

    #[test]
    fn removal_is_by_id_and_idempotent() {
        let mut table = FuturesTable::new();
        let a = TaskId::from_ulid(Ulid::new());
        let b = TaskId::from_ulid(Ulid::new());
        table.insert(future(a, 1)).unwrap();
        table.insert(future(b, 2)).unwrap();

        // b resolves first
        assert_eq!(table.remove(b).map(|f| f.task_id()), Some(b));
        assert!(table.remove(b).is_none());
        assert!(table.contains(a));
        assert_eq!(table.reserved(), Demand::new(1, 0));
    }

    #[test]
    fn scan_order_follows_submission_order() {
        let mut table = FuturesTable::new();
        let ids: Vec<_> = (0..5).map(|_| TaskId::from_ulid(Ulid::new())).collect();
        for id in ids.iter().rev() {
            table.insert(future(*id, 1)).unwrap();
        }
        let expected: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(table.scan_order(), expected);
    }

    #[test]
    fn second_future_for_same_task_is_an_invariant_violation() {
        let mut table = FuturesTable::new();
        let a = TaskId::from_ulid(Ulid::new());
        table.insert(future(a, 1)).unwrap();
        assert!(matches!(
            table.insert(future(a, 1)),
            Err(SchedulerError::InvariantViolation(_))
        ));
    }
}
