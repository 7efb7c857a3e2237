//! EventSink implementations.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::{EventKind, SchedulerEvent, TaskId};
use crate::ports::EventSink;

/// Publishes events as `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &SchedulerEvent) {
        let c = &event.counts;
        match &event.kind {
            EventKind::Progress { pass } => info!(
                target: "ensemble::status",
                pass,
                pending = c.pending,
                running = c.running,
                completed = c.completed,
                failed = c.failed,
                free_cores = c.free_cores,
                free_gpus = c.free_gpus,
                "progress"
            ),
            EventKind::TaskFailed { task_id, name, outcome } => warn!(
                target: "ensemble::status",
                task_id = %task_id,
                name = %name,
                ?outcome,
                "task failed"
            ),
            EventKind::SubmissionRejected { task_id, name, reason } => warn!(
                target: "ensemble::status",
                task_id = %task_id,
                name = %name,
                %reason,
                "submission rejected"
            ),
            other => debug!(target: "ensemble::status", event = ?other, "task event"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.lock().clone()
    }

    /// Events about one task, in emission order.
    pub fn for_task(&self, id: TaskId) -> Vec<EventKind> {
        self.lock()
            .iter()
            .filter(|e| e.task_id() == Some(id))
            .map(|e| e.kind.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SchedulerEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &SchedulerEvent) {
        self.lock().push(event.clone());
    }
}
