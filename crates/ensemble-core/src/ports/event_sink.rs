//! EventSink port: where queue sizes and task transitions are published.
//!
//! The engine never formats or persists status itself.

use crate::domain::SchedulerEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SchedulerEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &SchedulerEvent) {}
}
