//! IdGenerator port.
//!
//! ULID timestamps come from the injected `Clock`, so a `FixedClock` gives
//! ids with a known time part.

use ulid::Ulid;

use crate::domain::{RunId, TaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_run_id(&self) -> RunId;
}

/// ULID generator driven by a `Clock`.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next_ulid())
    }
}
