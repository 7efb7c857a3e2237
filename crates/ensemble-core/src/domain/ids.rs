//! Strongly-typed identifiers.
//!
//! All identifiers are ULIDs wrapped in `Id<T>`, where `T` is a zero-sized
//! marker. `TaskId` and `RunId` share one implementation but cannot be mixed
//! up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the display prefix of an id kind.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of one task (one unit of work submitted as one job).
pub type TaskId = Id<Task>;

/// Identifier of one scheduler run (one `Scheduler::run` lifetime).
pub type RunId = Id<Run>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let task = TaskId::from_ulid(Ulid::new());
        let run = RunId::from_ulid(Ulid::new());

        assert!(task.to_string().starts_with("task-"));
        assert!(run.to_string().starts_with("run-"));
        // let _: RunId = task; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);

        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{ulid}\""));

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<RunId>(), 16);
    }
}
