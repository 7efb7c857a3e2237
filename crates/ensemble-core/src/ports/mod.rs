//! Ports: traits at the external seams of the engine.
//!
//! - **launcher**: the job submission channel and its futures
//! - **restart**: per-resolution restart hook
//! - **event_sink**: status surface
//! - **clock** / **id_generator**: time and ids, swappable in tests

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod launcher;
pub mod restart;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::launcher::{JobHandle, LaunchFuture, LaunchStatus};
pub use self::restart::{NoopRestartHook, ResolvedTask, RestartHook};
