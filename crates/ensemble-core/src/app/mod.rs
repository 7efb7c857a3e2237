//! Engine layer: the shared context, the super-loop and its builder.
//!
//! - **SchedulerBuilder**: wiring plus fail-fast validation
//! - **SchedulerContext**: registry, resource tracker and futures table
//! - **Scheduler**: the super-loop (`step`, `run`, `inject`, `retry_failed`)
//! - **RunReport**: final `completed` / `failed` contents

pub mod builder;
pub mod context;
pub mod report;
pub mod super_loop;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::context::{Resolution, SchedulerContext};
pub use self::report::{CompletedTask, FailedTask, RunReport};
pub use self::super_loop::{PassReport, Scheduler};
