//! Domain model: ids, task specs, job specs, resources, outcomes, events.

pub mod events;
pub mod ids;
pub mod job_spec;
pub mod outcome;
pub mod resources;
pub mod state;
pub mod task;

pub use events::{EventKind, QueueCounts, SchedulerEvent};
pub use ids::{RunId, TaskId};
pub use job_spec::{JobShape, JobSpec, JobTemplate, ShellOptions};
pub use outcome::JobOutcome;
pub use resources::{Demand, ResourceRequest, ResourceSnapshot};
pub use state::TaskState;
pub use task::{TaskName, TaskSpec};
