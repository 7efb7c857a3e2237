use thiserror::Error;

use crate::domain::{Demand, TaskId, TaskName};

/// Resource tracker failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Expected during admission: ends the current pass, never surfaced.
    #[error("insufficient resources: requested {requested:?}, available {available:?}")]
    Insufficient { requested: Demand, available: Demand },

    /// A release pushed availability past the total (double release).
    #[error("release of {released:?} exceeds capacity; availability clamped to {total:?}")]
    OverRelease { released: Demand, total: Demand },
}

/// The external launcher declined a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("job rejected: {0}")]
    Rejected(String),

    #[error("launcher unavailable: {0}")]
    Unavailable(String),
}

/// Restart hook failures. Logged, never fatal.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("restart journal io: {0}")]
    Io(#[from] std::io::Error),

    #[error("restart journal encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("restart journal line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("total_cores must be greater than zero")]
    NoCores,

    #[error("buffer_time_secs must be a non-negative, representable number of seconds, got {0}")]
    InvalidBufferTime(f64),

    #[error("node_provisioned submission needs nnodes and gpus_per_node (got nnodes={nnodes:?}, gpus_per_node={gpus_per_node:?})")]
    MissingNodeShape {
        nnodes: Option<u32>,
        gpus_per_node: Option<u32>,
    },

    #[error("a node-provisioned job needs {nnodes} x {gpus_per_node} GPUs but the allocation only has {total_gpus}")]
    NodeShapeTooLarge {
        nnodes: u32,
        gpus_per_node: u32,
        total_gpus: u32,
    },

    #[error("job template has an empty command")]
    EmptyCommand,
}

/// Engine errors.
///
/// Per-task failures never show up here: they end in the `failed` queue.
/// Everything here aborts the loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Bookkeeping corruption that cannot be repaired locally.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Pending tasks exist but nothing runs and no strategy can admit them.
    #[error("scheduler stalled: {pending} pending task(s) cannot be admitted by strategy '{strategy}'")]
    Stalled { pending: usize, strategy: String },

    /// The task can never fit into the configured totals.
    #[error("task '{name}' demands {demand:?} but the allocation only has {total:?}")]
    Unsatisfiable {
        name: TaskName,
        demand: Demand,
        total: Demand,
    },

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    /// Names identify tasks across runs, so a second live task may not reuse one.
    #[error("a task named '{0}' already exists")]
    DuplicateTaskName(TaskName),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerError {
    pub fn invariant(message: impl Into<String>) -> Self {
        SchedulerError::InvariantViolation(message.into())
    }
}

impl From<ResourceError> for SchedulerError {
    fn from(err: ResourceError) -> Self {
        SchedulerError::InvariantViolation(err.to_string())
    }
}
