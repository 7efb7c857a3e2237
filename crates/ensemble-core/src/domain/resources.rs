//! Resource request / demand value types.

use serde::{Deserialize, Serialize};

/// What a task asks for: `tasks_per_job` ranks, each with
/// `cores_per_task` cores and `gpus_per_task` GPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    pub tasks_per_job: u32,
    pub cores_per_task: u32,
    pub gpus_per_task: u32,
}

impl ResourceRequest {
    pub fn new(tasks_per_job: u32, cores_per_task: u32, gpus_per_task: u32) -> Self {
        Self {
            tasks_per_job,
            cores_per_task,
            gpus_per_task,
        }
    }

    /// One rank, one core, no GPU.
    pub fn single_core() -> Self {
        Self::new(1, 1, 0)
    }

    pub fn wants_gpus(&self) -> bool {
        self.gpus_per_task > 0
    }

    /// Total demand of the whole job.
    pub fn demand(&self) -> Demand {
        Demand {
            cores: self.tasks_per_job.saturating_mul(self.cores_per_task),
            gpus: self.tasks_per_job.saturating_mul(self.gpus_per_task),
        }
    }
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self::single_core()
    }
}

/// Absolute amount of cores and GPUs (a reservation, a cost, a capacity).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Demand {
    pub cores: u32,
    pub gpus: u32,
}

impl Demand {
    pub const ZERO: Demand = Demand { cores: 0, gpus: 0 };

    pub fn new(cores: u32, gpus: u32) -> Self {
        Self { cores, gpus }
    }

    /// `self` fits inside `capacity` on both axes.
    pub fn fits_within(&self, capacity: Demand) -> bool {
        self.cores <= capacity.cores && self.gpus <= capacity.gpus
    }

    pub fn saturating_add(self, other: Demand) -> Demand {
        Demand {
            cores: self.cores.saturating_add(other.cores),
            gpus: self.gpus.saturating_add(other.gpus),
        }
    }
}

/// Point-in-time view of the resource tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub total: Demand,
    pub available: Demand,
}

impl ResourceSnapshot {
    pub fn reserved(&self) -> Demand {
        Demand {
            cores: self.total.cores.saturating_sub(self.available.cores),
            gpus: self.total.gpus.saturating_sub(self.available.gpus),
        }
    }

    /// Cores left over once one host core per free GPU is set aside.
    pub fn excess_cores(&self) -> u32 {
        self.available.cores.saturating_sub(self.available.gpus)
    }
}
