//! Concrete submission strategies.

use std::fmt;

use crate::domain::{Demand, JobSpec, JobTemplate, ResourceSnapshot};
use crate::queue::TaskRecord;

use super::submission::SubmissionStrategy;

/// CPU-only tasks, costed in cores.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuAffine {
    /// Keep one host core per free GPU out of CPU admission.
    pub reserve_gpu_host_cores: bool,
}

impl CpuAffine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserving_gpu_host_cores() -> Self {
        Self {
            reserve_gpu_host_cores: true,
        }
    }
}

impl SubmissionStrategy for CpuAffine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn is_eligible(&self, task: &TaskRecord) -> bool {
        task.demand.gpus == 0
    }

    fn fits(&self, cost: Demand, snapshot: &ResourceSnapshot) -> bool {
        if self.reserve_gpu_host_cores {
            cost.cores <= snapshot.excess_cores() && cost.gpus <= snapshot.available.gpus
        } else {
            cost.fits_within(snapshot.available)
        }
    }
}

/// Tasks that ask for GPUs, costed in cores and GPUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuAffine;

impl SubmissionStrategy for GpuAffine {
    fn name(&self) -> &str {
        "gpu"
    }

    fn is_eligible(&self, task: &TaskRecord) -> bool {
        task.demand.gpus > 0
    }
}

/// Every task, in plain FIFO order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hybrid;

impl SubmissionStrategy for Hybrid {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn is_eligible(&self, _task: &TaskRecord) -> bool {
        true
    }
}

/// Caller-defined eligibility.
pub struct Predicate<F> {
    name: String,
    eligible: F,
}

impl<F> Predicate<F>
where
    F: Fn(&TaskRecord) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, eligible: F) -> Self {
        Self {
            name: name.into(),
            eligible,
        }
    }
}

impl<F> fmt::Debug for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

impl<F> SubmissionStrategy for Predicate<F>
where
    F: Fn(&TaskRecord) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_eligible(&self, task: &TaskRecord) -> bool {
        (self.eligible)(task)
    }
}

/// Whole-node provisioning: every job gets `nnodes` nodes with
/// `gpus_per_node` GPUs each and runs `tasks_per_job` ranks over them.
#[derive(Debug, Clone, Copy)]
pub struct NodeProvisioned {
    nnodes: u32,
    gpus_per_node: u32,
}

impl NodeProvisioned {
    pub fn new(nnodes: u32, gpus_per_node: u32) -> Self {
        Self {
            nnodes,
            gpus_per_node,
        }
    }

    pub fn gpus_per_job(&self) -> u32 {
        self.nnodes.saturating_mul(self.gpus_per_node)
    }
}

impl SubmissionStrategy for NodeProvisioned {
    fn name(&self) -> &str {
        "node_provisioned"
    }

    fn is_eligible(&self, _task: &TaskRecord) -> bool {
        true
    }

    fn cost(&self, task: &TaskRecord) -> Demand {
        Demand::new(task.demand.cores, self.gpus_per_job())
    }

    fn job_spec(&self, task: &TaskRecord, template: &JobTemplate) -> JobSpec {
        template.per_node_spec(&task.spec, self.nnodes, self.gpus_per_node)
    }
}
