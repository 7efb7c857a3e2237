//! Strategy families.
//!
//! - **submission**: which pending task is admitted next, at what cost
//! - **processing**: how outstanding futures are reaped, and whether a
//!   resolution triggers immediate backfill

pub mod affinity;
pub mod processing;
pub mod submission;

pub use self::affinity::{CpuAffine, GpuAffine, Hybrid, NodeProvisioned, Predicate};
pub use self::processing::{Adaptive, NonAdaptive, PassSummary, ProcessingStrategy};
pub use self::submission::{SubmissionStrategy, admit};

use crate::config::{ProcessingKind, SchedulerConfig, SubmissionKind};
use crate::error::ConfigError;

/// The submission strategy a config selects.
pub fn submission_from_config(
    config: &SchedulerConfig,
) -> Result<Box<dyn SubmissionStrategy>, ConfigError> {
    let strategy: Box<dyn SubmissionStrategy> = match config.submission {
        SubmissionKind::Cpu => Box::new(CpuAffine {
            reserve_gpu_host_cores: config.reserve_gpu_host_cores,
        }),
        SubmissionKind::Gpu => Box::new(GpuAffine),
        SubmissionKind::Hybrid => Box::new(Hybrid),
        SubmissionKind::NodeProvisioned => {
            let (nnodes, gpus_per_node) = config.node_shape()?;
            Box::new(NodeProvisioned::new(nnodes, gpus_per_node))
        }
    };
    Ok(strategy)
}

/// The processing strategy a config selects.
pub fn processing_from_config(config: &SchedulerConfig) -> Box<dyn ProcessingStrategy> {
    match config.processing {
        ProcessingKind::Adaptive => Box::new(Adaptive),
        ProcessingKind::NonAdaptive => Box::new(NonAdaptive),
    }
}
