//! Scheduler configuration.
//!
//! Everything is supplied by the caller at construction. Only recognized
//! keys are accepted and nothing is read from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Demand, JobTemplate};
use crate::error::ConfigError;

/// Which submission strategy drives admission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// CPU-only tasks, costed in cores.
    #[default]
    Cpu,
    /// GPU tasks, costed in cores and GPUs.
    Gpu,
    /// Every task, costed in cores and GPUs.
    Hybrid,
    /// Whole-node provisioning (`nnodes` x `gpus_per_node`).
    NodeProvisioned,
}

/// Which processing strategy reaps futures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingKind {
    /// Backfill freed resources immediately.
    #[default]
    Adaptive,
    /// Reap only; admission waits for the next pass.
    NonAdaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Throttle interval between submissions and between polling passes.
    pub buffer_time_secs: f64,

    pub total_cores: u32,
    pub total_gpus: u32,

    pub submission: SubmissionKind,
    pub processing: ProcessingKind,

    /// CPU strategy only uses cores in excess of one per free GPU.
    pub reserve_gpu_host_cores: bool,

    /// Node shape for `SubmissionKind::NodeProvisioned`.
    pub nnodes: Option<u32>,
    pub gpus_per_node: Option<u32>,

    /// Restart journal flush interval, in resolved tasks.
    pub write_restart_freq: usize,

    pub job: JobTemplate,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_time_secs: 0.5,
            total_cores: 1,
            total_gpus: 0,
            submission: SubmissionKind::default(),
            processing: ProcessingKind::default(),
            reserve_gpu_host_cores: false,
            nnodes: None,
            gpus_per_node: None,
            write_restart_freq: 100,
            job: JobTemplate::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(total_cores: u32, total_gpus: u32) -> Self {
        Self {
            total_cores,
            total_gpus,
            ..Self::default()
        }
    }

    pub fn with_buffer_time(mut self, buffer: Duration) -> Self {
        self.buffer_time_secs = buffer.as_secs_f64();
        self
    }

    pub fn with_submission(mut self, kind: SubmissionKind) -> Self {
        self.submission = kind;
        self
    }

    pub fn with_processing(mut self, kind: ProcessingKind) -> Self {
        self.processing = kind;
        self
    }

    pub fn with_job(mut self, job: JobTemplate) -> Self {
        self.job = job;
        self
    }

    /// Saturates instead of panicking on values `validate` rejects.
    pub fn buffer_time(&self) -> Duration {
        let secs = self.buffer_time_secs;
        Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    pub fn totals(&self) -> Demand {
        Demand::new(self.total_cores, self.total_gpus)
    }

    /// `(nnodes, gpus_per_node)` for node provisioning.
    pub fn node_shape(&self) -> Result<(u32, u32), ConfigError> {
        match (self.nnodes, self.gpus_per_node) {
            (Some(nnodes), Some(gpus_per_node)) if nnodes > 0 => Ok((nnodes, gpus_per_node)),
            (nnodes, gpus_per_node) => Err(ConfigError::MissingNodeShape {
                nnodes,
                gpus_per_node,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_cores == 0 {
            return Err(ConfigError::NoCores);
        }
        if Duration::try_from_secs_f64(self.buffer_time_secs).is_err() {
            return Err(ConfigError::InvalidBufferTime(self.buffer_time_secs));
        }
        if self.submission == SubmissionKind::NodeProvisioned {
            let (nnodes, gpus_per_node) = self.node_shape()?;
            let gpus = u64::from(nnodes) * u64::from(gpus_per_node);
            if gpus > u64::from(self.total_gpus) {
                return Err(ConfigError::NodeShapeTooLarge {
                    nnodes,
                    gpus_per_node,
                    total_gpus: self.total_gpus,
                });
            }
        }
        Ok(())
    }

    /// Launching real processes needs a program to run.
    pub fn require_command(&self) -> Result<(), ConfigError> {
        if self.job.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn default_config_is_single_core_cpu_adaptive() {
        let config = SchedulerConfig::default();
        assert_eq!(config.buffer_time(), Duration::from_millis(500));
        assert_eq!(config.submission, SubmissionKind::Cpu);
        assert_eq!(config.processing, ProcessingKind::Adaptive);
        assert_eq!(config.job.request.tasks_per_job, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_partial_config() {
        let config: SchedulerConfig = serde_json::from_value(json!({
            "total_cores": 56,
            "total_gpus": 4,
            "submission": "hybrid",
            "processing": "non_adaptive",
            "job": { "command": ["python", "sim.py"], "request": { "tasks_per_job": 2 } }
        }))
        .unwrap();

        assert_eq!(config.totals(), Demand::new(56, 4));
        assert_eq!(config.submission, SubmissionKind::Hybrid);
        assert_eq!(config.processing, ProcessingKind::NonAdaptive);
        assert_eq!(config.job.request.tasks_per_job, 2);
        assert_eq!(config.job.request.cores_per_task, 1);
        assert!(config.require_command().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<SchedulerConfig, _> =
            serde_json::from_value(json!({ "total_cores": 4, "max_cores": 8 }));
        assert!(result.is_err());
    }

    #[rstest]
    #[case(SchedulerConfig::new(0, 0), ConfigError::NoCores)]
    #[case(SchedulerConfig { buffer_time_secs: -1.0, ..SchedulerConfig::new(4, 0) }, ConfigError::InvalidBufferTime(-1.0))]
    #[case(SchedulerConfig { buffer_time_secs: 1e20, ..SchedulerConfig::new(4, 0) }, ConfigError::InvalidBufferTime(1e20))]
    #[case(
        SchedulerConfig { nnodes: Some(1), gpus_per_node: Some(4), ..SchedulerConfig::new(4, 2) }
            .with_submission(SubmissionKind::NodeProvisioned),
        ConfigError::NodeShapeTooLarge { nnodes: 1, gpus_per_node: 4, total_gpus: 2 }
    )]
    #[case(
        SchedulerConfig::new(4, 4).with_submission(SubmissionKind::NodeProvisioned),
        ConfigError::MissingNodeShape { nnodes: None, gpus_per_node: None }
    )]
    fn invalid_configs(#[case] config: SchedulerConfig, #[case] expected: ConfigError) {
        assert_eq!(config.validate().unwrap_err(), expected);
    }

    #[test]
    fn out_of_range_buffer_time_saturates() {
        let huge = SchedulerConfig { buffer_time_secs: 1e20, ..SchedulerConfig::new(4, 0) };
        assert_eq!(huge.buffer_time(), Duration::MAX);

        let nan = SchedulerConfig { buffer_time_secs: f64::NAN, ..SchedulerConfig::new(4, 0) };
        assert_eq!(nan.buffer_time(), Duration::ZERO);
        assert!(nan.validate().is_err());
    }
}
