//! Scheduler config: TOML file plus command-line overrides.

use std::path::Path;

use anyhow::Context;
use ensemble_core::SchedulerConfig;

use crate::cli::RunArgs;

pub fn from_toml(content: &str) -> anyhow::Result<SchedulerConfig> {
    toml::from_str(content).context("invalid scheduler config")
}

pub fn from_file(path: &Path) -> anyhow::Result<SchedulerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    from_toml(&content).with_context(|| format!("in {}", path.display()))
}

/// Load the config file (if any), apply flag overrides, validate.
pub fn resolve(args: &RunArgs) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => from_file(path)?,
        None => SchedulerConfig::default(),
    };

    if let Some(cores) = args.cores {
        config.total_cores = cores;
    }
    if let Some(gpus) = args.gpus {
        config.total_gpus = gpus;
    }
    if let Some(buffer) = args.buffer_time {
        config.buffer_time_secs = buffer;
    }
    if let Some(kind) = args.submission {
        config.submission = kind.into();
    }
    if let Some(kind) = args.processing {
        config.processing = kind.into();
    }

    config.validate().context("invalid scheduler config")?;
    Ok(config)
}
