//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ensemble_core::{ProcessingKind, SubmissionKind};

/// Adaptive in-job task scheduler.
#[derive(Parser, Debug)]
#[command(name = "ensemble", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every task of the manifest as local processes.
    Run(RunArgs),

    /// Dry-run the manifest on the simulated launcher.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scheduler config (TOML).
    #[arg(long, env = "ENSEMBLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Task manifest (JSON array of tasks).
    #[arg(long)]
    pub tasks: PathBuf,

    /// Restart journal. Tasks it records as completed are skipped, and this
    /// run appends to it.
    #[arg(long)]
    pub restart: Option<PathBuf>,

    /// Attempts per task, the first one included.
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,

    /// Delay before the first retry round, in seconds.
    #[arg(long, default_value_t = 0.0)]
    pub retry_delay: f64,

    /// Write the final report here instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[arg(long)]
    pub cores: Option<u32>,

    #[arg(long)]
    pub gpus: Option<u32>,

    /// Throttle interval in seconds.
    #[arg(long)]
    pub buffer_time: Option<f64>,

    #[arg(long, value_enum)]
    pub submission: Option<SubmissionArg>,

    #[arg(long, value_enum)]
    pub processing: Option<ProcessingArg>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Simulated duration of every task, in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub duration: f64,

    /// Tasks that exit with code 1.
    #[arg(long = "fail", value_name = "NAME")]
    pub failing: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionArg {
    Cpu,
    Gpu,
    Hybrid,
    NodeProvisioned,
}

impl From<SubmissionArg> for SubmissionKind {
    fn from(arg: SubmissionArg) -> Self {
        match arg {
            SubmissionArg::Cpu => SubmissionKind::Cpu,
            SubmissionArg::Gpu => SubmissionKind::Gpu,
            SubmissionArg::Hybrid => SubmissionKind::Hybrid,
            SubmissionArg::NodeProvisioned => SubmissionKind::NodeProvisioned,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingArg {
    Adaptive,
    NonAdaptive,
}

impl From<ProcessingArg> for ProcessingKind {
    fn from(arg: ProcessingArg) -> Self {
        match arg {
            ProcessingArg::Adaptive => ProcessingKind::Adaptive,
            ProcessingArg::NonAdaptive => ProcessingKind::NonAdaptive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "ensemble",
            "simulate",
            "--tasks",
            "tasks.json",
            "--cores",
            "8",
            "--processing",
            "non-adaptive",
            "--fail",
            "3",
            "--fail",
            "5",
        ])
        .unwrap();

        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.run.cores, Some(8));
        assert_eq!(args.run.processing, Some(ProcessingArg::NonAdaptive));
        assert_eq!(args.failing, vec!["3", "5"]);
        assert_eq!(args.run.max_attempts, 1);
    }

    #[test]
    fn tasks_are_required() {
        assert!(Cli::try_parse_from(["ensemble", "run"]).is_err());
    }
}
