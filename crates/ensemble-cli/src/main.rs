//! ensemble: run a task manifest inside an existing allocation.
//!
//! Exit status: 0 when every task completed, 1 when some task failed,
//! 2 when the run itself could not be carried out.

mod cli;
mod manifest;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ensemble_core::impls::{
    ProcessLauncher, RestartJournal, SimulatedLauncher, TracingEventSink,
};
use ensemble_core::ports::JobHandle;
use ensemble_core::queue::RetryPolicy;
use ensemble_core::{RunReport, SchedulerBuilder};
use tracing::{error, info};

use crate::cli::{Cli, Command, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli.command).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            ExitCode::from(2)
        }
    }
}

async fn execute(command: Command) -> anyhow::Result<RunReport> {
    match command {
        Command::Run(args) => {
            let config = settings::resolve(&args)?;
            config.require_command().context("nothing to run")?;
            let handle: Arc<dyn JobHandle> = Arc::new(ProcessLauncher::new());
            run_manifest(&args, config, handle).await
        }
        Command::Simulate(sim) => {
            let duration = Duration::try_from_secs_f64(sim.duration)
                .context("--duration must be a non-negative number of seconds")?;
            let config = settings::resolve(&sim.run)?;
            let launcher = sim.failing.iter().fold(
                SimulatedLauncher::new().with_duration(duration),
                |launcher, name| launcher.fail(name.as_str(), 1),
            );
            let handle: Arc<dyn JobHandle> = Arc::new(launcher);
            run_manifest(&sim.run, config, handle).await
        }
    }
}

async fn run_manifest(
    args: &RunArgs,
    config: ensemble_core::SchedulerConfig,
    handle: Arc<dyn JobHandle>,
) -> anyhow::Result<RunReport> {
    anyhow::ensure!(args.max_attempts >= 1, "--max-attempts must be at least 1");
    let retry_delay = Duration::try_from_secs_f64(args.retry_delay)
        .context("--retry-delay must be a non-negative number of seconds")?;

    let tasks = manifest::load(&args.tasks, &config.job)?;
    let flush_every = config.write_restart_freq;

    let mut builder = SchedulerBuilder::new(config)
        .job_handle(handle)
        .event_sink(Arc::new(TracingEventSink))
        .tasks(tasks);

    if let Some(path) = &args.restart {
        let state = RestartJournal::load(path)
            .with_context(|| format!("reading restart journal {}", path.display()))?;
        if !state.completed.is_empty() {
            info!(skipped = state.completed.len(), path = %path.display(), "resuming from restart journal");
        }
        let journal = RestartJournal::create(path, flush_every)
            .with_context(|| format!("opening restart journal {}", path.display()))?;
        builder = builder.skip_completed(state.completed).restart_hook(journal);
    }

    let mut scheduler = builder.build().context("building scheduler")?;

    let report = if args.max_attempts > 1 {
        let policy = RetryPolicy::new(args.max_attempts, retry_delay);
        scheduler.run_with_retries(&policy).await?
    } else {
        scheduler.run().await?
    };

    write_report(args, &report)?;
    Ok(report)
}

fn write_report(args: &RunArgs, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("encoding run report")?;
    match &args.report {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing run report {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SimulateArgs;
    use std::path::Path;

    fn run_args(dir: &Path, manifest: &str) -> RunArgs {
        let tasks = dir.join("tasks.json");
        std::fs::write(&tasks, manifest).unwrap();
        RunArgs {
            config: None,
            tasks,
            restart: Some(dir.join("restart.jsonl")),
            max_attempts: 1,
            retry_delay: 0.0,
            report: Some(dir.join("report.json")),
            cores: Some(2),
            gpus: None,
            buffer_time: Some(0.0),
            submission: None,
            processing: None,
        }
    }

    #[tokio::test]
    async fn simulate_reports_failures_and_resumes_from_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"[{ "name": 1 }, { "name": 2 }, { "name": 3 }]"#;

        let first = execute(Command::Simulate(SimulateArgs {
            run: run_args(dir.path(), manifest),
            duration: 0.01,
            failing: vec!["2".to_string()],
        }))
        .await
        .unwrap();
        assert!(!first.is_success());
        assert_eq!(first.completed.len(), 2);
        assert_eq!(first.failed_names().map(|n| n.as_str()).collect::<Vec<_>>(), vec!["2"]);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap())
                .unwrap();
        assert_eq!(written["failed"].as_array().map(Vec::len), Some(1));

        let second = execute(Command::Simulate(SimulateArgs {
            run: run_args(dir.path(), manifest),
            duration: 0.01,
            failing: Vec::new(),
        }))
        .await
        .unwrap();
        assert!(second.is_success());
        assert_eq!(second.completed_names().map(|n| n.as_str()).collect::<Vec<_>>(), vec!["2"]);
    }

    #[tokio::test]
    async fn simulate_retries_until_attempts_run_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_args(dir.path(), r#"[{ "name": "a" }]"#);
        args.max_attempts = 2;

        let report = execute(Command::Simulate(SimulateArgs {
            run: args,
            duration: 0.01,
            failing: vec!["a".to_string()],
        }))
        .await
        .unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempt, 2);
    }

    #[tokio::test]
    async fn unrepresentable_durations_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"[{ "name": "a" }]"#;

        let long_tasks = execute(Command::Simulate(SimulateArgs {
            run: run_args(dir.path(), manifest),
            duration: 1e20,
            failing: Vec::new(),
        }))
        .await;
        assert!(long_tasks.is_err());

        let mut args = run_args(dir.path(), manifest);
        args.retry_delay = -1.0;
        let negative_delay = execute(Command::Simulate(SimulateArgs {
            run: args,
            duration: 0.01,
            failing: Vec::new(),
        }))
        .await;
        assert!(negative_delay.is_err());

        let mut args = run_args(dir.path(), manifest);
        args.buffer_time = Some(1e20);
        let huge_buffer = execute(Command::Simulate(SimulateArgs {
            run: args,
            duration: 0.01,
            failing: Vec::new(),
        }))
        .await;
        assert!(huge_buffer.is_err());
    }

    #[tokio::test]
    async fn run_without_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path(), r#"[{ "name": "a" }]"#);
        assert!(execute(Command::Run(args)).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_executes_local_processes() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("ensemble.toml");
        std::fs::write(
            &config,
            format!(
                "total_cores = 2\nbuffer_time_secs = 0.0\n\n[job]\ncommand = [\"sh\", \"-c\", \"test \\\"$0\\\" != bad\"]\nbase_out_dir = {:?}\n",
                dir.path().join("out").display().to_string()
            ),
        )
        .unwrap();

        let mut args = run_args(dir.path(), r#"[{ "name": "ok", "args": "ok" }, { "name": "bad", "args": "bad" }]"#);
        args.config = Some(config);
        args.cores = None;
        args.buffer_time = None;

        let report = execute(Command::Run(args)).await.unwrap();
        assert_eq!(report.completed_names().map(|n| n.as_str()).collect::<Vec<_>>(), vec!["ok"]);
        assert_eq!(report.failed_names().map(|n| n.as_str()).collect::<Vec<_>>(), vec!["bad"]);
        assert!(dir.path().join("out/ok/stdout").exists());
    }
}
