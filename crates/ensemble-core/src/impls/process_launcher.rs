//! ProcessLauncher: runs each job as local processes.
//!
//! A job with `n` ranks starts `n` copies of its command in the job's
//! working directory, appending to the job's stdout/stderr files. A
//! background task waits for all of them; the future resolves once every
//! rank exited. The first rank (in rank order) with a non-zero status
//! decides the outcome.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{JobOutcome, JobSpec};
use crate::error::LaunchError;
use crate::ports::{JobHandle, LaunchFuture, LaunchStatus};

/// Rank of the process within its job, exported to every child.
pub const RANK_ENV: &str = "ENSEMBLE_TASK_RANK";
/// Number of ranks of the job, exported to every child.
pub const SIZE_ENV: &str = "ENSEMBLE_NUM_TASKS";

#[derive(Debug, Default)]
pub struct ProcessLauncher {
    next_job: AtomicU64,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_append(path: &Path) -> Result<File, LaunchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LaunchError::Rejected(format!("cannot open {}: {e}", path.display())))
}

#[async_trait]
impl JobHandle for ProcessLauncher {
    async fn submit(&self, spec: &JobSpec) -> Result<Box<dyn LaunchFuture>, LaunchError> {
        let Some((program, args)) = spec.argv.split_first() else {
            return Err(LaunchError::Rejected(format!("job '{}' has no command", spec.label)));
        };

        tokio::fs::create_dir_all(&spec.workdir).await.map_err(|e| {
            LaunchError::Rejected(format!("cannot create {}: {e}", spec.workdir.display()))
        })?;

        let ranks = spec.shape.ranks().max(1);
        let mut children: Vec<Child> = Vec::with_capacity(ranks as usize);
        for rank in 0..ranks {
            let spawned = open_append(&spec.stdout)
                .and_then(|out| Ok((out, open_append(&spec.stderr)?)))
                .and_then(|(out, err)| {
                    Command::new(program)
                        .args(args)
                        .current_dir(&spec.workdir)
                        .envs(&spec.env)
                        .env(RANK_ENV, rank.to_string())
                        .env(SIZE_ENV, ranks.to_string())
                        .stdin(Stdio::null())
                        .stdout(Stdio::from(out))
                        .stderr(Stdio::from(err))
                        .kill_on_drop(true)
                        .spawn()
                        .map_err(|e| LaunchError::Rejected(format!("cannot spawn {program}: {e}")))
                });

            match spawned {
                Ok(child) => children.push(child),
                Err(err) => {
                    for child in &mut children {
                        let _ = child.start_kill();
                    }
                    return Err(err);
                }
            }
        }

        let job_ref = format!("proc-{}", self.next_job.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(job = %job_ref, label = %spec.label, ranks, "processes started");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut outcome = JobOutcome::success();
            for mut child in children {
                let rank_outcome = match child.wait().await {
                    Ok(status) => match status.code() {
                        Some(code) => JobOutcome::exited(code),
                        None => JobOutcome::errored(format!("terminated by signal ({status})")),
                    },
                    Err(e) => JobOutcome::errored(format!("wait failed: {e}")),
                };
                if outcome.is_success() && !rank_outcome.is_success() {
                    outcome = rank_outcome;
                }
            }
            // the receiver is gone only if the future was dropped
            let _ = tx.send(outcome);
        });

        Ok(Box::new(ProcessFuture {
            job_ref,
            rx,
            resolved: None,
        }))
    }
}

struct ProcessFuture {
    job_ref: String,
    rx: oneshot::Receiver<JobOutcome>,
    resolved: Option<JobOutcome>,
}

impl LaunchFuture for ProcessFuture {
    fn job_ref(&self) -> String {
        self.job_ref.clone()
    }

    fn poll(&mut self) -> LaunchStatus {
        if let Some(outcome) = &self.resolved {
            return LaunchStatus::Resolved(outcome.clone());
        }
        let outcome = match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return LaunchStatus::Running,
            Err(oneshot::error::TryRecvError::Closed) => {
                JobOutcome::errored("process monitor exited without a result")
            }
        };
        self.resolved = Some(outcome.clone());
        LaunchStatus::Resolved(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{JobTemplate, ResourceRequest, TaskSpec};
    use serde_json::json;
    use std::time::Duration;

    async fn wait(future: &mut Box<dyn LaunchFuture>) -> JobOutcome {
        loop {
            if let LaunchStatus::Resolved(outcome) = future.poll() {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn template(dir: &Path, command: &[&str]) -> JobTemplate {
        JobTemplate {
            base_out_dir: dir.to_path_buf(),
            ..JobTemplate::new(command.iter().map(|s| s.to_string()).collect())
        }
    }

    #[tokio::test]
    async fn runs_every_rank_in_the_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        let template = template(tmp.path(), &["sh", "-c"]);
        let task = TaskSpec::new("7")
            .with_args(json!(["echo rank=$ENSEMBLE_TASK_RANK of $ENSEMBLE_NUM_TASKS"]))
            .with_request(ResourceRequest::new(2, 1, 0));
        let spec = template.per_task_spec(&task);

        let mut future = ProcessLauncher::new().submit(&spec).await.unwrap();
        assert_eq!(wait(&mut future).await, JobOutcome::success());

        let stdout = std::fs::read_to_string(tmp.path().join("7").join("stdout")).unwrap();
        assert!(stdout.contains("rank=0 of 2"));
        assert!(stdout.contains("rank=1 of 2"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let template = template(tmp.path(), &["sh", "-c", "exit 3"]);
        let spec = template.per_task_spec(&TaskSpec::new("x"));

        let mut future = ProcessLauncher::new().submit(&spec).await.unwrap();
        assert_eq!(wait(&mut future).await, JobOutcome::exited(3));
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let template = template(tmp.path(), &["/definitely/not/a/program"]);
        let spec = template.per_task_spec(&TaskSpec::new("x"));

        let result = ProcessLauncher::new().submit(&spec).await;
        assert!(matches!(result, Err(LaunchError::Rejected(_))));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = template(tmp.path(), &[]).per_task_spec(&TaskSpec::new("x"));
        assert!(ProcessLauncher::new().submit(&spec).await.is_err());
    }
}
