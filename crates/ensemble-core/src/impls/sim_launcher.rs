//! SimulatedLauncher: an in-process job handle on tokio time.
//!
//! Each job "runs" for a fixed duration and resolves with a planned
//! outcome. Under `#[tokio::test(start_paused = true)]` durations cost no
//! real time. The launcher logs every acquisition and release of a job so
//! tests can measure how many jobs were ever in flight at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{Demand, JobOutcome, JobSpec, TaskName};
use crate::error::LaunchError;
use crate::ports::{JobHandle, LaunchFuture, LaunchStatus};

/// What happens to one simulated job.
#[derive(Debug, Clone, PartialEq)]
pub struct SimPlan {
    /// Time between submission and the first `Running` poll.
    pub start_delay: Duration,
    /// Time between submission and resolution.
    pub duration: Duration,
    pub outcome: JobOutcome,
    /// Refuse the submission with this reason.
    pub reject: Option<String>,
}

impl SimPlan {
    pub fn succeed_after(duration: Duration) -> Self {
        Self {
            start_delay: Duration::ZERO,
            duration,
            outcome: JobOutcome::success(),
            reject: None,
        }
    }
}

impl Default for SimPlan {
    fn default() -> Self {
        Self::succeed_after(Duration::from_secs(1))
    }
}

/// One accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSubmission {
    pub job_ref: String,
    pub label: TaskName,
    pub demand: Demand,
    pub submitted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupancy {
    Acquire(Demand),
    Release(Demand),
}

#[derive(Debug, Default)]
struct SimLog {
    submissions: Vec<SimSubmission>,
    rejections: Vec<TaskName>,
    occupancy: Vec<Occupancy>,
    resolutions: Vec<TaskName>,
}

pub struct SimulatedLauncher {
    default_plan: SimPlan,
    plans: HashMap<TaskName, SimPlan>,
    log: Arc<Mutex<SimLog>>,
    next_job: AtomicU64,
}

impl SimulatedLauncher {
    pub fn new() -> Self {
        Self {
            default_plan: SimPlan::default(),
            plans: HashMap::new(),
            log: Arc::new(Mutex::new(SimLog::default())),
            next_job: AtomicU64::new(1),
        }
    }

    /// Duration of every job without its own plan.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.default_plan.duration = duration;
        self
    }

    pub fn with_plan(mut self, name: impl Into<TaskName>, plan: SimPlan) -> Self {
        self.plans.insert(name.into(), plan);
        self
    }

    /// `name` runs for `duration` and succeeds.
    pub fn task_duration(self, name: impl Into<TaskName>, duration: Duration) -> Self {
        self.with_plan(name, SimPlan::succeed_after(duration))
    }

    /// `name` runs for the default duration and exits with `code`.
    pub fn fail(self, name: impl Into<TaskName>, code: i32) -> Self {
        let plan = SimPlan {
            outcome: JobOutcome::exited(code),
            ..self.default_plan.clone()
        };
        self.with_plan(name, plan)
    }

    /// `name` runs for the default duration and resolves with an error.
    pub fn errored(self, name: impl Into<TaskName>, message: impl Into<String>) -> Self {
        let plan = SimPlan {
            outcome: JobOutcome::errored(message),
            ..self.default_plan.clone()
        };
        self.with_plan(name, plan)
    }

    /// Submissions of `name` are refused.
    pub fn reject(self, name: impl Into<TaskName>, reason: impl Into<String>) -> Self {
        let plan = SimPlan {
            reject: Some(reason.into()),
            ..self.default_plan.clone()
        };
        self.with_plan(name, plan)
    }

    /// Accepted submissions, in order.
    pub fn submissions(&self) -> Vec<SimSubmission> {
        self.lock().submissions.clone()
    }

    /// Names of refused submissions, in order.
    pub fn rejections(&self) -> Vec<TaskName> {
        self.lock().rejections.clone()
    }

    /// Names in the order their futures first reported resolution.
    pub fn resolutions(&self) -> Vec<TaskName> {
        self.lock().resolutions.clone()
    }

    /// Largest number of jobs ever held at once. A job is held from
    /// submission until its future is dropped.
    pub fn max_concurrency(&self) -> usize {
        let log = self.lock();
        let mut current = 0usize;
        let mut peak = 0usize;
        for entry in &log.occupancy {
            match entry {
                Occupancy::Acquire(_) => {
                    current += 1;
                    peak = peak.max(current);
                }
                Occupancy::Release(_) => current = current.saturating_sub(1),
            }
        }
        peak
    }

    /// Largest core/GPU footprint ever held at once, per axis.
    pub fn peak_demand(&self) -> Demand {
        let log = self.lock();
        let mut current = Demand::ZERO;
        let mut peak = Demand::ZERO;
        for entry in &log.occupancy {
            match *entry {
                Occupancy::Acquire(d) => {
                    current = current.saturating_add(d);
                    peak = Demand::new(peak.cores.max(current.cores), peak.gpus.max(current.gpus));
                }
                Occupancy::Release(d) => {
                    current = Demand::new(
                        current.cores.saturating_sub(d.cores),
                        current.gpus.saturating_sub(d.gpus),
                    );
                }
            }
        }
        peak
    }

    fn lock(&self) -> MutexGuard<'_, SimLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandle for SimulatedLauncher {
    async fn submit(&self, spec: &JobSpec) -> Result<Box<dyn LaunchFuture>, LaunchError> {
        let plan = self.plans.get(&spec.label).unwrap_or(&self.default_plan);

        if let Some(reason) = &plan.reject {
            self.lock().rejections.push(spec.label.clone());
            return Err(LaunchError::Rejected(reason.clone()));
        }

        let job_ref = format!("sim-{}", self.next_job.fetch_add(1, Ordering::Relaxed));
        let demand = spec.shape.demand();
        let now = Instant::now();
        {
            let mut log = self.lock();
            log.submissions.push(SimSubmission {
                job_ref: job_ref.clone(),
                label: spec.label.clone(),
                demand,
                submitted_at: now,
            });
            log.occupancy.push(Occupancy::Acquire(demand));
        }

        Ok(Box::new(SimFuture {
            job_ref,
            label: spec.label.clone(),
            demand,
            starts_at: now + plan.start_delay,
            finishes_at: now + plan.duration,
            outcome: plan.outcome.clone(),
            reported: false,
            log: Arc::clone(&self.log),
        }))
    }
}

struct SimFuture {
    job_ref: String,
    label: TaskName,
    demand: Demand,
    starts_at: Instant,
    finishes_at: Instant,
    outcome: JobOutcome,
    reported: bool,
    log: Arc<Mutex<SimLog>>,
}

impl LaunchFuture for SimFuture {
    fn job_ref(&self) -> String {
        self.job_ref.clone()
    }

    fn poll(&mut self) -> LaunchStatus {
        let now = Instant::now();
        if now >= self.finishes_at {
            if !self.reported {
                self.reported = true;
                let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
                log.resolutions.push(self.label.clone());
            }
            LaunchStatus::Resolved(self.outcome.clone())
        } else if now >= self.starts_at {
            LaunchStatus::Running
        } else {
            LaunchStatus::Pending
        }
    }
}

impl Drop for SimFuture {
    fn drop(&mut self) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.occupancy.push(Occupancy::Release(self.demand));
    }
}
