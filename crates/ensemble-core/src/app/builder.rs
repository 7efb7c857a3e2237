//! SchedulerBuilder: wiring and fail-fast validation.
//!
//! Every problem that can be seen before the first pass (bad config, no job
//! handle, mismatched task lists, duplicate names, tasks that can never fit)
//! is reported by `build()`, not halfway through a run.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::domain::{TaskName, TaskSpec};
use crate::error::{ConfigError, SchedulerError};
use crate::ports::{
    Clock, EventSink, IdGenerator, JobHandle, NoopEventSink, NoopRestartHook, RestartHook,
    SystemClock, UlidGenerator,
};
use crate::queue::{FuturesTable, TaskRegistry};
use crate::resources::ResourceTracker;
use crate::strategy::{self, ProcessingStrategy, SubmissionStrategy};

use super::context::SchedulerContext;
use super::super_loop::Scheduler;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no job handle was provided")]
    MissingJobHandle,

    #[error("task lists differ in length: {names} names, {other} {list}")]
    ListLengthMismatch {
        list: &'static str,
        names: usize,
        other: usize,
    },

    #[error("duplicate task name '{0}'")]
    DuplicateTaskName(TaskName),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Builds a `Scheduler`.
///
/// ```ignore
/// let scheduler = SchedulerBuilder::new(config)
///     .job_handle(launcher)
///     .task_lists(names, args, Some(dirs))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    handle: Option<Arc<dyn JobHandle>>,
    submission: Option<Box<dyn SubmissionStrategy>>,
    processing: Option<Box<dyn ProcessingStrategy>>,
    restart: Box<dyn RestartHook>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    tasks: Vec<TaskSpec>,
    skip: HashSet<TaskName>,
    list_error: Option<BuildError>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            handle: None,
            submission: None,
            processing: None,
            restart: Box::new(NoopRestartHook),
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            ids: None,
            tasks: Vec::new(),
            skip: HashSet::new(),
            list_error: None,
        }
    }

    /// The single job handle every submission goes through.
    pub fn job_handle(mut self, handle: Arc<dyn JobHandle>) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Override the submission strategy selected by the config.
    pub fn submission(mut self, strategy: impl SubmissionStrategy + 'static) -> Self {
        self.submission = Some(Box::new(strategy));
        self
    }

    /// Override the processing strategy selected by the config.
    pub fn processing(mut self, strategy: impl ProcessingStrategy + 'static) -> Self {
        self.processing = Some(Box::new(strategy));
        self
    }

    pub fn restart_hook(mut self, hook: impl RestartHook + 'static) -> Self {
        self.restart = Box::new(hook);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    pub fn tasks(mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.tasks.extend(specs);
        self
    }

    /// Seed from parallel lists: task names, argument payloads and,
    /// optionally, output directories. All lists must have the same length.
    pub fn task_lists<N>(
        mut self,
        names: impl IntoIterator<Item = N>,
        args: Vec<serde_json::Value>,
        dirs: Option<Vec<PathBuf>>,
    ) -> Self
    where
        N: Into<TaskName>,
    {
        let names: Vec<TaskName> = names.into_iter().map(Into::into).collect();
        if args.len() != names.len() {
            self.list_error = Some(BuildError::ListLengthMismatch {
                list: "argument payloads",
                names: names.len(),
                other: args.len(),
            });
            return self;
        }
        if let Some(dirs) = &dirs
            && dirs.len() != names.len()
        {
            self.list_error = Some(BuildError::ListLengthMismatch {
                list: "task directories",
                names: names.len(),
                other: dirs.len(),
            });
            return self;
        }

        let mut dirs = dirs.map(Vec::into_iter);
        for (name, args) in names.into_iter().zip(args) {
            let mut spec = TaskSpec::new(name).with_args(args);
            if let Some(dir) = dirs.as_mut().and_then(Iterator::next) {
                spec = spec.with_dir(dir);
            }
            self.tasks.push(spec);
        }
        self
    }

    /// Names of tasks that already completed in an earlier run. They are
    /// not enqueued again.
    pub fn skip_completed(mut self, names: impl IntoIterator<Item = TaskName>) -> Self {
        self.skip.extend(names);
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        if let Some(err) = self.list_error {
            return Err(err);
        }
        self.config.validate()?;
        let handle = self.handle.ok_or(BuildError::MissingJobHandle)?;

        let mut seen = HashSet::with_capacity(self.tasks.len());
        for spec in &self.tasks {
            if !seen.insert(&spec.name) {
                return Err(BuildError::DuplicateTaskName(spec.name.clone()));
            }
        }

        let submission = match self.submission {
            Some(strategy) => strategy,
            None => strategy::submission_from_config(&self.config)?,
        };
        let processing = self
            .processing
            .unwrap_or_else(|| strategy::processing_from_config(&self.config));

        let clock = self.clock;
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(ClockRef(Arc::clone(&clock)))),
        };

        let mut ctx = SchedulerContext {
            run_id: ids.generate_run_id(),
            registry: TaskRegistry::new(),
            tracker: ResourceTracker::new(self.config.totals()),
            futures: FuturesTable::new(),
            handle,
            template: self.config.job.clone(),
            restart: self.restart,
            events: self.events,
            clock,
            ids,
        };

        let mut skipped = 0;
        for spec in self.tasks {
            if self.skip.contains(&spec.name) {
                skipped += 1;
                continue;
            }
            ctx.enqueue(spec, submission.as_ref())?;
        }

        info!(
            run_id = %ctx.run_id,
            queued = ctx.registry.len(),
            skipped,
            "scheduler built"
        );

        Ok(Scheduler::new(
            ctx,
            submission,
            processing,
            self.config.buffer_time(),
        ))
    }
}

/// Lets the id generator share the scheduler's clock.
struct ClockRef(Arc<dyn Clock>);

impl Clock for ClockRef {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.0.now()
    }
}
