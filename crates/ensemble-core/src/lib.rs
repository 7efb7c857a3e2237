//! ensemble-core
//!
//! Adaptive in-job task scheduling: keep a fixed allocation of cores and
//! GPUs saturated with many short, independent tasks by submitting new work
//! as soon as resources free up.
//!
//! # Modules
//! - **domain**: ids, task and job specs, resources, outcomes, events
//! - **ports**: traits at the external seams (job handle, restart hook, event sink, clock, ids)
//! - **queue**: task records, the four-queue registry, the futures table, retry policy
//! - **resources**: the resource tracker
//! - **strategy**: submission and processing strategy families
//! - **app**: scheduler context, super-loop, builder, run report
//! - **impls**: simulated and local-process launchers, restart journal, event sinks
//! - **config**: scheduler configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod resources;
pub mod strategy;

pub use app::{BuildError, RunReport, Scheduler, SchedulerBuilder};
pub use config::{ProcessingKind, SchedulerConfig, SubmissionKind};
pub use error::SchedulerError;
