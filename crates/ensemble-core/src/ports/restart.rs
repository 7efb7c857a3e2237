//! Restart hook port.
//!
//! Called exactly once per resolved future, before the future leaves the
//! futures table. The on-disk format belongs to the implementation.

use std::path::Path;

use crate::domain::{JobOutcome, TaskId, TaskName};
use crate::error::RestartError;

/// Everything the hook learns about a resolved task.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTask<'a> {
    pub task_id: TaskId,
    pub name: &'a TaskName,
    pub outcome: &'a JobOutcome,
    pub workdir: &'a Path,
}

pub trait RestartHook: Send {
    fn on_resolved(&mut self, resolved: ResolvedTask<'_>) -> Result<(), RestartError>;
}

/// Hook that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRestartHook;

impl RestartHook for NoopRestartHook {
    fn on_resolved(&mut self, _resolved: ResolvedTask<'_>) -> Result<(), RestartError> {
        Ok(())
    }
}
