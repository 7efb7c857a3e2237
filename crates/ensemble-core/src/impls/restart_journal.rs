//! RestartJournal: a JSON-lines restart hook.
//!
//! One line per resolved future. Lines are buffered and flushed every
//! `flush_every` records and when the journal is dropped. `load` reads a
//! journal back so a later run can skip what already completed.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{JobOutcome, TaskId, TaskName};
use crate::error::RestartError;
use crate::ports::{Clock, ResolvedTask, RestartHook, SystemClock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub task_id: TaskId,
    pub name: TaskName,
    pub outcome: JobOutcome,
    pub workdir: PathBuf,
    pub at: DateTime<Utc>,
}

/// What a journal says about earlier runs. A name appears in at most one
/// set; its latest entry decides which.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartState {
    pub completed: BTreeSet<TaskName>,
    pub failed: BTreeSet<TaskName>,
}

pub struct RestartJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    flush_every: usize,
    unflushed: usize,
    clock: Arc<dyn Clock>,
}

impl RestartJournal {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self, RestartError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            flush_every: flush_every.max(1),
            unflushed: 0,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<(), RestartError> {
        self.writer.flush()?;
        self.unflushed = 0;
        Ok(())
    }

    /// Read a journal. A missing file is an empty state.
    pub fn load(path: impl AsRef<Path>) -> Result<RestartState, RestartError> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RestartState::default()),
            Err(e) => return Err(e.into()),
        };

        let mut state = RestartState::default();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line).map_err(|source| RestartError::Corrupt {
                line: index + 1,
                source,
            })?;
            if entry.outcome.is_success() {
                state.failed.remove(&entry.name);
                state.completed.insert(entry.name);
            } else {
                state.completed.remove(&entry.name);
                state.failed.insert(entry.name);
            }
        }
        Ok(state)
    }
}

impl RestartHook for RestartJournal {
    fn on_resolved(&mut self, resolved: ResolvedTask<'_>) -> Result<(), RestartError> {
        let entry = JournalEntry {
            task_id: resolved.task_id,
            name: resolved.name.clone(),
            outcome: resolved.outcome.clone(),
            workdir: resolved.workdir.to_path_buf(),
            at: self.clock.now(),
        };
        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;

        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for RestartJournal {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(path = %self.path.display(), error = %err, "restart journal flush failed");
        }
    }
}

impl std::fmt::Debug for RestartJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartJournal")
            .field("path", &self.path)
            .field("flush_every", &self.flush_every)
            .field("unflushed", &self.unflushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn resolve(journal: &mut RestartJournal, name: &str, outcome: JobOutcome) {
        let name = TaskName::from(name);
        let workdir = PathBuf::from("out").join(name.as_str());
        journal
            .on_resolved(ResolvedTask {
                task_id: TaskId::from_ulid(Ulid::new()),
                name: &name,
                outcome: &outcome,
                workdir: &workdir,
            })
            .unwrap();
    }

    #[test]
    fn load_returns_latest_state_per_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("restart.jsonl");

        {
            let mut journal = RestartJournal::create(&path, 100).unwrap();
            resolve(&mut journal, "1", JobOutcome::success());
            resolve(&mut journal, "2", JobOutcome::exited(1));
            resolve(&mut journal, "3", JobOutcome::errored("lost node"));
            // retry of 2 succeeded
            resolve(&mut journal, "2", JobOutcome::success());
        }

        let state = RestartJournal::load(&path).unwrap();
        assert_eq!(
            state.completed,
            BTreeSet::from([TaskName::from("1"), TaskName::from("2")])
        );
        assert_eq!(state.failed, BTreeSet::from([TaskName::from("3")]));
    }

    #[test]
    fn flushes_every_n_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("restart.jsonl");
        let mut journal = RestartJournal::create(&path, 2).unwrap();

        resolve(&mut journal, "1", JobOutcome::success());
        assert!(RestartJournal::load(&path).unwrap().completed.is_empty());

        resolve(&mut journal, "2", JobOutcome::success());
        assert_eq!(RestartJournal::load(&path).unwrap().completed.len(), 2);
    }

    #[test]
    fn missing_journal_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = RestartJournal::load(tmp.path().join("nope.jsonl")).unwrap();
        assert_eq!(state, RestartState::default());
    }

    #[test]
    fn corrupt_line_is_reported_with_its_number() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("restart.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        let err = RestartJournal::load(&path).unwrap_err();
        assert!(matches!(err, RestartError::Corrupt { line: 2, .. }));
    }
}
