//! Implementations of the ports.
//!
//! - **SimulatedLauncher**: in-process job handle on tokio time (tests, dry runs)
//! - **ProcessLauncher**: runs jobs as local processes
//! - **RestartJournal**: JSON-lines restart hook
//! - **TracingEventSink** / **RecordingEventSink**: status surfaces

pub mod event_sinks;
pub mod process_launcher;
pub mod restart_journal;
pub mod sim_launcher;

pub use self::event_sinks::{RecordingEventSink, TracingEventSink};
pub use self::process_launcher::ProcessLauncher;
pub use self::restart_journal::{JournalEntry, RestartJournal, RestartState};
pub use self::sim_launcher::{SimPlan, SimSubmission, SimulatedLauncher};
