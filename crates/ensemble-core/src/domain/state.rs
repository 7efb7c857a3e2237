//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// State transitions:
/// - Pending -> Submitted -> Running -> Completed
/// - Pending -> Submitted -> Running -> Failed
/// - Pending -> Submitted -> Completed | Failed (resolved before a running poll)
/// - Pending -> Submitted -> Failed (launcher rejected the job)
///
/// A task never moves backward. A retry is a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for admission.
    Pending,

    /// Handed to the launcher, future created.
    Submitted,

    /// The launcher reported the job as started.
    Running,

    /// Resolved with a zero exit status.
    Completed,

    /// Rejected by the launcher or resolved with an error.
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Tasks in these states hold resources and an outstanding future.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::Submitted | TaskState::Running)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Submitted, Running)
                | (Submitted, Completed)
                | (Submitted, Failed)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Pending, Submitted, true)]
    #[case(Submitted, Running, true)]
    #[case(Submitted, Failed, true)]
    #[case(Running, Completed, true)]
    #[case(Running, Failed, true)]
    #[case(Pending, Running, false)]
    #[case(Pending, Completed, false)]
    #[case(Running, Pending, false)]
    #[case(Completed, Pending, false)]
    #[case(Failed, Pending, false)]
    #[case(Completed, Failed, false)]
    fn transitions_only_move_forward(
        #[case] from: TaskState,
        #[case] to: TaskState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Submitted.is_in_flight());
        assert!(!Pending.is_in_flight());
    }
}
