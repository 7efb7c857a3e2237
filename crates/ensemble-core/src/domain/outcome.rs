//! Result of a resolved job.

use serde::{Deserialize, Serialize};

/// What a resolved future reports.
///
/// Serialized with an explicit tag so restart journals stay readable:
/// `{"kind":"exited","code":0}` / `{"kind":"errored","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job ran and exited with `code`.
    Exited { code: i32 },

    /// The job could not produce an exit code (launcher exception, killed by
    /// a signal, lost node).
    Errored { message: String },
}

impl JobOutcome {
    pub fn success() -> Self {
        JobOutcome::Exited { code: 0 }
    }

    pub fn exited(code: i32) -> Self {
        JobOutcome::Exited { code }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        JobOutcome::Errored {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Exited { code: 0 })
    }

    /// Human readable failure reason, `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            JobOutcome::Exited { code: 0 } => None,
            JobOutcome::Exited { code } => Some(format!("exited with code {code}")),
            JobOutcome::Errored { message } => Some(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_exit_is_success() {
        assert!(JobOutcome::success().is_success());
        assert!(!JobOutcome::exited(1).is_success());
        assert!(!JobOutcome::errored("lost node").is_success());
    }

    #[test]
    fn failure_reason() {
        assert_eq!(JobOutcome::success().failure_reason(), None);
        assert_eq!(
            JobOutcome::exited(3).failure_reason().as_deref(),
            Some("exited with code 3")
        );
        assert_eq!(
            JobOutcome::errored("boom").failure_reason().as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn outcome_is_tagged() {
        let v = serde_json::to_value(JobOutcome::exited(2)).unwrap();
        assert_eq!(v["kind"], "exited");
        assert_eq!(v["code"], 2);
    }
}
