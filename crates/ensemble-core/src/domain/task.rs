//! Caller-facing description of one unit of work.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::resources::ResourceRequest;

/// Caller-chosen task name (one entry of the task list).
///
/// Used for the default output directory and for restart bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskName(String);

impl TaskName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A task as the caller enqueues it.
///
/// `args` is opaque to the scheduler; it is only rendered to an argument
/// vector when a job spec is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: TaskName,

    #[serde(default)]
    pub args: serde_json::Value,

    /// Output directory. Relative paths are resolved against the job
    /// template's `base_out_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Per-task override of the template's resource request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ResourceRequest>,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            args: serde_json::Value::Null,
            dir: None,
            request: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_request(mut self, request: ResourceRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Render `args` as command-line arguments.
    ///
    /// Arrays are rendered element-wise, strings verbatim, other scalars with
    /// their display form, objects as compact JSON and null as nothing.
    pub fn argv(&self) -> Vec<String> {
        match &self.args {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items.iter().map(render_arg).collect(),
            other => vec![render_arg(other)],
        }
    }
}

fn render_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(null), vec![])]
    #[case(json!("input.dat"), vec!["input.dat"])]
    #[case(json!(7), vec!["7"])]
    #[case(json!(0.25), vec!["0.25"])]
    #[case(json!(["a", 1, true]), vec!["a", "1", "true"])]
    #[case(json!({"T": 300}), vec![r#"{"T":300}"#])]
    fn argv_renders_json_arguments(#[case] args: serde_json::Value, #[case] expected: Vec<&str>) {
        let spec = TaskSpec::new("t").with_args(args);
        assert_eq!(spec.argv(), expected);
    }

    #[test]
    fn task_spec_deserializes_with_defaults() {
        let spec: TaskSpec = serde_json::from_value(json!({ "name": "3" })).unwrap();
        assert_eq!(spec.name.as_str(), "3");
        assert!(spec.args.is_null());
        assert!(spec.dir.is_none());
        assert!(spec.request.is_none());
    }
}
