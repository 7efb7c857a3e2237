//! Task manifest: a JSON array of `{ "name", "args", "dir", "tasks_per_job" }`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ensemble_core::domain::{JobTemplate, TaskName, TaskSpec};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// A string or an integer.
    #[serde(deserialize_with = "scalar_name")]
    pub name: TaskName,

    #[serde(default)]
    pub args: serde_json::Value,

    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub tasks_per_job: Option<u32>,
}

fn scalar_name<'de, D>(deserializer: D) -> Result<TaskName, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(TaskName::from(s)),
        serde_json::Value::Number(n) => Ok(TaskName::from(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "task name must be a string or a number, got {other}"
        ))),
    }
}

impl ManifestEntry {
    /// The task, with `tasks_per_job` layered over the template's request.
    pub fn into_spec(self, template: &JobTemplate) -> TaskSpec {
        let mut spec = TaskSpec::new(self.name).with_args(self.args);
        if let Some(dir) = self.dir {
            spec = spec.with_dir(dir);
        }
        if let Some(tasks_per_job) = self.tasks_per_job {
            let mut request = template.request;
            request.tasks_per_job = tasks_per_job;
            spec = spec.with_request(request);
        }
        spec
    }
}

pub fn parse(content: &str, template: &JobTemplate) -> anyhow::Result<Vec<TaskSpec>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(content).context("invalid task manifest")?;
    Ok(entries.into_iter().map(|e| e.into_spec(template)).collect())
}

pub fn load(path: &Path, template: &JobTemplate) -> anyhow::Result<Vec<TaskSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading task manifest {}", path.display()))?;
    parse(&content, template).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::domain::ResourceRequest;
    use serde_json::json;

    #[test]
    fn parses_entries_and_layers_tasks_per_job() {
        let template = JobTemplate {
            request: ResourceRequest::new(1, 2, 0),
            ..JobTemplate::default()
        };
        let specs = parse(
            r#"[
                { "name": 1, "args": ["--temp", 300] },
                { "name": "b", "dir": "runs/b", "tasks_per_job": 4 }
            ]"#,
            &template,
        )
        .unwrap();

        assert_eq!(specs[0].name.as_str(), "1");
        assert_eq!(specs[0].args, json!(["--temp", 300]));
        assert!(specs[0].request.is_none());

        assert_eq!(specs[1].dir.as_deref(), Some(Path::new("runs/b")));
        assert_eq!(specs[1].request, Some(ResourceRequest::new(4, 2, 0)));
    }

    #[test]
    fn rejects_bad_names_and_unknown_fields() {
        let template = JobTemplate::default();
        assert!(parse(r#"[{ "name": [1] }]"#, &template).is_err());
        assert!(parse(r#"[{ "name": "a", "gpus": 2 }]"#, &template).is_err());
    }
}
