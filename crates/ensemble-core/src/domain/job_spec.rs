//! Job specifications handed to the launcher.
//!
//! A `JobTemplate` holds everything shared by all tasks of a run (command,
//! output root, default resource request, shell options). A `JobSpec` is the
//! fully resolved request for one task.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::resources::{Demand, ResourceRequest};
use super::task::{TaskName, TaskSpec};

/// Launcher shell options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellOptions {
    /// Bind each rank to its own cores.
    pub cpu_affinity: bool,
    /// Bind each rank to its own GPUs (ignored for CPU-only jobs).
    pub gpu_affinity: bool,
    /// MPI bootstrap plugin (e.g. "pmi2").
    pub mpi: Option<String>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            cpu_affinity: true,
            gpu_affinity: false,
            mpi: None,
        }
    }
}

/// Shared part of every job spec of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobTemplate {
    /// Program and fixed leading arguments. Task arguments are appended.
    pub command: Vec<String>,

    /// Root for relative and default task directories.
    pub base_out_dir: PathBuf,

    /// Default request for tasks that carry none.
    pub request: ResourceRequest,

    pub shell: ShellOptions,

    /// Complete job environment. The engine never reads its own environment.
    pub env: BTreeMap<String, String>,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            base_out_dir: PathBuf::from("out"),
            request: ResourceRequest::default(),
            shell: ShellOptions::default(),
            env: BTreeMap::new(),
        }
    }
}

impl JobTemplate {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    /// The request that applies to `task`.
    pub fn request_for(&self, task: &TaskSpec) -> ResourceRequest {
        task.request.unwrap_or(self.request)
    }

    /// Resolve where `task` runs and where its stdout/stderr land.
    ///
    /// Absolute task directories are used as is; relative ones are joined to
    /// `base_out_dir`; without one the task name is used.
    pub fn workdir_for(&self, task: &TaskSpec) -> PathBuf {
        match &task.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.base_out_dir.join(dir),
            None => self.base_out_dir.join(task.name.as_str()),
        }
    }

    /// Build the per-rank job spec used by the affinity strategies.
    pub fn per_task_spec(&self, task: &TaskSpec) -> JobSpec {
        let request = self.request_for(task);
        let shape = JobShape::PerTask {
            num_tasks: request.tasks_per_job,
            cores_per_task: request.cores_per_task,
            gpus_per_task: request.gpus_per_task,
        };
        self.build(task, shape, request.wants_gpus())
    }

    /// Build a node-provisioned job spec.
    pub fn per_node_spec(&self, task: &TaskSpec, nnodes: u32, gpus_per_node: u32) -> JobSpec {
        let request = self.request_for(task);
        let shape = JobShape::PerNode {
            nnodes,
            gpus_per_node,
            ncores: request.tasks_per_job,
            cores_per_task: request.cores_per_task,
        };
        let mut spec = self.build(task, shape, gpus_per_node > 0);
        spec.env
            .insert("SLURM_GPUS_PER_NODE".to_string(), gpus_per_node.to_string());
        spec
    }

    fn build(&self, task: &TaskSpec, shape: JobShape, uses_gpus: bool) -> JobSpec {
        let workdir = self.workdir_for(task);
        let mut argv = self.command.clone();
        argv.extend(task.argv());

        let mut shell_options = BTreeMap::new();
        if let Some(mpi) = &self.shell.mpi {
            shell_options.insert("mpi".to_string(), mpi.clone());
        }
        if self.shell.cpu_affinity {
            shell_options.insert("cpu-affinity".to_string(), "per-task".to_string());
        }
        if self.shell.gpu_affinity && uses_gpus {
            shell_options.insert("gpu-affinity".to_string(), "per-task".to_string());
        }

        JobSpec {
            label: task.name.clone(),
            argv,
            stdout: workdir.join("stdout"),
            stderr: workdir.join("stderr"),
            workdir,
            env: self.env.clone(),
            shape,
            shell_options,
        }
    }
}

/// How the job asks the launcher for resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobShape {
    /// `num_tasks` ranks with their own cores/GPUs.
    PerTask {
        num_tasks: u32,
        cores_per_task: u32,
        gpus_per_task: u32,
    },
    /// Whole nodes, `ncores` ranks of `cores_per_task` cores spread over them.
    PerNode {
        nnodes: u32,
        gpus_per_node: u32,
        ncores: u32,
        #[serde(default = "one_core")]
        cores_per_task: u32,
    },
}

fn one_core() -> u32 {
    1
}

impl JobShape {
    /// Number of processes the launcher starts for this job.
    pub fn ranks(&self) -> u32 {
        match *self {
            JobShape::PerTask { num_tasks, .. } => num_tasks,
            JobShape::PerNode { ncores, .. } => ncores,
        }
    }

    pub fn demand(&self) -> Demand {
        match *self {
            JobShape::PerTask {
                num_tasks,
                cores_per_task,
                gpus_per_task,
            } => ResourceRequest::new(num_tasks, cores_per_task, gpus_per_task).demand(),
            JobShape::PerNode {
                nnodes,
                gpus_per_node,
                ncores,
                cores_per_task,
            } => Demand::new(
                ncores.saturating_mul(cores_per_task),
                nnodes.saturating_mul(gpus_per_node),
            ),
        }
    }
}

/// Fully resolved launch request for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Name of the task this job runs.
    pub label: TaskName,
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub env: BTreeMap<String, String>,
    pub shape: JobShape,
    pub shell_options: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> JobTemplate {
        JobTemplate {
            base_out_dir: PathBuf::from("/scratch/out"),
            ..JobTemplate::new(vec!["python".into(), "sim.py".into()])
        }
    }

    #[test]
    fn workdir_resolution() {
        let t = template();

        let default = TaskSpec::new("7");
        assert_eq!(t.workdir_for(&default), PathBuf::from("/scratch/out/7"));

        let relative = TaskSpec::new("7").with_dir("batch/a");
        assert_eq!(t.workdir_for(&relative), PathBuf::from("/scratch/out/batch/a"));

        let absolute = TaskSpec::new("7").with_dir("/tmp/x");
        assert_eq!(t.workdir_for(&absolute), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn per_task_spec_appends_args_and_sets_outputs() {
        let t = template();
        let task = TaskSpec::new("1")
            .with_args(json!(["--seed", 42]))
            .with_request(ResourceRequest::new(4, 1, 0));

        let spec = t.per_task_spec(&task);
        assert_eq!(spec.argv, vec!["python", "sim.py", "--seed", "42"]);
        assert_eq!(spec.stdout, PathBuf::from("/scratch/out/1/stdout"));
        assert_eq!(spec.stderr, PathBuf::from("/scratch/out/1/stderr"));
        assert_eq!(spec.shape.ranks(), 4);
        assert_eq!(spec.shape.demand(), Demand::new(4, 0));
        assert_eq!(spec.shell_options.get("cpu-affinity").map(String::as_str), Some("per-task"));
        assert!(!spec.shell_options.contains_key("gpu-affinity"));
    }

    #[test]
    fn gpu_affinity_only_for_gpu_jobs() {
        let mut t = template();
        t.shell.gpu_affinity = true;

        let cpu = t.per_task_spec(&TaskSpec::new("cpu"));
        assert!(!cpu.shell_options.contains_key("gpu-affinity"));

        let gpu = t.per_task_spec(&TaskSpec::new("gpu").with_request(ResourceRequest::new(1, 1, 1)));
        assert!(gpu.shell_options.contains_key("gpu-affinity"));
    }

    #[test]
    fn per_node_spec_exports_gpus_per_node() {
        let t = template();
        let task = TaskSpec::new("n").with_request(ResourceRequest::new(8, 1, 0));

        let spec = t.per_node_spec(&task, 2, 4);
        assert_eq!(spec.shape.demand(), Demand::new(8, 8));
        assert_eq!(spec.env.get("SLURM_GPUS_PER_NODE").map(String::as_str), Some("4"));
    }
}
