//! Durable queue state: per-job snapshot records, save/load against the
//! state file, and the load-scoped [`JobRegistry`] that preserves
//! shared-dependency identity.
//!
//! A task implementation cannot be serialized, so a record stores the
//! symbolic `func_name` and load resolves it back through the
//! [`TaskRegistry`]. Dependencies are inlined as nested records; on load
//! the registry deduplicates them by `job_id` so every dependent ends up
//! pointing at the same in-memory job.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::job::{Job, JobRef, JobStatus, TaskFactory};
use crate::task::TaskRegistry;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed state file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("job {job_id:?} references unknown task {func_name:?}")]
    UnknownTask { job_id: String, func_name: String },
}

/// One persisted job, dependency closure inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub start_at: f64,
    pub max_working_time: f64,
    pub max_tries: u32,
    pub current_tries: u32,
    pub func_name: String,
    #[serde(default)]
    pub dependencies: Vec<JobRecord>,
}

impl JobRecord {
    /// Snapshot a job and, recursively, its dependency closure.
    pub fn snapshot(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            args: job.args.clone(),
            kwargs: job.kwargs.clone(),
            start_at: job.start_at,
            max_working_time: job.max_working_time,
            max_tries: job.max_tries,
            current_tries: job.current_tries,
            func_name: job.task_name.clone(),
            dependencies: job
                .dependencies
                .iter()
                .map(|dep| Self::snapshot(&dep.borrow()))
                .collect(),
        }
    }

    /// Reconstruct a job from this record.
    ///
    /// Dependencies are restored first; a `job_id` the registry has
    /// already seen resolves to the existing job, so dependency subtrees
    /// shared between records collapse to one in-memory object.
    pub fn restore(
        &self,
        tasks: &TaskRegistry,
        registry: &mut JobRegistry,
    ) -> Result<JobRef, StateError> {
        if let Some(existing) = registry.get(&self.job_id) {
            return Ok(existing);
        }

        let Some(builder) = tasks.get(&self.func_name) else {
            return Err(StateError::UnknownTask {
                job_id: self.job_id.clone(),
                func_name: self.func_name.clone(),
            });
        };

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            dependencies.push(dep.restore(tasks, registry)?);
        }

        let args = self.args.clone();
        let kwargs = self.kwargs.clone();
        let factory: TaskFactory = Box::new(move || builder(&args, &kwargs));

        let mut job = Job::new(self.job_id.clone(), self.func_name.clone(), factory)
            .with_args(self.args.clone())
            .with_kwargs(self.kwargs.clone())
            .with_start_at(self.start_at)
            .with_max_working_time(self.max_working_time)
            .with_max_tries(self.max_tries)
            .with_dependencies(dependencies);
        job.status = self.status;
        job.current_tries = self.current_tries;

        let job = job.into_ref();
        registry.register(Rc::clone(&job));
        Ok(job)
    }
}

/// Transient `job_id -> Job` map scoped to a single load pass.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, JobRef>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previously registered job.
    pub fn get(&self, job_id: &str) -> Option<JobRef> {
        self.jobs.get(job_id).map(Rc::clone)
    }

    /// Register a job under its own id. Re-registering replaces the entry.
    pub fn register(&mut self, job: JobRef) {
        let job_id = job.borrow().job_id.clone();
        self.jobs.insert(job_id, job);
    }

    /// Return the number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Return `true` if no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Serialize the given jobs (dependency closures inlined) to `path`.
pub fn save_jobs<'a>(
    path: &Path,
    jobs: impl IntoIterator<Item = &'a JobRef>,
) -> Result<(), StateError> {
    let records: Vec<JobRecord> = jobs
        .into_iter()
        .map(|job| JobRecord::snapshot(&job.borrow()))
        .collect();
    let payload = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, payload)?;
    tracing::info!(path = %path.display(), jobs = records.len(), "saved queue state");
    Ok(())
}

/// Read job records from `path`.
///
/// A missing file is not an error (nothing to resume). A file that does
/// not parse as a record sequence is: the caller decides whether to start
/// empty.
pub fn load_records(path: &Path) -> Result<Vec<JobRecord>, StateError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

/// Restore records into shared jobs.
///
/// Records that cannot be restored (unknown task name anywhere in their
/// dependency subtree) are skipped with an error log; the rest load.
pub fn restore_jobs(records: &[JobRecord], tasks: &TaskRegistry) -> Vec<JobRef> {
    let mut registry = JobRegistry::new();
    let mut jobs = Vec::with_capacity(records.len());
    for record in records {
        match record.restore(tasks, &mut registry) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                tracing::error!(
                    job_id = %record.job_id,
                    error = %e,
                    "skipping unrecoverable job record"
                );
            }
        }
    }
    jobs
}
