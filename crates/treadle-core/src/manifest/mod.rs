//! Declarative job manifests: YAML parsing, validation, materialization.
//!
//! A manifest is what the task manager consumes: a `jobs` sequence whose
//! entries name a registered task, its arguments, optional gating, and
//! dependencies on other entries by id. Validation is fail-fast; a valid
//! manifest materializes into shared [`crate::job::JobRef`]s ready for
//! [`crate::scheduler::Scheduler::schedule`].

pub mod format;
pub mod materialize;
pub mod parser;

pub use format::{Manifest, ManifestJob};
pub use materialize::materialize_jobs;
pub use parser::{ManifestError, parse_manifest};

use std::path::Path;
use std::rc::Rc;

use crate::job::JobRef;
use crate::scheduler::Scheduler;
use crate::task::TaskRegistry;

/// Load a manifest file, validate it, materialize its jobs, and submit
/// them to the scheduler. Returns the materialized jobs so the caller can
/// report their outcomes after the scheduler drains.
pub fn submit_manifest(
    path: &Path,
    tasks: &TaskRegistry,
    scheduler: &mut Scheduler,
) -> Result<Vec<JobRef>, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let manifest = parse_manifest(&content, tasks)?;
    let jobs = materialize_jobs(&manifest, tasks)?;

    for job in &jobs {
        if !scheduler.schedule(Rc::clone(job)) {
            tracing::warn!(
                job_id = %job.borrow().job_id,
                "manifest job refused by the pool cap"
            );
        }
    }
    tracing::info!(
        path = %path.display(),
        jobs = jobs.len(),
        "manifest jobs submitted to the scheduler"
    );
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::task::{Step, Task};
    use anyhow::Result;
    use serde_json::{Map, Value};

    struct FakeTask;

    impl Task for FakeTask {
        fn step(&mut self) -> Result<Step> {
            Ok(Step::Done(None))
        }

        fn close(&mut self) {}
    }

    fn build_fake(_args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        Ok(Box::new(FakeTask))
    }

    fn registry() -> TaskRegistry {
        let mut tasks = TaskRegistry::new();
        tasks.register("touch", build_fake);
        tasks
    }

    #[test]
    fn submit_manifest_schedules_and_runs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("jobs.yaml");
        std::fs::write(
            &path,
            r#"
jobs:
  - id: a
    function: touch
  - id: b
    function: touch
    dependencies: [a]
"#,
        )
        .unwrap();

        let tasks = registry();
        let mut scheduler = Scheduler::new().with_state_file(tmp.path().join("state.json"));
        let jobs = submit_manifest(&path, &tasks, &mut scheduler).expect("should submit");
        assert_eq!(jobs.len(), 2);
        assert_eq!(scheduler.queue_len(), 2);

        scheduler.run();
        assert!(jobs
            .iter()
            .all(|j| j.borrow().status == JobStatus::Completed));
    }

    #[test]
    fn submit_manifest_fails_fast_on_invalid_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("jobs.yaml");
        std::fs::write(&path, "jobs: []").unwrap();

        let tasks = registry();
        let mut scheduler = Scheduler::new();
        let err = submit_manifest(&path, &tasks, &mut scheduler).unwrap_err();
        assert!(matches!(err, ManifestError::NoJobs));
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[test]
    fn jobs_past_the_pool_cap_are_refused_but_submission_continues() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("jobs.yaml");
        std::fs::write(
            &path,
            r#"
jobs:
  - id: a
    function: touch
  - id: b
    function: touch
"#,
        )
        .unwrap();

        let tasks = registry();
        let mut scheduler = Scheduler::new().with_pool_size(1);
        let jobs = submit_manifest(&path, &tasks, &mut scheduler).expect("should submit");
        assert_eq!(jobs.len(), 2);
        assert_eq!(scheduler.queue_len(), 1);
    }
}
