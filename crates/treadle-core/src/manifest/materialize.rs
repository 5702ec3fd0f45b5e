//! Materialize a validated manifest into shared jobs.
//!
//! Construction walks the entries in topological order so a dependency is
//! always built before its dependents, then hands the jobs back in
//! manifest order for submission.

use std::collections::HashMap;
use std::rc::Rc;

use uuid::Uuid;

use super::format::Manifest;
use super::parser::{self, ManifestError};
use crate::clock::unix_now;
use crate::job::{Job, JobRef, TaskFactory};
use crate::task::TaskRegistry;

/// Build a [`JobRef`] for every manifest entry.
///
/// Manifest ids are file-local labels; the materialized jobs get fresh
/// UUID job ids. Dependencies resolve to the same shared handle the
/// returned list holds, so completion of a dependency is observed by all
/// of its dependents.
pub fn materialize_jobs(
    manifest: &Manifest,
    tasks: &TaskRegistry,
) -> Result<Vec<JobRef>, ManifestError> {
    let order = parser::topological_order(manifest)?;
    let now = unix_now();
    let mut by_id: HashMap<&str, JobRef> = HashMap::with_capacity(manifest.jobs.len());

    for idx in order {
        let entry = &manifest.jobs[idx];

        let Some(builder) = tasks.get(&entry.function) else {
            return Err(ManifestError::UnknownTask {
                job: entry.id.clone(),
                function: entry.function.clone(),
            });
        };

        let mut dependencies = Vec::with_capacity(entry.dependencies.len());
        for dep_id in &entry.dependencies {
            let Some(dep) = by_id.get(dep_id.as_str()) else {
                return Err(ManifestError::UnknownDependency {
                    job: entry.id.clone(),
                    dependency: dep_id.clone(),
                });
            };
            dependencies.push(Rc::clone(dep));
        }

        let args = entry.args.clone();
        let kwargs = entry.kwargs.clone();
        let factory: TaskFactory = Box::new(move || builder(&args, &kwargs));

        let job_id = Uuid::new_v4().to_string();
        tracing::info!(job_id = %job_id, manifest_id = %entry.id, task = %entry.function, "materialized job");

        let job = Job::new(job_id, entry.function.clone(), factory)
            .with_args(entry.args.clone())
            .with_kwargs(entry.kwargs.clone())
            .with_start_at(now + entry.start_at.unwrap_or(0.0))
            .with_max_working_time(entry.max_working_time)
            .with_max_tries(entry.max_tries)
            .with_dependencies(dependencies)
            .into_ref();
        by_id.insert(entry.id.as_str(), job);
    }

    // Hand the jobs back in manifest order; that is submission order.
    let mut jobs = Vec::with_capacity(manifest.jobs.len());
    for entry in &manifest.jobs {
        if let Some(job) = by_id.get(entry.id.as_str()) {
            jobs.push(Rc::clone(job));
        }
    }
    Ok(jobs)
}
