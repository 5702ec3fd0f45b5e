//! Manifest YAML parser with validation.
//!
//! Parses a manifest string into a [`Manifest`] and validates:
//! - The file declares at least one job.
//! - Job ids are unique.
//! - Every `function` resolves through the task registry.
//! - `dependencies` references point to ids defined in the file.
//! - The dependency graph is acyclic (topological sort).

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::format::Manifest;
use crate::task::TaskRegistry;

/// Errors that can occur while loading, parsing, or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("manifest must contain at least one job")]
    NoJobs,

    #[error("duplicate job id: {0:?}")]
    DuplicateJobId(String),

    #[error("job {job:?} depends on unknown job {dependency:?}")]
    UnknownDependency { job: String, dependency: String },

    #[error("job {job:?} uses unknown task {function:?}")]
    UnknownTask { job: String, function: String },

    #[error("dependency cycle detected involving jobs: {0}")]
    CycleDetected(String),
}

/// Parse and validate a manifest string against the given task registry.
pub fn parse_manifest(content: &str, tasks: &TaskRegistry) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_yaml::from_str(content)?;
    validate(&manifest, tasks)?;
    Ok(manifest)
}

/// Validate the parsed manifest structure.
fn validate(manifest: &Manifest, tasks: &TaskRegistry) -> Result<(), ManifestError> {
    if manifest.jobs.is_empty() {
        return Err(ManifestError::NoJobs);
    }

    // Collect job ids and check for duplicates.
    let mut seen = HashSet::new();
    for job in &manifest.jobs {
        if !seen.insert(&job.id) {
            return Err(ManifestError::DuplicateJobId(job.id.clone()));
        }
    }

    // Validate task names and dependency references.
    for job in &manifest.jobs {
        if !tasks.contains(&job.function) {
            return Err(ManifestError::UnknownTask {
                job: job.id.clone(),
                function: job.function.clone(),
            });
        }

        for dep in &job.dependencies {
            if !seen.contains(dep) {
                return Err(ManifestError::UnknownDependency {
                    job: job.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    topological_order(manifest)?;

    Ok(())
}

/// Topologically sort the manifest's jobs using Kahn's algorithm.
///
/// Returns indices into `manifest.jobs` in an order where every job comes
/// after its dependencies, or `Err` naming the jobs on a cycle.
pub(super) fn topological_order(manifest: &Manifest) -> Result<Vec<usize>, ManifestError> {
    let job_ids: Vec<&str> = manifest.jobs.iter().map(|j| j.id.as_str()).collect();
    let id_to_idx: HashMap<&str, usize> = job_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let n = job_ids.len();
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

    for job in &manifest.jobs {
        let job_idx = id_to_idx[job.id.as_str()];
        for dep_id in &job.dependencies {
            let dep_idx = id_to_idx[dep_id.as_str()];
            // Edge: dep -> job (dep must complete before job).
            adj[dep_idx].push(job_idx);
            in_degree[job_idx] += 1;
        }
    }

    let mut queue: VecDeque<usize> = VecDeque::new();
    for (i, deg) in in_degree.iter().enumerate() {
        if *deg == 0 {
            queue.push_back(i);
        }
    }

    let mut order = Vec::with_capacity(n);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &neighbor in &adj[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                queue.push_back(neighbor);
            }
        }
    }

    if order.len() != n {
        let cycle_jobs: Vec<&str> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg > 0)
            .map(|(i, _)| job_ids[i])
            .collect();
        return Err(ManifestError::CycleDetected(cycle_jobs.join(", ")));
    }

    Ok(order)
}
