//! Command handlers for the treadle binary.

use std::path::Path;

use anyhow::{Context, Result, bail};

use treadle_core::job::JobRef;
use treadle_core::manifest::{self, parse_manifest};
use treadle_core::scheduler::Scheduler;
use treadle_core::task::TaskRegistry;

use crate::config::{self, ConfigFile, SchedulerSection, TreadleConfig};

fn build_scheduler(config: &TreadleConfig) -> Scheduler {
    Scheduler::new()
        .with_pool_size(config.pool_size)
        .with_state_file(&config.state_file)
}

/// Print each job's final disposition after the scheduler drained.
fn print_outcomes(jobs: &[JobRef]) {
    for job in jobs {
        let job = job.borrow();
        match &job.error {
            Some(error) => println!("  {} [{}] {}: {error}", job.job_id, job.task_name, job.status),
            None => match &job.result {
                Some(result) => {
                    println!("  {} [{}] {}: {result}", job.job_id, job.task_name, job.status)
                }
                None => println!("  {} [{}] {}", job.job_id, job.task_name, job.status),
            },
        }
    }
}

/// Execute `treadle run`: submit a manifest and drive it to completion.
pub fn cmd_run(manifest_path: &str, config: &TreadleConfig) -> Result<()> {
    let tasks = TaskRegistry::builtin();
    let mut scheduler = build_scheduler(config);

    let jobs = manifest::submit_manifest(Path::new(manifest_path), &tasks, &mut scheduler)
        .with_context(|| format!("failed to load manifest {manifest_path}"))?;

    println!("Running {} job(s) from {manifest_path}", jobs.len());
    scheduler.run();
    print_outcomes(&jobs);
    Ok(())
}

/// Execute `treadle resume`: reload the state file and drive the queue.
///
/// An unusable state file is reported and execution continues with an
/// empty queue, so one bad snapshot cannot wedge the deployment.
pub fn cmd_resume(config: &TreadleConfig) -> Result<()> {
    let tasks = TaskRegistry::builtin();
    let mut scheduler = build_scheduler(config);

    match scheduler.load_jobs(&tasks) {
        Ok(0) => {
            println!("Nothing to resume in {}", scheduler.state_file().display());
            return Ok(());
        }
        Ok(loaded) => {
            println!(
                "Resuming {loaded} job(s) from {}",
                scheduler.state_file().display()
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "state file unusable, starting with an empty queue");
            println!("State file unusable ({e}); nothing to resume");
            return Ok(());
        }
    }

    let jobs = scheduler.queued_jobs();
    scheduler.run();
    print_outcomes(&jobs);
    Ok(())
}

/// Execute `treadle check`: validate a manifest without running it.
pub fn cmd_check(manifest_path: &str) -> Result<()> {
    let tasks = TaskRegistry::builtin();
    let content = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read manifest {manifest_path}"))?;
    let manifest = parse_manifest(&content, &tasks)
        .with_context(|| format!("manifest {manifest_path} is invalid"))?;

    println!("{manifest_path}: {} job(s), OK", manifest.jobs.len());
    for job in &manifest.jobs {
        if job.dependencies.is_empty() {
            println!("  {} [{}]", job.id, job.function);
        } else {
            println!(
                "  {} [{}] <- {}",
                job.id,
                job.function,
                job.dependencies.join(", ")
            );
        }
    }
    Ok(())
}

/// Execute `treadle init`: write a config file.
pub fn cmd_init(
    state_file: Option<&str>,
    pool_size: Option<usize>,
    force: bool,
) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile {
        scheduler: SchedulerSection {
            state_file: state_file.unwrap_or(config::DEFAULT_STATE_FILE).to_string(),
            pool_size: pool_size.unwrap_or(config::DEFAULT_POOL_SIZE),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  scheduler.state_file = {}", cfg.scheduler.state_file);
    println!("  scheduler.pool_size = {}", cfg.scheduler.pool_size);
    Ok(())
}
