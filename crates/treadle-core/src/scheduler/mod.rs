//! The cooperative scheduler: a FIFO job queue with a soft admission cap
//! and a turn loop that advances one job by one step at a time.
//!
//! Each turn pops the head job, applies the time-budget and
//! failed-dependency gates, steps the job once, and either re-enqueues it
//! at the tail or finalizes it. Jobs that are not yet runnable consume one
//! rotation per turn; a full rotation with zero progress backs off briefly
//! without breaking FIFO order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::{JobRef, JobStatus, RunOutcome};
use crate::state::{self, StateError};
use crate::task::TaskRegistry;

const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_STATE_FILE: &str = "treadle_state.json";
/// Backoff applied when every queued job is gated on time or dependencies.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Single-threaded cooperative scheduler.
pub struct Scheduler {
    pool_size: usize,
    queue: VecDeque<JobRef>,
    state_file: PathBuf,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with the default pool cap and state file.
    pub fn new() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue: VecDeque::new(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }

    /// Set the soft admission cap checked by [`schedule`](Self::schedule).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the state file used by save/load.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Path of the state file.
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Number of jobs currently queued.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the queued jobs, head first.
    pub fn queued_jobs(&self) -> Vec<JobRef> {
        self.queue.iter().map(std::rc::Rc::clone).collect()
    }

    /// Admit a job, honoring the pool cap.
    ///
    /// Returns `false` (and refuses the job) when the queue is full. The
    /// cap is a soft admission limit only; see [`add_job`](Self::add_job).
    pub fn schedule(&mut self, job: JobRef) -> bool {
        if self.queue.len() >= self.pool_size {
            tracing::warn!(
                job_id = %job.borrow().job_id,
                pool_size = self.pool_size,
                "queue is at the pool cap, job refused"
            );
            return false;
        }
        tracing::info!(job_id = %job.borrow().job_id, "job scheduled");
        self.queue.push_back(job);
        true
    }

    /// Enqueue a job unconditionally, bypassing the pool cap.
    ///
    /// Retry re-enqueues and state-file loads must not be refused, so they
    /// come through here.
    pub fn add_job(&mut self, job: JobRef) {
        tracing::debug!(job_id = %job.borrow().job_id, "job enqueued");
        self.queue.push_back(job);
    }

    /// Drive the queue until it is empty.
    ///
    /// Terminal jobs are dropped from scheduler memory; they stay alive
    /// through the dependency references other jobs hold.
    pub fn run(&mut self) {
        tracing::info!(jobs = self.queue.len(), "scheduler loop starting");
        let mut idle_turns = 0usize;

        while let Some(job) = self.queue.pop_front() {
            if self.finalize_if_gated(&job) {
                idle_turns = 0;
                continue;
            }

            let outcome = job.borrow_mut().run();
            match outcome {
                Ok(RunOutcome::Done(result)) => {
                    idle_turns = 0;
                    let mut j = job.borrow_mut();
                    j.update_status(JobStatus::Completed, result, None);
                    tracing::info!(job_id = %j.job_id, "job completed");
                }
                Ok(RunOutcome::Yielded) => {
                    idle_turns = 0;
                    if !job.borrow().status.is_terminal() {
                        self.queue.push_back(job);
                    }
                }
                Ok(RunOutcome::NotRunnable) => {
                    idle_turns += 1;
                    if !job.borrow().status.is_terminal() {
                        self.queue.push_back(job);
                    }
                    // A full rotation without progress means everything is
                    // gated on a start time or a pending dependency.
                    if !self.queue.is_empty() && idle_turns >= self.queue.len() {
                        std::thread::sleep(IDLE_SLEEP);
                        idle_turns = 0;
                    }
                }
                Err(e) => {
                    idle_turns = 0;
                    let retry = {
                        let mut j = job.borrow_mut();
                        tracing::error!(job_id = %j.job_id, error = %e, "job step failed");
                        j.close_task();
                        if j.can_retry() {
                            j.restart_task();
                            j.current_tries += 1;
                            true
                        } else {
                            tracing::error!(
                                job_id = %j.job_id,
                                tries = j.current_tries,
                                "retries exhausted"
                            );
                            j.update_status(JobStatus::Failed, None, Some(e.to_string()));
                            false
                        }
                    };
                    if retry {
                        self.add_job(job);
                    }
                }
            }
        }

        tracing::info!("scheduler queue drained");
    }

    /// Apply the pre-step gates. Returns `true` if the job was finalized.
    fn finalize_if_gated(&self, job: &JobRef) -> bool {
        let mut j = job.borrow_mut();
        if j.has_exceeded_max_time() {
            tracing::error!(job_id = %j.job_id, "max working time exceeded");
            j.update_status(
                JobStatus::Failed,
                None,
                Some("Max working time exceeded".to_string()),
            );
            j.close_task();
            return true;
        }
        if j.has_failed_dependency() {
            tracing::error!(job_id = %j.job_id, "cannot run job: dependency failed");
            j.update_status(JobStatus::Failed, None, Some("Dependency failed".to_string()));
            j.close_task();
            return true;
        }
        false
    }

    /// Save every queued job (and its dependency closure) to the state file.
    pub fn stop(&self) -> Result<(), StateError> {
        tracing::info!("stopping scheduler, saving unfinished jobs");
        state::save_jobs(&self.state_file, self.queue.iter())
    }

    /// Load the state file and enqueue whatever restores cleanly.
    ///
    /// Records with an unknown task name are skipped individually; a file
    /// that does not parse at all is an error and nothing is enqueued.
    pub fn load_jobs(&mut self, tasks: &TaskRegistry) -> Result<usize, StateError> {
        let records = state::load_records(&self.state_file)?;
        let jobs = state::restore_jobs(&records, tasks);
        let loaded = jobs.len();
        for job in jobs {
            self.add_job(job);
        }
        Ok(loaded)
    }

    /// Persist the queue, reload it from the state file, and resume running.
    ///
    /// An unusable state file is logged and execution resumes with an
    /// empty queue.
    pub fn restart(&mut self, tasks: &TaskRegistry) -> Result<(), StateError> {
        self.stop()?;
        self.queue.clear();
        match self.load_jobs(tasks) {
            Ok(count) => tracing::info!(jobs = count, "queue reloaded from state file"),
            Err(e) => {
                tracing::error!(error = %e, "state file unusable, resuming with an empty queue");
            }
        }
        self.run();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, TaskFactory};
    use crate::task::{Step, Task};
    use anyhow::Result;

    struct OneShot;

    impl Task for OneShot {
        fn step(&mut self) -> Result<Step> {
            Ok(Step::Done(None))
        }

        fn close(&mut self) {}
    }

    fn one_shot() -> TaskFactory {
        Box::new(|| Ok(Box::new(OneShot) as Box<dyn Task>))
    }

    #[test]
    fn schedule_honors_the_pool_cap() {
        let mut scheduler = Scheduler::new().with_pool_size(2);
        assert!(scheduler.schedule(Job::new("a", "noop", one_shot()).into_ref()));
        assert!(scheduler.schedule(Job::new("b", "noop", one_shot()).into_ref()));
        assert!(!scheduler.schedule(Job::new("c", "noop", one_shot()).into_ref()));
        assert_eq!(scheduler.queue_len(), 2);
    }

    #[test]
    fn add_job_bypasses_the_pool_cap() {
        let mut scheduler = Scheduler::new().with_pool_size(1);
        scheduler.add_job(Job::new("a", "noop", one_shot()).into_ref());
        scheduler.add_job(Job::new("b", "noop", one_shot()).into_ref());
        assert_eq!(scheduler.queue_len(), 2);
    }

    #[test]
    fn run_drains_the_queue() {
        let mut scheduler = Scheduler::new();
        let job = Job::new("a", "noop", one_shot()).into_ref();
        scheduler.schedule(job.clone());
        scheduler.run();
        assert_eq!(scheduler.queue_len(), 0);
        assert_eq!(job.borrow().status, JobStatus::Completed);
    }
}
