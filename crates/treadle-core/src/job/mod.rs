//! The job model: a scheduling envelope around a task, carrying identity,
//! timing, retry, and dependency metadata plus lifecycle status.
//!
//! Status transitions per attempt are monotonic:
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETED
//!                    -> FAILED
//! FAILED  -> RUNNING   (retry: fresh task, next turn)
//! ```
//!
//! Jobs are shared between the scheduler queue and the dependency lists of
//! other jobs, so they live behind [`JobRef`] (`Rc<RefCell<Job>>`) -- the
//! execution model is strictly single-threaded cooperative.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::unix_now;
use crate::task::{Step, Task};

/// Shared handle to a job. Dependencies hold the same `Rc` the queue does,
/// so a dependency finalizing is observed by every dependent.
pub type JobRef = Rc<RefCell<Job>>;

/// Zero-argument producer of a fresh task bound to the job's arguments.
/// Invoked on the first step of every attempt, so it must be re-invocable.
pub type TaskFactory = Box<dyn Fn() -> Result<Box<dyn Task>>>;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job. Serialized by enumeration name, which is
/// also the form the state file stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// A terminal job is never stepped or re-enqueued again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(JobStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`JobStatus`] string.
#[derive(Debug, Clone)]
pub struct JobStatusParseError(pub String);

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {:?}", self.0)
    }
}

impl std::error::Error for JobStatusParseError {}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// What one scheduler turn of [`Job::run`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Start time or dependencies gate the job; no step was taken.
    NotRunnable,
    /// The task made one unit of progress and must be stepped again.
    Yielded,
    /// The task signaled completion with an optional final payload.
    Done(Option<String>),
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A schedulable unit: a task plus identity, gating, budget, and retry
/// metadata.
///
/// The scheduler owns the task-handle lifecycle: the handle is created
/// lazily on the first step of an attempt and closed on completion, retry,
/// and abort. Everything else on the job is plain data.
pub struct Job {
    pub job_id: String,
    /// Symbolic task name; what the state file records as `func_name`.
    pub task_name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    factory: TaskFactory,
    /// Unix seconds before which the job is not eligible to run.
    pub start_at: f64,
    /// Wall-clock budget in seconds from `start_time`; `-1` disables.
    pub max_working_time: f64,
    /// Construction time; origin of the working-time budget.
    pub start_time: f64,
    pub max_tries: u32,
    pub current_tries: u32,
    pub dependencies: Vec<JobRef>,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    task: Option<Box<dyn Task>>,
}

impl Job {
    /// Create a job with default gating: eligible immediately, no time
    /// budget, a single try, no dependencies.
    pub fn new(job_id: impl Into<String>, task_name: impl Into<String>, factory: TaskFactory) -> Self {
        let now = unix_now();
        Self {
            job_id: job_id.into(),
            task_name: task_name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            factory,
            start_at: now,
            max_working_time: -1.0,
            start_time: now,
            max_tries: 1,
            current_tries: 0,
            dependencies: Vec::new(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            task: None,
        }
    }

    /// Set the positional task arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the named task arguments.
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Gate the job until the given Unix time.
    pub fn with_start_at(mut self, start_at: f64) -> Self {
        self.start_at = start_at;
        self
    }

    /// Set the wall-clock budget in seconds (`-1` disables).
    pub fn with_max_working_time(mut self, max_working_time: f64) -> Self {
        self.max_working_time = max_working_time;
        self
    }

    /// Set the total allowed attempts after an exception.
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Set the jobs that must complete before this one may step.
    pub fn with_dependencies(mut self, dependencies: Vec<JobRef>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Wrap the job in a shared handle.
    pub fn into_ref(self) -> JobRef {
        Rc::new(RefCell::new(self))
    }

    /// Assign a status and the optional terminal payload / error.
    pub fn update_status(&mut self, status: JobStatus, result: Option<String>, error: Option<String>) {
        self.status = status;
        self.result = result;
        self.error = error;
    }

    /// True iff a retry is still allowed.
    pub fn can_retry(&self) -> bool {
        self.current_tries < self.max_tries
    }

    /// True iff the working-time budget is set and spent.
    pub fn has_exceeded_max_time(&self) -> bool {
        if self.max_working_time < 0.0 {
            return false;
        }
        unix_now() - self.start_time > self.max_working_time
    }

    /// True iff the start-time gate has passed.
    pub fn is_start_time_reached(&self) -> bool {
        unix_now() >= self.start_at
    }

    /// True iff every dependency has completed.
    ///
    /// A dependency that cannot be observed (the job itself, mid-turn, in
    /// a malformed cyclic graph) counts as not completed, so cycles starve
    /// instead of panicking.
    pub fn are_dependencies_completed(&self) -> bool {
        self.dependencies
            .iter()
            .all(|dep| matches!(dep.try_borrow().map(|d| d.status), Ok(JobStatus::Completed)))
    }

    /// True iff at least one dependency has failed.
    pub fn has_failed_dependency(&self) -> bool {
        self.dependencies
            .iter()
            .any(|dep| matches!(dep.try_borrow().map(|d| d.status), Ok(JobStatus::Failed)))
    }

    /// True iff the start time has arrived and all dependencies completed.
    pub fn is_runnable(&self) -> bool {
        self.is_start_time_reached() && self.are_dependencies_completed()
    }

    /// Advance the underlying task by exactly one step.
    ///
    /// Returns [`RunOutcome::NotRunnable`] without side effects when the
    /// gates are not met. Otherwise transitions to `RUNNING`, builds the
    /// task handle if this is the first step of the attempt, and steps it
    /// once. A step error propagates and leaves the handle for the caller
    /// to close.
    pub fn run(&mut self) -> Result<RunOutcome> {
        if !self.is_runnable() {
            tracing::debug!(
                job_id = %self.job_id,
                task = %self.task_name,
                "not runnable yet, rotating back to the queue"
            );
            return Ok(RunOutcome::NotRunnable);
        }

        self.update_status(JobStatus::Running, None, None);

        let mut task = match self.task.take() {
            Some(task) => task,
            None => (self.factory)()?,
        };
        let step = task.step();
        self.task = Some(task);

        match step? {
            Step::Yielded(payload) => {
                if let Some(message) = payload {
                    tracing::debug!(job_id = %self.job_id, payload = %message, "step yielded");
                }
                Ok(RunOutcome::Yielded)
            }
            Step::Done(payload) => {
                self.close_task();
                Ok(RunOutcome::Done(payload))
            }
        }
    }

    /// Discard the current task handle so the next turn rebuilds a fresh
    /// one from the factory. Used on retry.
    pub fn restart_task(&mut self) {
        tracing::info!(job_id = %self.job_id, "restarting task for a fresh attempt");
        self.task = None;
    }

    /// Best-effort release of the current task handle.
    pub fn close_task(&mut self) {
        if let Some(mut task) = self.task.take() {
            tracing::debug!(job_id = %self.job_id, "closing task handle");
            task.close();
        }
    }

    /// True iff a task handle is currently alive (an attempt is mid-flight).
    pub fn has_task_handle(&self) -> bool {
        self.task.is_some()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("job_id", &self.job_id)
            .field("task_name", &self.task_name)
            .field("status", &self.status)
            .field("current_tries", &self.current_tries)
            .field("max_tries", &self.max_tries)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}
