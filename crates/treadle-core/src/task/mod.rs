//! The task step protocol -- the contract a unit of work implements so the
//! scheduler can advance it incrementally.
//!
//! A task is a finite, resumable computation. Each [`Task::step`] call makes
//! one unit of progress and reports whether more work remains, plus the
//! built-in task implementations and the [`TaskRegistry`] that resolves the
//! symbolic names stored in manifests and state files.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!     |
//!     v
//! Job::run --one step per turn--> Box<dyn Task>
//!     |                               |
//!     |   step() -> Yielded(..)       |  more work remains
//!     |   step() -> Done(..)          |  final result, never step again
//!     |   step() -> Err(..)           |  attempt failed, handle unusable
//!     |   close()                     |  idempotent teardown
//! ```

pub mod fetch;
pub mod fs_ops;
pub mod registry;

pub use fetch::FetchToTextFile;
pub use fs_ops::{
    CreateDirectory, CreateFile, DeleteDirectory, DeleteFile, ReadFromFile, WriteToFile,
};
pub use registry::{TaskBuilder, TaskRegistry};

use anyhow::Result;

/// Outcome of a single task step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// One unit of progress was made; the task must be stepped again.
    Yielded(Option<String>),
    /// The task produced its final result and must not be stepped again.
    Done(Option<String>),
}

/// A resumable unit of work driven one step at a time.
///
/// Implementors are small state machines: each [`step`](Task::step) call
/// runs to completion (I/O included) before returning, so a step is also
/// the scheduler's only suspension point. An `Err` from `step` fails the
/// current attempt and the handle must not be stepped again.
///
/// # Object Safety
///
/// The trait is object-safe so a job can own its task as `Box<dyn Task>`
/// and the [`TaskRegistry`] can hand out heterogeneous implementations.
pub trait Task {
    /// Advance the task by exactly one step.
    fn step(&mut self) -> Result<Step>;

    /// Release any resources held between steps (open files, streaming
    /// responses, partial buffers). Must be idempotent and must not fail;
    /// called on completion, on retry, and on abort.
    fn close(&mut self);
}

// Compile-time assertion: Task must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Task) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial task that finishes on its first step, used only to prove
    /// the trait can be implemented and used as `dyn Task`.
    struct NoopTask;

    impl Task for NoopTask {
        fn step(&mut self) -> Result<Step> {
            Ok(Step::Done(None))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn task_is_object_safe() {
        let mut task: Box<dyn Task> = Box::new(NoopTask);
        assert_eq!(task.step().unwrap(), Step::Done(None));
    }

    #[test]
    fn close_is_idempotent() {
        let mut task = NoopTask;
        task.close();
        task.close();
    }
}
