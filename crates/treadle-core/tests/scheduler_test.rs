//! Integration tests for the cooperative scheduler loop: dependency
//! ordering, retry semantics, failure propagation, and time budgets.
//!
//! The tasks here are scripted test doubles that record what the scheduler
//! does to them, so the tests can assert on step ordering and counts, not
//! just final statuses.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow};

use treadle_core::job::{Job, JobRef, JobStatus, TaskFactory};
use treadle_core::scheduler::Scheduler;
use treadle_core::task::{Step, Task};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

type EventLog = Rc<RefCell<Vec<String>>>;

/// Finishes on its first step, appending its name to a shared log.
struct OneStepTask {
    name: &'static str,
    log: EventLog,
}

impl Task for OneStepTask {
    fn step(&mut self) -> Result<Step> {
        self.log.borrow_mut().push(self.name.to_string());
        Ok(Step::Done(None))
    }

    fn close(&mut self) {}
}

fn one_step(name: &'static str, log: &EventLog) -> TaskFactory {
    let log = Rc::clone(log);
    Box::new(move || {
        Ok(Box::new(OneStepTask {
            name,
            log: Rc::clone(&log),
        }) as Box<dyn Task>)
    })
}

/// Counts how many times it was stepped; never finishes on its own.
struct SpyTask {
    steps: Rc<Cell<u32>>,
}

impl Task for SpyTask {
    fn step(&mut self) -> Result<Step> {
        self.steps.set(self.steps.get() + 1);
        Ok(Step::Done(None))
    }

    fn close(&mut self) {}
}

fn spy(steps: &Rc<Cell<u32>>) -> TaskFactory {
    let steps = Rc::clone(steps);
    Box::new(move || {
        Ok(Box::new(SpyTask {
            steps: Rc::clone(&steps),
        }) as Box<dyn Task>)
    })
}

/// Fails every step with the same error text.
struct AlwaysFailsTask;

impl Task for AlwaysFailsTask {
    fn step(&mut self) -> Result<Step> {
        Err(anyhow!("disk on fire"))
    }

    fn close(&mut self) {}
}

fn always_fails() -> TaskFactory {
    Box::new(|| Ok(Box::new(AlwaysFailsTask) as Box<dyn Task>))
}

fn now() -> f64 {
    treadle_core::clock::unix_now()
}

// ---------------------------------------------------------------------------
// Scenario: simple dependency chain
// ---------------------------------------------------------------------------

#[test]
fn chain_completes_with_dependencies_stepped_first() {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));

    let a = Job::new("a", "one_step", one_step("a", &log)).into_ref();
    let b = Job::new("b", "one_step", one_step("b", &log)).into_ref();

    // c's task checks its dependencies' statuses at the moment it steps.
    let deps_done_at_step = Rc::new(Cell::new(false));
    let c_factory: TaskFactory = {
        let log = Rc::clone(&log);
        let watch: Vec<JobRef> = vec![Rc::clone(&a), Rc::clone(&b)];
        let seen = Rc::clone(&deps_done_at_step);
        Box::new(move || {
            let log = Rc::clone(&log);
            let watch = watch.clone();
            let seen = Rc::clone(&seen);
            Ok(Box::new(ProbeTask { log, watch, seen }) as Box<dyn Task>)
        })
    };
    let c = Job::new("c", "probe", c_factory)
        .with_dependencies(vec![Rc::clone(&a), Rc::clone(&b)])
        .into_ref();

    struct ProbeTask {
        log: EventLog,
        watch: Vec<JobRef>,
        seen: Rc<Cell<bool>>,
    }

    impl Task for ProbeTask {
        fn step(&mut self) -> Result<Step> {
            self.log.borrow_mut().push("c".to_string());
            self.seen.set(
                self.watch
                    .iter()
                    .all(|j| j.borrow().status == JobStatus::Completed),
            );
            Ok(Step::Done(None))
        }

        fn close(&mut self) {}
    }

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&a));
    scheduler.schedule(Rc::clone(&b));
    scheduler.schedule(Rc::clone(&c));
    scheduler.run();

    assert_eq!(a.borrow().status, JobStatus::Completed);
    assert_eq!(b.borrow().status, JobStatus::Completed);
    assert_eq!(c.borrow().status, JobStatus::Completed);
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert!(
        deps_done_at_step.get(),
        "c stepped before both dependencies completed"
    );
}

// ---------------------------------------------------------------------------
// Scenario: retry and succeed
// ---------------------------------------------------------------------------

#[test]
fn flaky_job_retries_and_completes() {
    // Fails its first-ever step, succeeds on the retry's first step.
    struct FlakyTask {
        attempts: Rc<Cell<u32>>,
    }

    impl Task for FlakyTask {
        fn step(&mut self) -> Result<Step> {
            if self.attempts.get() == 0 {
                self.attempts.set(1);
                return Err(anyhow!("transient failure"));
            }
            Ok(Step::Done(Some("recovered".to_string())))
        }

        fn close(&mut self) {}
    }

    let attempts = Rc::new(Cell::new(0));
    let factory: TaskFactory = {
        let attempts = Rc::clone(&attempts);
        Box::new(move || {
            Ok(Box::new(FlakyTask {
                attempts: Rc::clone(&attempts),
            }) as Box<dyn Task>)
        })
    };
    let job = Job::new("flaky", "flaky", factory).with_max_tries(2).into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&job));
    scheduler.run();

    let job = job.borrow();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_tries, 1);
    assert_eq!(job.result.as_deref(), Some("recovered"));
    assert!(job.error.is_none());
}

// ---------------------------------------------------------------------------
// Scenario: retry exhaustion
// ---------------------------------------------------------------------------

#[test]
fn always_failing_job_exhausts_retries() {
    let job = Job::new("doomed", "always_fails", always_fails())
        .with_max_tries(2)
        .into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&job));
    scheduler.run();

    let job = job.borrow();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.current_tries, 2);
    let error = job.error.as_deref().expect("error should be recorded");
    assert!(error.contains("disk on fire"), "unexpected error: {error}");
}

// ---------------------------------------------------------------------------
// Scenario: failed-dependency propagation
// ---------------------------------------------------------------------------

#[test]
fn failed_dependency_fails_dependent_without_stepping_it() {
    let a = Job::new("a", "always_fails", always_fails()).into_ref();

    let steps = Rc::new(Cell::new(0));
    let b = Job::new("b", "spy", spy(&steps))
        .with_dependencies(vec![Rc::clone(&a)])
        .into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&a));
    scheduler.schedule(Rc::clone(&b));
    scheduler.run();

    assert_eq!(a.borrow().status, JobStatus::Failed);
    assert_eq!(b.borrow().status, JobStatus::Failed);
    assert_eq!(b.borrow().error.as_deref(), Some("Dependency failed"));
    assert_eq!(steps.get(), 0, "b's task must never be stepped");
}

// ---------------------------------------------------------------------------
// Scenario: working-time budget
// ---------------------------------------------------------------------------

#[test]
fn slow_job_exceeds_its_time_budget() {
    // Yields forever; each step outlasts the whole budget.
    struct SleeperTask;

    impl Task for SleeperTask {
        fn step(&mut self) -> Result<Step> {
            std::thread::sleep(Duration::from_millis(60));
            Ok(Step::Yielded(None))
        }

        fn close(&mut self) {}
    }

    let job = Job::new("slow", "sleeper", Box::new(|| Ok(Box::new(SleeperTask) as Box<dyn Task>)))
        .with_max_working_time(0.05)
        .into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&job));
    scheduler.run();

    let job = job.borrow();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Max working time exceeded"));
}

// ---------------------------------------------------------------------------
// Time gate
// ---------------------------------------------------------------------------

#[test]
fn no_step_runs_before_start_at() {
    struct StampTask {
        stepped_at: Rc<Cell<f64>>,
    }

    impl Task for StampTask {
        fn step(&mut self) -> Result<Step> {
            self.stepped_at.set(now());
            Ok(Step::Done(None))
        }

        fn close(&mut self) {}
    }

    let stepped_at = Rc::new(Cell::new(0.0));
    let factory: TaskFactory = {
        let stepped_at = Rc::clone(&stepped_at);
        Box::new(move || {
            Ok(Box::new(StampTask {
                stepped_at: Rc::clone(&stepped_at),
            }) as Box<dyn Task>)
        })
    };

    let start_at = now() + 0.05;
    let job = Job::new("later", "stamp", factory)
        .with_start_at(start_at)
        .into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&job));
    scheduler.run();

    assert_eq!(job.borrow().status, JobStatus::Completed);
    assert!(
        stepped_at.get() >= start_at,
        "stepped at {} before start_at {}",
        stepped_at.get(),
        start_at
    );
}

// ---------------------------------------------------------------------------
// FIFO rotation
// ---------------------------------------------------------------------------

#[test]
fn queue_rotates_multi_step_jobs_fifo() {
    // Two jobs of two steps each interleave turn by turn.
    struct TwoStepTask {
        name: &'static str,
        log: EventLog,
        stepped: bool,
    }

    impl Task for TwoStepTask {
        fn step(&mut self) -> Result<Step> {
            self.log.borrow_mut().push(self.name.to_string());
            if self.stepped {
                return Ok(Step::Done(None));
            }
            self.stepped = true;
            Ok(Step::Yielded(None))
        }

        fn close(&mut self) {}
    }

    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let factory = |name: &'static str, log: &EventLog| -> TaskFactory {
        let log = Rc::clone(log);
        Box::new(move || {
            Ok(Box::new(TwoStepTask {
                name,
                log: Rc::clone(&log),
                stepped: false,
            }) as Box<dyn Task>)
        })
    };

    let first = Job::new("first", "two_step", factory("first", &log)).into_ref();
    let second = Job::new("second", "two_step", factory("second", &log)).into_ref();

    let mut scheduler = Scheduler::new();
    scheduler.schedule(Rc::clone(&first));
    scheduler.schedule(Rc::clone(&second));
    scheduler.run();

    assert_eq!(*log.borrow(), vec!["first", "second", "first", "second"]);
    assert_eq!(first.borrow().status, JobStatus::Completed);
    assert_eq!(second.borrow().status, JobStatus::Completed);
}
