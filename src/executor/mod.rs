//! Executors: the worker that walks a pipeline's job list.
//!
//! A pipeline turns its elements into [`Job`]s and hands them to an
//! [`Executor`] as a [`JobList`]. The executor runs the jobs on its own
//! worker thread and answers control calls (`run`, `stop`, `pause`,
//! `resume`) by synchronizing with that thread, bounded by a timeout.
//!
//! # Job loop
//!
//! ```text
//! Ok / Produced  -> next job (Once jobs are removed)
//! Continue       -> back to the first job
//! Done           -> remove the job; an empty list means Finished
//! Fail           -> Error (Stopped if a stop was requested)
//! ```
//!
//! When the list terminates, the finalizers run (element `close` calls)
//! before the terminal state is announced.

mod task;

pub use task::{Task, TaskConfig};

use crate::clock::Wait;
use crate::element::JobStatus;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Executor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    /// No jobs loaded.
    #[default]
    None,
    /// Jobs loaded, not started.
    Initialized,
    /// Worker is walking the job list.
    Running,
    /// Worker is parked until resume or stop.
    Paused,
    /// Stopped on request.
    Stopped,
    /// Every job reported `Done`.
    Finished,
    /// A job failed.
    Error,
}

impl TaskState {
    /// Whether the worker is currently busy with a job list.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Paused)
    }

    /// Whether the job list has terminated.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Stopped | TaskState::Finished | TaskState::Error
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::None => "none",
            TaskState::Initialized => "initialized",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Stopped => "stopped",
            TaskState::Finished => "finished",
            TaskState::Error => "error",
        };
        f.write_str(s)
    }
}

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobTimes {
    /// Removed after its first successful run.
    Once,
    /// Runs until it reports `Done` or `Fail`.
    Everlasting,
}

/// A unit of work for the executor.
pub struct Job {
    label: String,
    times: JobTimes,
    func: Box<dyn FnMut() -> JobStatus + Send>,
}

impl Job {
    /// Create a job.
    pub fn new(
        label: impl Into<String>,
        times: JobTimes,
        func: impl FnMut() -> JobStatus + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            times,
            func: Box::new(func),
        }
    }

    /// A job that runs until it succeeds once.
    pub fn once(label: impl Into<String>, func: impl FnMut() -> JobStatus + Send + 'static) -> Self {
        Self::new(label, JobTimes::Once, func)
    }

    /// A job that runs until done.
    pub fn everlasting(
        label: impl Into<String>,
        func: impl FnMut() -> JobStatus + Send + 'static,
    ) -> Self {
        Self::new(label, JobTimes::Everlasting, func)
    }

    /// Job label, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// How often the job runs.
    pub fn times(&self) -> JobTimes {
        self.times
    }

    /// Run the job once.
    pub fn run(&mut self) -> JobStatus {
        (self.func)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .field("times", &self.times)
            .finish()
    }
}

/// Cleanup run once the job list terminates.
pub type Finalizer = Box<dyn FnOnce() + Send>;

/// Jobs plus the finalizers that undo them.
#[derive(Default)]
pub struct JobList {
    jobs: Vec<Job>,
    finalizers: Vec<Finalizer>,
}

impl JobList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job.
    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Append a finalizer. Finalizers run in insertion order.
    pub fn push_finalizer(&mut self, f: impl FnOnce() + Send + 'static) {
        self.finalizers.push(Box::new(f));
    }

    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether there are no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job labels in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.label())
    }

    pub(crate) fn into_parts(self) -> (Vec<Job>, Vec<Finalizer>) {
        (self.jobs, self.finalizers)
    }
}

impl fmt::Debug for JobList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobList")
            .field("jobs", &self.jobs)
            .field("finalizers", &self.finalizers.len())
            .finish()
    }
}

/// Called as `hook(from, to)` before the executor changes state.
pub type StateHook = Arc<dyn Fn(TaskState, TaskState) + Send + Sync>;

/// A worker context that drives a job list.
///
/// Control calls block until the worker acknowledges them or the
/// configured timeout expires, in which case they return
/// [`Error::Timeout`](crate::error::Error::Timeout) without guaranteeing the
/// transition happened.
pub trait Executor: Send + Sync {
    /// Executor name.
    fn name(&self) -> &str;

    /// Install the state-change hook.
    fn bind(&self, hook: StateHook);

    /// Replace the job list and enter `Initialized`.
    fn load_jobs(&self, jobs: JobList) -> Result<()>;

    /// Start the loaded jobs.
    fn run(&self) -> Result<()>;

    /// Ask the worker to stop without waiting.
    fn request_stop(&self);

    /// Stop and wait for the worker to acknowledge.
    fn stop(&self) -> Result<()>;

    /// Park the worker between jobs.
    fn pause(&self) -> Result<()>;

    /// Unpark a paused worker.
    fn resume(&self) -> Result<()>;

    /// Stop if needed, drop the jobs and return to `None`.
    fn reset(&self) -> Result<()>;

    /// Bound for control-call synchronization.
    fn set_timeout(&self, wait: Wait);

    /// Current state.
    fn state(&self) -> TaskState;
}

/// Shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;
