//! Thread-backed executor.

use super::{Executor, Job, JobList, JobTimes, StateHook, TaskState};
use crate::clock::{self, Wait};
use crate::element::JobStatus;
use crate::error::{Error, Result};
use crate::oal::{Oal, StdOal, ThreadConfig, ThreadHandle};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Default control-call timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Configuration for a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Worker thread parameters. The thread name doubles as the task name.
    pub thread: ThreadConfig,
    /// Bound for control-call synchronization.
    pub timeout: Wait,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            thread: ThreadConfig::default(),
            timeout: Wait::For(DEFAULT_TASK_TIMEOUT),
        }
    }
}

impl TaskConfig {
    /// Config with the given task name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            thread: ThreadConfig::named(name),
            ..Default::default()
        }
    }

    /// Set the worker stack size.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.thread.stack_size = size;
        self
    }

    /// Set the worker priority hint.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.thread.priority = priority;
        self
    }

    /// Pin the worker to a CPU.
    pub fn with_core(mut self, core: usize) -> Self {
        self.thread.core = Some(core);
        self
    }

    /// Prefer external memory for the worker stack.
    pub fn with_external_memory(mut self, prefer: bool) -> Self {
        self.thread.prefer_external_memory = prefer;
        self
    }

    /// Set the control-call timeout.
    pub fn with_timeout(mut self, timeout: Wait) -> Self {
        self.timeout = timeout;
        self
    }
}

struct Ctl {
    state: TaskState,
    jobs: Option<JobList>,
    run_req: bool,
    pause_req: bool,
    resume_req: bool,
    stop_req: bool,
    destroy: bool,
    ack_seq: u64,
    hook: Option<StateHook>,
    timeout: Wait,
}

struct TaskInner {
    name: String,
    ctl: Mutex<Ctl>,
    /// Worker parks here.
    wake: Condvar,
    /// Control callers wait here for acknowledgement.
    sync: Condvar,
}

/// An executor running its job list on a dedicated worker thread.
///
/// # Example
///
/// ```rust
/// use mediaflow::element::JobStatus;
/// use mediaflow::executor::{Executor, Job, JobList, Task, TaskConfig, TaskState};
///
/// let task = Task::new(TaskConfig::named("doc_task")).unwrap();
/// let mut jobs = JobList::new();
/// jobs.push(Job::once("hello", || JobStatus::Done));
/// task.load_jobs(jobs).unwrap();
/// assert_eq!(task.state(), TaskState::Initialized);
/// task.run().unwrap();
/// ```
pub struct Task {
    inner: Arc<TaskInner>,
    oal: Arc<dyn Oal>,
    worker: Option<ThreadHandle>,
}

impl Task {
    /// Create a task on a std thread.
    pub fn new(config: TaskConfig) -> Result<Self> {
        Self::with_oal(config, Arc::new(StdOal::new()))
    }

    /// Create a task whose worker is created through `oal`.
    pub fn with_oal(config: TaskConfig, oal: Arc<dyn Oal>) -> Result<Self> {
        let inner = Arc::new(TaskInner {
            name: config.thread.name.clone(),
            ctl: Mutex::new(Ctl {
                state: TaskState::None,
                jobs: None,
                run_req: false,
                pause_req: false,
                resume_req: false,
                stop_req: false,
                destroy: false,
                ack_seq: 0,
                hook: None,
                timeout: config.timeout,
            }),
            wake: Condvar::new(),
            sync: Condvar::new(),
        });
        let worker_inner = inner.clone();
        let worker = oal.create_thread(&config.thread, Box::new(move || worker_inner.worker_main()))?;
        tracing::debug!("task '{}' created", inner.name);
        Ok(Self {
            inner,
            oal,
            worker: Some(worker),
        })
    }

    fn wait_for<F>(&self, mut ctl: MutexGuard<'_, Ctl>, what: &str, done: F) -> Result<()>
    where
        F: Fn(&Ctl) -> bool,
    {
        let deadline = ctl.timeout.deadline();
        while !done(&ctl) {
            ctl = match deadline {
                None => self.inner.sync.wait(ctl).unwrap(),
                Some(deadline) => match clock::remaining(deadline) {
                    Some(t) => self.inner.sync.wait_timeout(ctl, t).unwrap().0,
                    None => {
                        tracing::warn!("task '{}': {} not acknowledged in time", self.inner.name, what);
                        return Err(Error::Timeout(format!(
                            "task '{}' did not acknowledge {}",
                            self.inner.name, what
                        )));
                    }
                },
            };
        }
        Ok(())
    }
}

impl TaskInner {
    /// Announce `to` through the hook, then switch to it.
    fn enter(&self, to: TaskState) {
        let (from, hook) = {
            let ctl = self.ctl.lock().unwrap();
            (ctl.state, ctl.hook.clone())
        };
        if let Some(hook) = hook {
            hook(from, to);
        }
        let mut ctl = self.ctl.lock().unwrap();
        ctl.state = to;
        ctl.ack_seq += 1;
        self.sync.notify_all();
        tracing::debug!("task '{}' entered {}", self.name, to);
    }

    fn worker_main(&self) {
        tracing::debug!("task '{}' worker started", self.name);
        loop {
            let list = {
                let mut ctl = self.ctl.lock().unwrap();
                while !ctl.run_req && !ctl.destroy {
                    ctl = self.wake.wait(ctl).unwrap();
                }
                if ctl.destroy {
                    break;
                }
                ctl.run_req = false;
                ctl.jobs.take()
            };
            let Some(list) = list else {
                self.enter(TaskState::Error);
                continue;
            };

            self.enter(TaskState::Running);
            let (mut jobs, finalizers) = list.into_parts();
            let end = self.run_jobs(&mut jobs);
            drop(jobs);
            for finalize in finalizers {
                finalize();
            }
            {
                let mut ctl = self.ctl.lock().unwrap();
                ctl.stop_req = false;
                ctl.pause_req = false;
                ctl.resume_req = false;
            }
            self.enter(end);
        }
        tracing::debug!("task '{}' worker exiting", self.name);
    }

    fn run_jobs(&self, jobs: &mut Vec<Job>) -> TaskState {
        let mut idx = 0;
        loop {
            if jobs.is_empty() {
                return TaskState::Finished;
            }
            if let Some(end) = self.checkpoint() {
                return end;
            }
            if idx >= jobs.len() {
                idx = 0;
            }

            match jobs[idx].run() {
                JobStatus::Continue => idx = 0,
                JobStatus::Done => {
                    tracing::debug!("task '{}': job '{}' done", self.name, jobs[idx].label());
                    jobs.remove(idx);
                }
                JobStatus::Fail => {
                    let ctl = self.ctl.lock().unwrap();
                    if ctl.stop_req || ctl.destroy {
                        return TaskState::Stopped;
                    }
                    tracing::error!("task '{}': job '{}' failed", self.name, jobs[idx].label());
                    return TaskState::Error;
                }
                JobStatus::Ok | JobStatus::Produced(_) => match jobs[idx].times() {
                    JobTimes::Once => {
                        jobs.remove(idx);
                    }
                    JobTimes::Everlasting => idx += 1,
                },
            }
        }
    }

    /// Honour pending stop and pause requests between jobs.
    fn checkpoint(&self) -> Option<TaskState> {
        {
            let mut ctl = self.ctl.lock().unwrap();
            if ctl.stop_req || ctl.destroy {
                return Some(TaskState::Stopped);
            }
            if !ctl.pause_req {
                return None;
            }
            ctl.pause_req = false;
        }

        self.enter(TaskState::Paused);
        {
            let mut ctl = self.ctl.lock().unwrap();
            loop {
                if ctl.stop_req || ctl.destroy {
                    return Some(TaskState::Stopped);
                }
                if ctl.resume_req {
                    ctl.resume_req = false;
                    break;
                }
                ctl = self.wake.wait(ctl).unwrap();
            }
        }
        self.enter(TaskState::Running);
        None
    }
}

impl Executor for Task {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn bind(&self, hook: StateHook) {
        self.inner.ctl.lock().unwrap().hook = Some(hook);
    }

    fn load_jobs(&self, jobs: JobList) -> Result<()> {
        {
            let mut ctl = self.inner.ctl.lock().unwrap();
            if ctl.state.is_active() {
                return Err(Error::InvalidState(format!(
                    "task '{}' is {}",
                    self.inner.name, ctl.state
                )));
            }
            tracing::debug!("task '{}' loaded {} jobs", self.inner.name, jobs.len());
            ctl.jobs = Some(jobs);
        }
        self.inner.enter(TaskState::Initialized);
        Ok(())
    }

    fn run(&self) -> Result<()> {
        let mut ctl = self.inner.ctl.lock().unwrap();
        if ctl.state.is_active() {
            return Err(Error::NotSupported(format!(
                "task '{}' is already {}",
                self.inner.name, ctl.state
            )));
        }
        if ctl.jobs.is_none() {
            return Err(Error::InvalidState(format!(
                "task '{}' has no jobs loaded",
                self.inner.name
            )));
        }
        ctl.run_req = true;
        ctl.stop_req = false;
        ctl.pause_req = false;
        ctl.resume_req = false;
        let seq = ctl.ack_seq;
        self.inner.wake.notify_all();
        self.wait_for(ctl, "run", |c| c.ack_seq > seq)
    }

    fn request_stop(&self) {
        let mut ctl = self.inner.ctl.lock().unwrap();
        if ctl.state.is_active() || ctl.run_req {
            ctl.stop_req = true;
            self.inner.wake.notify_all();
        }
    }

    fn stop(&self) -> Result<()> {
        let mut ctl = self.inner.ctl.lock().unwrap();
        if !ctl.state.is_active() {
            return Ok(());
        }
        ctl.stop_req = true;
        self.inner.wake.notify_all();
        self.wait_for(ctl, "stop", |c| !c.state.is_active())
    }

    fn pause(&self) -> Result<()> {
        let mut ctl = self.inner.ctl.lock().unwrap();
        if ctl.state != TaskState::Running {
            return Err(Error::NotSupported(format!(
                "cannot pause task '{}' while {}",
                self.inner.name, ctl.state
            )));
        }
        ctl.pause_req = true;
        self.wait_for(ctl, "pause", |c| c.state != TaskState::Running)
    }

    fn resume(&self) -> Result<()> {
        let mut ctl = self.inner.ctl.lock().unwrap();
        if ctl.state != TaskState::Paused {
            return Err(Error::NotSupported(format!(
                "cannot resume task '{}' while {}",
                self.inner.name, ctl.state
            )));
        }
        ctl.resume_req = true;
        self.inner.wake.notify_all();
        self.wait_for(ctl, "resume", |c| c.state != TaskState::Paused)
    }

    fn reset(&self) -> Result<()> {
        self.stop()?;
        {
            let mut ctl = self.inner.ctl.lock().unwrap();
            ctl.jobs = None;
            ctl.run_req = false;
        }
        self.inner.enter(TaskState::None);
        Ok(())
    }

    fn set_timeout(&self, wait: Wait) {
        self.inner.ctl.lock().unwrap().timeout = wait;
    }

    fn state(&self) -> TaskState {
        self.inner.ctl.lock().unwrap().state
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        {
            let mut ctl = self.inner.ctl.lock().unwrap();
            ctl.destroy = true;
            self.inner.wake.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = self.oal.delete_thread(worker) {
                tracing::warn!("task '{}': {}", self.inner.name, e);
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
