//! OS abstraction: threads, aligned memory and time.
//!
//! Executors and pipelines only reach the operating system through the
//! [`Oal`] trait. [`StdOal`] implements it with `std` threads, `std::alloc`
//! and, on Linux, `rustix` for CPU affinity.

use crate::error::{Error, Result};
use crate::memory::AlignedBuf;
use std::fmt;
use std::thread::JoinHandle;
use std::time::Instant;

/// Default worker stack size.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default tick rate for [`Oal::ms_to_ticks`].
pub const DEFAULT_TICK_HZ: u32 = 1000;

/// Thread creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Thread name.
    pub name: String,
    /// Stack size in bytes.
    pub stack_size: usize,
    /// Scheduling priority hint.
    pub priority: i32,
    /// CPU to pin the thread to.
    pub core: Option<usize>,
    /// Place the stack in external memory where the platform has it.
    pub prefer_external_memory: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name: "mf_task".into(),
            stack_size: DEFAULT_STACK_SIZE,
            priority: 5,
            core: None,
            prefer_external_memory: false,
        }
    }
}

impl ThreadConfig {
    /// Config with the given thread name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the stack size.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Set the priority hint.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Pin to a CPU.
    pub fn with_core(mut self, core: usize) -> Self {
        self.core = Some(core);
        self
    }

    /// Prefer external memory for the stack.
    pub fn with_external_memory(mut self, prefer: bool) -> Self {
        self.prefer_external_memory = prefer;
        self
    }
}

/// Handle to a thread created through an [`Oal`].
pub struct ThreadHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl ThreadHandle {
    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// The operating-system services the engine needs.
pub trait Oal: Send + Sync {
    /// Start `entry` on a new thread.
    fn create_thread(
        &self,
        config: &ThreadConfig,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<ThreadHandle>;

    /// Wait for a thread to return.
    fn delete_thread(&self, handle: ThreadHandle) -> Result<()>;

    /// Allocate `size` zeroed bytes aligned to `align`.
    fn aligned_alloc(&self, align: usize, size: usize) -> Result<AlignedBuf>;

    /// Milliseconds since this abstraction was created.
    fn now_ms(&self) -> u64;

    /// Convert milliseconds to scheduler ticks.
    fn ms_to_ticks(&self, ms: u64) -> u64;
}

/// [`Oal`] backed by the standard library.
#[derive(Debug, Clone)]
pub struct StdOal {
    epoch: Instant,
    tick_hz: u32,
}

impl StdOal {
    /// Create with the default tick rate.
    pub fn new() -> Self {
        Self::with_tick_rate(DEFAULT_TICK_HZ)
    }

    /// Create with a custom tick rate.
    pub fn with_tick_rate(tick_hz: u32) -> Self {
        Self {
            epoch: Instant::now(),
            tick_hz: tick_hz.max(1),
        }
    }
}

impl Default for StdOal {
    fn default() -> Self {
        Self::new()
    }
}

impl Oal for StdOal {
    fn create_thread(
        &self,
        config: &ThreadConfig,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<ThreadHandle> {
        if let Some(core) = config.core {
            check_core(core)?;
        }
        if config.prefer_external_memory {
            tracing::debug!("{}: no external memory, using the heap", config.name);
        }
        let name = config.name.clone();
        let core = config.core;
        let priority = config.priority;
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .stack_size(config.stack_size)
            .spawn(move || {
                if let Some(core) = core {
                    if let Err(e) = pin_current_thread(core) {
                        tracing::warn!("failed to pin thread to cpu {}: {}", core, e);
                    }
                }
                tracing::trace!("thread started (priority hint {})", priority);
                entry();
            })?;
        Ok(ThreadHandle {
            name,
            handle: Some(handle),
        })
    }

    fn delete_thread(&self, mut handle: ThreadHandle) -> Result<()> {
        match handle.handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| Error::InvalidState(format!("thread '{}' panicked", handle.name))),
            None => Ok(()),
        }
    }

    fn aligned_alloc(&self, align: usize, size: usize) -> Result<AlignedBuf> {
        AlignedBuf::new(size, align)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn ms_to_ticks(&self, ms: u64) -> u64 {
        ms * self.tick_hz as u64 / 1000
    }
}

#[cfg(target_os = "linux")]
fn check_core(core: usize) -> Result<()> {
    if core >= rustix::thread::CpuSet::MAX_CPU {
        return Err(Error::InvalidArgument(format!("cpu {} out of range", core)));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn check_core(_core: usize) -> Result<()> {
    Ok(())
}

/// Pin the calling thread to one CPU (Linux-specific).
#[cfg(target_os = "linux")]
fn pin_current_thread(core: usize) -> Result<()> {
    let mut set = rustix::thread::CpuSet::new();
    set.set(core);
    rustix::thread::sched_setaffinity(None, &set)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread(_core: usize) -> Result<()> {
    Err(Error::NotSupported("cpu affinity".into()))
}
