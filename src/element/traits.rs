//! Core element traits.

use super::context::ElementContext;
use crate::error::{IoError, Result};
use std::fmt;

// ============================================================================
// Job status
// ============================================================================

/// Outcome of one `open` or `process` call.
///
/// The executor uses it to decide what runs next:
/// - `Ok` / `Produced(n)`: move on to the next job
/// - `Continue`: start over from the first job (e.g. not enough input yet)
/// - `Done`: end of stream reached, this job is finished
/// - `Fail`: stop the pipeline with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Work done, nothing to report.
    Ok,
    /// Work done, `n` bytes written downstream.
    Produced(usize),
    /// Not finished; run the chain again from the head.
    Continue,
    /// Upstream completed and all buffered input drained.
    Done,
    /// Unrecoverable failure.
    Fail,
}

impl JobStatus {
    /// Whether the job succeeded (`Ok` or `Produced`).
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, JobStatus::Ok | JobStatus::Produced(_))
    }

    /// Bytes produced, if any.
    #[inline]
    pub fn produced(self) -> usize {
        match self {
            JobStatus::Produced(n) => n,
            _ => 0,
        }
    }
}

impl From<IoError> for JobStatus {
    /// A timed-out port asks to run again; anything else ends the job.
    fn from(e: IoError) -> Self {
        match e {
            IoError::Timeout => JobStatus::Continue,
            IoError::Fail | IoError::Aborted => JobStatus::Fail,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Ok => write!(f, "ok"),
            JobStatus::Produced(n) => write!(f, "produced {}", n),
            JobStatus::Continue => write!(f, "continue"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Fail => write!(f, "fail"),
        }
    }
}

// ============================================================================
// State and sound info
// ============================================================================

/// Soft lifecycle state of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElementState {
    /// Created, never opened (or closed and reset).
    #[default]
    Idle,
    /// `open` succeeded.
    Opened,
    /// `process` has run at least once.
    Running,
    /// `close` has run.
    Closed,
}

/// Audio format metadata passed between elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundInfo {
    /// Samples per second.
    pub sample_rate: u32,
    /// Bits per sample.
    pub bits: u16,
    /// Interleaved channels.
    pub channels: u16,
}

impl Default for SoundInfo {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bits: 16,
            channels: 2,
        }
    }
}

impl SoundInfo {
    /// Create sound info.
    pub fn new(sample_rate: u32, bits: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits,
            channels,
        }
    }

    /// Bytes per second of interleaved audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.bits as u64 / 8
    }

    /// Milliseconds of audio in `bytes` bytes, 0 if the format is empty.
    pub fn bytes_to_ms(&self, bytes: u64) -> u64 {
        match self.byte_rate() {
            0 => 0,
            rate => bytes * 1000 / rate,
        }
    }
}

impl fmt::Display for SoundInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} bit, {} ch",
            self.sample_rate, self.bits, self.channels
        )
    }
}

// ============================================================================
// Element trait
// ============================================================================

/// A processing stage.
///
/// The executor calls `open` once, then `process` repeatedly until it
/// returns `Done` or `Fail`, then `close`. `close` is called whenever `open`
/// was attempted, even if it failed.
///
/// Ports are reached through the [`ElementContext`]. A `process` call that
/// acquired a payload must release it before returning, on every path.
///
/// # Example
///
/// ```rust
/// use mediaflow::element::{Element, ElementContext, JobStatus};
/// use mediaflow::error::Result;
///
/// struct Discard;
///
/// impl Element for Discard {
///     fn open(&mut self, _ctx: &mut ElementContext) -> JobStatus {
///         JobStatus::Ok
///     }
///
///     fn process(&mut self, ctx: &mut ElementContext) -> JobStatus {
///         let Some(port) = ctx.in_port_mut() else {
///             return JobStatus::Fail;
///         };
///         let wait = port.wait();
///         let payload = match port.acquire_in(0, wait) {
///             Ok(p) => p,
///             Err(e) => return e.into(),
///         };
///         let done = payload.is_done();
///         if port.release_in(payload, wait).is_err() {
///             return JobStatus::Fail;
///         }
///         if done { JobStatus::Done } else { JobStatus::Ok }
///     }
///
///     fn close(&mut self, _ctx: &mut ElementContext) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Element: Send {
    /// Acquire resources and validate configuration.
    fn open(&mut self, ctx: &mut ElementContext) -> JobStatus;

    /// Perform one unit of work.
    fn process(&mut self, ctx: &mut ElementContext) -> JobStatus;

    /// Release resources. Errors are logged by the caller, never propagated.
    fn close(&mut self, ctx: &mut ElementContext) -> Result<()>;

    /// Upstream reported a new sound format.
    fn on_sound_info(&mut self, _ctx: &mut ElementContext, _info: SoundInfo) {}

    /// Short type name, for `Pipeline::show`.
    fn kind(&self) -> &'static str {
        "element"
    }
}
