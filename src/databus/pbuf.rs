//! Pointer buffer: zero-copy slot handoff.
//!
//! Slots are created lazily: the first `acquire_write` (or any write when
//! every existing slot is busy) allocates a new one, up to the configured
//! capacity. Each slot moves through
//!
//! ```text
//! Empty -> Writing -> Filled -> Reading -> Empty
//! ```
//!
//! and filled slots are read in the order they were written.

use super::{BusKind, BusStats, DataBus, wait_on};
use crate::clock::Wait;
use crate::error::{Error, IoError, IoResult, Result};
use crate::payload::Payload;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

/// What the reader currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadHold {
    /// A slot taken from the filled queue.
    Slot,
    /// The synthetic end-of-stream marker.
    EndOfStream,
}

/// Behavioural knobs shared with [`BlockFifo`](super::BlockFifo).
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotPolicy {
    /// Maximum number of slots in existence.
    pub capacity: usize,
    /// Reads before the first write fail instead of waiting.
    pub strict_first_read: bool,
}

struct PbufState {
    free: VecDeque<Payload>,
    filled: VecDeque<Payload>,
    allocated: usize,
    writing: bool,
    reading: Option<ReadHold>,
    ever_written: bool,
    done: bool,
    aborted: bool,
    stats: BusStats,
}

struct PbufInner {
    state: Mutex<PbufState>,
    readable: Condvar,
    writable: Condvar,
    policy: SlotPolicy,
}

/// A fixed-capacity, thread-safe ring of payload slots.
///
/// Cloning shares the same buffer.
///
/// # Example
///
/// ```rust
/// use mediaflow::clock::Wait;
/// use mediaflow::databus::{DataBus, PointerBuffer};
///
/// let pbuf = PointerBuffer::new("pbuf", 2).unwrap();
///
/// let mut p = pbuf.acquire_write(64, Wait::NoWait).unwrap();
/// p.as_mut_slice()[..4].copy_from_slice(b"data");
/// p.set_valid_size(4).unwrap();
/// pbuf.release_write(p, Wait::NoWait).unwrap();
///
/// let p = pbuf.acquire_read(64, Wait::NoWait).unwrap();
/// assert_eq!(p.data(), b"data");
/// pbuf.release_read(p, Wait::NoWait).unwrap();
/// ```
#[derive(Clone)]
pub struct PointerBuffer {
    name: String,
    inner: Arc<PbufInner>,
}

impl PointerBuffer {
    /// Create a pointer buffer holding at most `capacity` slots.
    ///
    /// No slot memory is allocated until the first write.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `capacity` is 0.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        Self::with_policy(
            name,
            SlotPolicy {
                capacity,
                strict_first_read: true,
            },
            VecDeque::new(),
        )
    }

    pub(crate) fn with_policy(
        name: impl Into<String>,
        policy: SlotPolicy,
        slots: VecDeque<Payload>,
    ) -> Result<Self> {
        if policy.capacity == 0 {
            return Err(Error::InvalidArgument(
                "bus capacity must be greater than 0".into(),
            ));
        }
        let allocated = slots.len();
        Ok(Self {
            name: name.into(),
            inner: Arc::new(PbufInner {
                state: Mutex::new(PbufState {
                    free: slots,
                    filled: VecDeque::with_capacity(policy.capacity),
                    allocated,
                    writing: false,
                    reading: None,
                    ever_written: false,
                    done: false,
                    aborted: false,
                    stats: BusStats::default(),
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
                policy,
            }),
        })
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.policy.capacity
    }

    /// Number of slots created so far.
    pub fn allocated(&self) -> usize {
        self.inner.state.lock().unwrap().allocated
    }

    /// Whether `done_write` has been called since the last reset.
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().unwrap().done
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> BusStats {
        self.inner.state.lock().unwrap().stats
    }

    pub(crate) fn free_slots(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.free.len() + (self.inner.policy.capacity - state.allocated)
    }

    pub(crate) fn filled_bytes(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.filled.iter().map(Payload::valid_size).sum()
    }
}

impl DataBus for PointerBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BusKind {
        BusKind::Block
    }

    fn acquire_read(&self, _wanted: usize, wait: Wait) -> IoResult<Payload> {
        let deadline = wait.deadline();
        let mut state = self.inner.state.lock().unwrap();

        if state.reading.is_some() {
            tracing::warn!("{}: acquire_read called twice without release", self.name);
            return Err(IoError::Fail);
        }

        loop {
            if state.aborted {
                return Err(IoError::Aborted);
            }
            if let Some(payload) = state.filled.pop_front() {
                state.reading = Some(ReadHold::Slot);
                state.stats.total_read += 1;
                return Ok(payload);
            }
            if state.done {
                state.reading = Some(ReadHold::EndOfStream);
                let mut eos = Payload::new();
                eos.mark_done();
                return Ok(eos);
            }
            if self.inner.policy.strict_first_read && !state.ever_written {
                tracing::trace!("{}: read before any write", self.name);
                return Err(IoError::Fail);
            }
            state = wait_on(&self.inner.readable, state, wait, deadline)?;
        }
    }

    fn release_read(&self, payload: Payload, _wait: Wait) -> IoResult<()> {
        let mut state = self.inner.state.lock().unwrap();
        match state.reading.take() {
            None => {
                tracing::warn!("{}: release_read without acquire", self.name);
                Err(IoError::Fail)
            }
            Some(ReadHold::EndOfStream) => Ok(()),
            Some(ReadHold::Slot) => {
                state.free.push_back(payload);
                self.inner.writable.notify_one();
                Ok(())
            }
        }
    }

    fn acquire_write(&self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        let deadline = wait.deadline();
        let mut state = self.inner.state.lock().unwrap();

        if state.writing {
            tracing::warn!("{}: acquire_write called twice without release", self.name);
            return Err(IoError::Fail);
        }

        let mut slot = loop {
            if state.aborted {
                return Err(IoError::Aborted);
            }
            if state.done {
                tracing::warn!("{}: acquire_write after done_write", self.name);
                return Err(IoError::Fail);
            }
            if let Some(slot) = state.free.pop_front() {
                break slot;
            }
            if state.allocated < self.inner.policy.capacity {
                state.allocated += 1;
                tracing::trace!(
                    "{}: new slot {}/{}",
                    self.name,
                    state.allocated,
                    self.inner.policy.capacity
                );
                break Payload::new();
            }
            state = wait_on(&self.inner.writable, state, wait, deadline)?;
        };
        state.writing = true;
        drop(state);

        if wanted > slot.buf_length() {
            if let Err(e) = slot.resize(0, wanted) {
                tracing::error!("{}: failed to grow slot to {}: {}", self.name, wanted, e);
                let mut state = self.inner.state.lock().unwrap();
                state.writing = false;
                state.free.push_back(slot);
                return Err(IoError::Fail);
            }
        }
        // Zero-length valid data cannot fail.
        let _ = slot.set_valid_size(0);
        slot.clear_done();
        slot.set_pts(0);
        Ok(slot)
    }

    fn release_write(&self, payload: Payload, _wait: Wait) -> IoResult<()> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.writing {
            tracing::warn!("{}: release_write without acquire", self.name);
            return Err(IoError::Fail);
        }
        state.writing = false;
        if state.aborted {
            state.free.push_back(payload);
            return Err(IoError::Aborted);
        }
        state.filled.push_back(payload);
        state.ever_written = true;
        state.stats.total_written += 1;
        self.inner.readable.notify_one();
        Ok(())
    }

    fn done_write(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.done = true;
        self.inner.readable.notify_all();
    }

    fn abort(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.aborted = true;
        state.stats.aborts += 1;
        tracing::debug!("{}: aborted", self.name);
        self.inner.readable.notify_all();
        self.inner.writable.notify_all();
    }

    fn reset(&self) {
        let mut state = self.inner.state.lock().unwrap();
        let filled = std::mem::take(&mut state.filled);
        state.free.extend(filled);
        // Slots held by a writer or reader at this point are forgotten.
        state.allocated = state.free.len();
        state.writing = false;
        state.reading = None;
        state.ever_written = false;
        state.done = false;
        state.aborted = false;
        tracing::debug!("{}: reset, {} slots kept", self.name, state.allocated);
        self.inner.readable.notify_all();
        self.inner.writable.notify_all();
    }

    /// Slots available for writing, counting ones not yet allocated.
    fn free_size(&self) -> usize {
        self.free_slots()
    }

    /// Slots waiting to be read.
    fn filled_size(&self) -> usize {
        self.inner.state.lock().unwrap().filled.len()
    }

    /// The slot capacity.
    fn total_size(&self) -> usize {
        self.inner.policy.capacity
    }
}

impl fmt::Debug for PointerBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("PointerBuffer")
            .field("name", &self.name)
            .field("capacity", &self.inner.policy.capacity)
            .field("allocated", &state.allocated)
            .field("filled", &state.filled.len())
            .field("done", &state.done)
            .field("aborted", &state.aborted)
            .finish()
    }
}
