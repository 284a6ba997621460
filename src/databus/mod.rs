//! Data buses: the thread-safe handoff between a producer and a consumer.
//!
//! Every bus speaks the same two-phase protocol on each side:
//!
//! ```text
//! writer: acquire_write -> fill -> release_write
//! reader: acquire_read  -> use  -> release_read
//! ```
//!
//! Payloads move out of the bus on acquire and back in on release, so a
//! buffer has exactly one owner at a time. Acquire and release must
//! alternate per side; a second acquire without a release fails with
//! [`IoError::Fail`](crate::error::IoError::Fail).
//!
//! ## Bus types
//!
//! - [`PointerBuffer`]: lazily allocated slots handed over without copying
//! - [`BlockFifo`]: preallocated fixed-size blocks, blocking on both sides
//! - [`RingBuffer`]: a byte ring for raw byte-stream ports
//!
//! ## Waiting
//!
//! Calls that cannot complete immediately honour a [`Wait`]:
//!
//! - `Wait::NoWait` fails at once with `IoError::Fail`
//! - `Wait::For(d)` gives up with `IoError::Timeout`
//! - `Wait::Forever` blocks until the call completes or [`DataBus::abort`]
//!   is called, which yields `IoError::Aborted`
//!
//! End of stream is not an error: once [`DataBus::done_write`] has been
//! called and the bus is drained, readers get a zero-length payload with
//! the done flag set.

mod fifo;
mod pbuf;
mod ringbuf;

pub use fifo::BlockFifo;
pub use pbuf::PointerBuffer;
pub use ringbuf::RingBuffer;

use crate::clock::{self, Wait};
use crate::error::{IoError, IoResult};
use crate::payload::Payload;
use std::fmt;
use std::sync::{Arc, Condvar, MutexGuard};
use std::time::Instant;

/// Granularity of the data a bus moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// Discrete blocks; a read returns exactly what one write published.
    Block,
    /// A byte stream; reads may split or merge writes.
    Byte,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::Block => write!(f, "block"),
            BusKind::Byte => write!(f, "byte"),
        }
    }
}

/// A bounded producer/consumer handoff.
pub trait DataBus: Send + Sync {
    /// Bus name, for logs.
    fn name(&self) -> &str;

    /// Granularity of this bus.
    fn kind(&self) -> BusKind;

    /// Take the oldest filled payload.
    ///
    /// The payload's `valid_size` may be less than `wanted`.
    fn acquire_read(&self, wanted: usize, wait: Wait) -> IoResult<Payload>;

    /// Return a payload obtained from [`acquire_read`](Self::acquire_read).
    fn release_read(&self, payload: Payload, wait: Wait) -> IoResult<()>;

    /// Take a writable payload with at least `wanted` bytes of capacity.
    ///
    /// This is where a writer waits for room; once it returns, the matching
    /// [`release_write`](Self::release_write) does not time out.
    ///
    /// `wanted == 0` asks for a slot without allocating, for callers that
    /// will swap their own buffer in.
    fn acquire_write(&self, wanted: usize, wait: Wait) -> IoResult<Payload>;

    /// Publish a payload obtained from [`acquire_write`](Self::acquire_write).
    fn release_write(&self, payload: Payload, wait: Wait) -> IoResult<()>;

    /// Declare that no further writes will happen.
    fn done_write(&self);

    /// Wake every waiter with [`IoError::Aborted`] without touching contents.
    fn abort(&self);

    /// Return to the freshly created state, discarding queued data.
    ///
    /// Callers must make sure no other thread is inside an acquire/release
    /// (abort and stop the worker first).
    fn reset(&self);

    /// Space available for writing.
    fn free_size(&self) -> usize;

    /// Data waiting to be read.
    fn filled_size(&self) -> usize;

    /// Total size of the bus.
    fn total_size(&self) -> usize;
}

/// Shared handle to a bus.
pub type BusRef = Arc<dyn DataBus>;

/// Counters common to the bus implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Payloads (or bytes, for byte buses) published by writers.
    pub total_written: u64,
    /// Payloads (or bytes, for byte buses) consumed by readers.
    pub total_read: u64,
    /// Number of times the bus was aborted.
    pub aborts: u64,
}

/// Block on `cv` until notified or the wait runs out.
///
/// `NoWait` fails at once; an elapsed deadline yields `Timeout`.
pub(crate) fn wait_on<'a, T>(
    cv: &Condvar,
    guard: MutexGuard<'a, T>,
    wait: Wait,
    deadline: Option<Instant>,
) -> IoResult<MutexGuard<'a, T>> {
    if wait == Wait::NoWait {
        return Err(IoError::Fail);
    }
    match deadline {
        None => Ok(cv.wait(guard).unwrap()),
        Some(deadline) => match clock::remaining(deadline) {
            None => Err(IoError::Timeout),
            Some(t) => {
                let (guard, _) = cv.wait_timeout(guard, t).unwrap();
                Ok(guard)
            }
        },
    }
}
