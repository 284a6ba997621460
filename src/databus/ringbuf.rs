//! Byte ring buffer for raw byte-stream ports.

use super::{BusKind, BusStats, DataBus, wait_on};
use crate::clock::Wait;
use crate::error::{Error, IoError, IoResult, Result};
use crate::payload::Payload;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

struct RingState {
    data: VecDeque<u8>,
    write_scratch: Option<Payload>,
    read_scratch: Option<Payload>,
    writing: bool,
    reading: bool,
    done: bool,
    aborted: bool,
    stats: BusStats,
}

struct RingInner {
    state: Mutex<RingState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

/// A bounded byte stream.
///
/// Writers get a scratch payload on acquire once the ring has room for
/// `wanted` bytes (or is empty, when `wanted` exceeds the capacity). That
/// room is reserved for the writer, so release of up to `wanted` bytes
/// never waits. Bytes past the reservation are fed in as readers drain the
/// ring; release only returns early if the ring is aborted. Readers get up
/// to `wanted` bytes of whatever is buffered. Sizes are reported in bytes.
#[derive(Clone)]
pub struct RingBuffer {
    name: String,
    inner: Arc<RingInner>,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `capacity` is 0.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "ring capacity must be greater than 0".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            inner: Arc::new(RingInner {
                state: Mutex::new(RingState {
                    data: VecDeque::with_capacity(capacity),
                    write_scratch: None,
                    read_scratch: None,
                    writing: false,
                    reading: false,
                    done: false,
                    aborted: false,
                    stats: BusStats::default(),
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Snapshot of the counters (in bytes).
    pub fn stats(&self) -> BusStats {
        self.inner.state.lock().unwrap().stats
    }
}

fn scratch(slot: &mut Option<Payload>, wanted: usize) -> IoResult<Payload> {
    let mut payload = slot.take().unwrap_or_default();
    if wanted > payload.buf_length() {
        payload.resize(0, wanted).map_err(|_| IoError::Fail)?;
    }
    payload.clear_done();
    let _ = payload.set_valid_size(0);
    Ok(payload)
}

impl DataBus for RingBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BusKind {
        BusKind::Byte
    }

    fn acquire_read(&self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        let deadline = wait.deadline();
        let mut state = self.inner.state.lock().unwrap();
        if state.reading {
            tracing::warn!("{}: acquire_read called twice without release", self.name);
            return Err(IoError::Fail);
        }

        loop {
            if state.aborted {
                return Err(IoError::Aborted);
            }
            if !state.data.is_empty() || state.done {
                break;
            }
            state = wait_on(&self.inner.readable, state, wait, deadline)?;
        }

        let want = if wanted == 0 { self.inner.capacity } else { wanted };
        let n = want.min(state.data.len());
        let mut payload = scratch(&mut state.read_scratch, n.max(1))?;
        for (dst, src) in payload.as_mut_slice().iter_mut().zip(state.data.drain(..n)) {
            *dst = src;
        }
        let _ = payload.set_valid_size(n);
        if state.done && state.data.is_empty() {
            payload.mark_done();
        }
        state.reading = true;
        state.stats.total_read += n as u64;
        self.inner.writable.notify_all();
        Ok(payload)
    }

    fn release_read(&self, payload: Payload, _wait: Wait) -> IoResult<()> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.reading {
            tracing::warn!("{}: release_read without acquire", self.name);
            return Err(IoError::Fail);
        }
        state.reading = false;
        state.read_scratch = Some(payload);
        Ok(())
    }

    fn acquire_write(&self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        let deadline = wait.deadline();
        let mut state = self.inner.state.lock().unwrap();
        if state.writing {
            tracing::warn!("{}: acquire_write called twice without release", self.name);
            return Err(IoError::Fail);
        }
        let reserve = wanted.min(self.inner.capacity);
        loop {
            if state.aborted {
                return Err(IoError::Aborted);
            }
            if self.inner.capacity - state.data.len() >= reserve {
                break;
            }
            state = wait_on(&self.inner.writable, state, wait, deadline)?;
        }
        let payload = scratch(&mut state.write_scratch, wanted)?;
        state.writing = true;
        Ok(payload)
    }

    fn release_write(&self, payload: Payload, _wait: Wait) -> IoResult<()> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.writing {
            tracing::warn!("{}: release_write without acquire", self.name);
            return Err(IoError::Fail);
        }

        let mut pending = payload.data();
        let result = loop {
            if state.aborted {
                break Err(IoError::Aborted);
            }
            let space = self.inner.capacity - state.data.len();
            let n = space.min(pending.len());
            if n > 0 {
                state.data.extend(&pending[..n]);
                state.stats.total_written += n as u64;
                pending = &pending[n..];
                self.inner.readable.notify_all();
            }
            if pending.is_empty() {
                break Ok(());
            }
            // Past the reservation: a partial write cannot be handed back.
            match wait_on(&self.inner.writable, state, Wait::Forever, None) {
                Ok(guard) => state = guard,
                Err(e) => {
                    state = self.inner.state.lock().unwrap();
                    break Err(e);
                }
            }
        };

        if result.is_ok() && payload.is_done() {
            state.done = true;
            self.inner.readable.notify_all();
        }
        state.writing = false;
        state.write_scratch = Some(payload);
        result
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
        state.data.clear();
        state.writing = false;
        state.reading = false;
        state.done = false;
        state.aborted = false;
        tracing::debug!("{}: reset", self.name);
        self.inner.readable.notify_all();
        self.inner.writable.notify_all();
    }

    fn free_size(&self) -> usize {
        self.inner.capacity - self.inner.state.lock().unwrap().data.len()
    }

    fn filled_size(&self) -> usize {
        self.inner.state.lock().unwrap().data.len()
    }

    fn total_size(&self) -> usize {
        self.inner.capacity
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("name", &self.name)
            .field("capacity", &self.inner.capacity)
            .field("filled", &self.filled_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn write(ring: &RingBuffer, data: &[u8], done: bool) -> IoResult<()> {
        let mut p = ring.acquire_write(data.len(), Wait::NoWait)?;
        p.as_mut_slice()[..data.len()].copy_from_slice(data);
        p.set_valid_size(data.len()).unwrap();
        if done {
            p.mark_done();
        }
        ring.release_write(p, Wait::from_millis(2000))
    }

    fn read(ring: &RingBuffer, wanted: usize) -> (Vec<u8>, bool) {
        let p = ring.acquire_read(wanted, Wait::from_millis(2000)).unwrap();
        let out = (p.data().to_vec(), p.is_done());
        ring.release_read(p, Wait::NoWait).unwrap();
        out
    }

    #[test]
    fn test_ring_splits_and_merges() {
        let ring = RingBuffer::new("ring", 64).unwrap();
        write(&ring, b"hello ", false).unwrap();
        write(&ring, b"world", false).unwrap();
        assert_eq!(ring.filled_size(), 11);

        assert_eq!(read(&ring, 8).0, b"hello wo");
        assert_eq!(read(&ring, 8).0, b"rld");
        assert_eq!(ring.free_size(), 64);
    }

    #[test]
    fn test_ring_done_propagates() {
        let ring = RingBuffer::new("ring", 16).unwrap();
        write(&ring, b"end", true).unwrap();
        let (data, done) = read(&ring, 2);
        assert_eq!(data, b"en");
        assert!(!done);
        let (data, done) = read(&ring, 2);
        assert_eq!(data, b"d");
        assert!(done);
        let (data, done) = read(&ring, 2);
        assert!(data.is_empty());
        assert!(done);
    }

    #[test]
    fn test_ring_writer_blocks_when_full() {
        let ring = RingBuffer::new("ring", 4).unwrap();
        let writer_ring = ring.clone();
        let writer = thread::spawn(move || write(&writer_ring, b"abcdefgh", false));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ring.filled_size(), 4);
        let mut collected = Vec::new();
        while collected.len() < 8 {
            collected.extend(read(&ring, 4).0);
        }
        assert!(writer.join().unwrap().is_ok());
        assert_eq!(collected, b"abcdefgh");
    }

    #[test]
    fn test_ring_acquire_reserves_space() {
        let ring = RingBuffer::new("ring", 64).unwrap();
        write(&ring, &[1u8; 40], false).unwrap();

        // 24 bytes free: the writer gets nothing and the ring is untouched.
        assert_eq!(
            ring.acquire_write(40, Wait::from_millis(10)).unwrap_err(),
            IoError::Timeout
        );
        assert_eq!(ring.acquire_write(40, Wait::NoWait).unwrap_err(), IoError::Fail);
        assert_eq!(ring.filled_size(), 40);

        assert_eq!(read(&ring, 64).0, vec![1u8; 40]);
        let mut p = ring.acquire_write(40, Wait::from_millis(10)).unwrap();
        p.as_mut_slice()[..40].copy_from_slice(&[2u8; 40]);
        p.set_valid_size(40).unwrap();
        ring.release_write(p, Wait::NoWait).unwrap();
        assert_eq!(read(&ring, 64).0, vec![2u8; 40]);
    }

    #[test]
    fn test_ring_abort_unblocks_writer() {
        let ring = RingBuffer::new("ring", 4).unwrap();
        write(&ring, b"full", false).unwrap();
        let writer_ring = ring.clone();
        let writer = thread::spawn(move || {
            writer_ring
                .acquire_write(4, Wait::Forever)
                .map(|p| writer_ring.release_write(p, Wait::NoWait))
        });

        thread::sleep(Duration::from_millis(50));
        ring.abort();
        assert_eq!(writer.join().unwrap().unwrap_err(), IoError::Aborted);
    }

    #[test]
    fn test_ring_abort_unblocks_reader() {
        let ring = RingBuffer::new("ring", 4).unwrap();
        let reader_ring = ring.clone();
        let reader = thread::spawn(move || reader_ring.acquire_read(4, Wait::Forever).map(|_| ()));

        thread::sleep(Duration::from_millis(50));
        ring.abort();
        assert_eq!(reader.join().unwrap().unwrap_err(), IoError::Aborted);
    }

    #[test]
    fn test_ring_nowait_empty_fails() {
        let ring = RingBuffer::new("ring", 4).unwrap();
        assert_eq!(
            ring.acquire_read(4, Wait::NoWait).unwrap_err(),
            IoError::Fail
        );
    }
}
