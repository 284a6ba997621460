//! Block FIFO: preallocated fixed-size blocks with blocking reads.

use super::pbuf::{PointerBuffer, SlotPolicy};
use super::{BusKind, BusStats, DataBus};
use crate::clock::Wait;
use crate::error::{Error, IoResult, Result};
use crate::payload::Payload;
use std::collections::VecDeque;
use std::fmt;

/// A FIFO of `block_cnt` blocks of `block_size` bytes each.
///
/// Unlike [`PointerBuffer`], all memory is allocated up front and a reader
/// that arrives before the first write waits for data instead of failing,
/// which makes it the bus of choice between two pipelines running on
/// different threads. Sizes are reported in bytes.
#[derive(Clone)]
pub struct BlockFifo {
    slots: PointerBuffer,
    block_size: usize,
    block_cnt: usize,
}

impl BlockFifo {
    /// Create a FIFO and allocate all of its blocks.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if either dimension is 0,
    /// [`Error::OutOfMemory`] if a block cannot be allocated.
    pub fn new(name: impl Into<String>, block_cnt: usize, block_size: usize) -> Result<Self> {
        if block_cnt == 0 || block_size == 0 {
            return Err(Error::InvalidArgument(format!(
                "fifo dimensions must be non-zero, got {}x{}",
                block_cnt, block_size
            )));
        }
        let blocks = (0..block_cnt)
            .map(|_| Payload::with_capacity(block_size))
            .collect::<Result<VecDeque<_>>>()?;
        let slots = PointerBuffer::with_policy(
            name,
            SlotPolicy {
                capacity: block_cnt,
                strict_first_read: false,
            },
            blocks,
        )?;
        Ok(Self {
            slots,
            block_size,
            block_cnt,
        })
    }

    /// Size of one block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.block_cnt
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> BusStats {
        self.slots.stats()
    }
}

impl DataBus for BlockFifo {
    fn name(&self) -> &str {
        self.slots.name()
    }

    fn kind(&self) -> BusKind {
        BusKind::Block
    }

    fn acquire_read(&self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        self.slots.acquire_read(wanted, wait)
    }

    fn release_read(&self, payload: Payload, wait: Wait) -> IoResult<()> {
        self.slots.release_read(payload, wait)
    }

    fn acquire_write(&self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        if wanted > self.block_size {
            tracing::debug!(
                "{}: write of {} exceeds block size {}, growing block",
                self.name(),
                wanted,
                self.block_size
            );
        }
        self.slots.acquire_write(wanted, wait)
    }

    fn release_write(&self, payload: Payload, wait: Wait) -> IoResult<()> {
        self.slots.release_write(payload, wait)
    }

    fn done_write(&self) {
        self.slots.done_write();
    }

    fn abort(&self) {
        self.slots.abort();
    }

    fn reset(&self) {
        self.slots.reset();
    }

    fn free_size(&self) -> usize {
        self.slots.free_slots() * self.block_size
    }

    fn filled_size(&self) -> usize {
        self.slots.filled_bytes()
    }

    fn total_size(&self) -> usize {
        self.block_cnt * self.block_size
    }
}

impl fmt::Debug for BlockFifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFifo")
            .field("name", &self.name())
            .field("block_cnt", &self.block_cnt)
            .field("block_size", &self.block_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_sizes() {
        let fifo = BlockFifo::new("fifo", 4, 256).unwrap();
        assert_eq!(fifo.total_size(), 1024);
        assert_eq!(fifo.free_size(), 1024);
        assert_eq!(fifo.filled_size(), 0);

        let mut p = fifo.acquire_write(100, Wait::NoWait).unwrap();
        assert_eq!(p.buf_length(), 256);
        p.set_valid_size(100).unwrap();
        fifo.release_write(p, Wait::NoWait).unwrap();

        assert_eq!(fifo.free_size(), 768);
        assert_eq!(fifo.filled_size(), 100);
    }

    #[test]
    fn test_fifo_rejects_zero_dimensions() {
        assert!(BlockFifo::new("fifo", 0, 16).is_err());
        assert!(BlockFifo::new("fifo", 2, 0).is_err());
    }

    #[test]
    fn test_fifo_reader_waits_for_first_write() {
        let fifo = BlockFifo::new("fifo", 2, 16).unwrap();
        assert_eq!(
            fifo.acquire_read(16, Wait::from_millis(20)).unwrap_err(),
            IoError::Timeout
        );

        let reader_fifo = fifo.clone();
        let reader = thread::spawn(move || {
            let p = reader_fifo.acquire_read(16, Wait::Forever).unwrap();
            let out = p.data().to_vec();
            reader_fifo.release_read(p, Wait::NoWait).unwrap();
            out
        });

        thread::sleep(Duration::from_millis(50));
        let mut p = fifo.acquire_write(3, Wait::NoWait).unwrap();
        p.as_mut_slice()[..3].copy_from_slice(b"abc");
        p.set_valid_size(3).unwrap();
        fifo.release_write(p, Wait::NoWait).unwrap();

        assert_eq!(reader.join().unwrap(), b"abc");
    }

    #[test]
    fn test_fifo_writer_blocks_until_read() {
        let fifo = BlockFifo::new("fifo", 1, 8).unwrap();
        let p = fifo.acquire_write(8, Wait::NoWait).unwrap();
        fifo.release_write(p, Wait::NoWait).unwrap();

        let writer_fifo = fifo.clone();
        let writer = thread::spawn(move || {
            let p = writer_fifo.acquire_write(8, Wait::from_millis(2000))?;
            writer_fifo.release_write(p, Wait::NoWait)
        });

        thread::sleep(Duration::from_millis(50));
        let p = fifo.acquire_read(8, Wait::NoWait).unwrap();
        fifo.release_read(p, Wait::NoWait).unwrap();

        assert!(writer.join().unwrap().is_ok());
        assert_eq!(fifo.stats().total_written, 2);
    }
}
