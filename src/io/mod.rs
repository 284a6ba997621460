//! Byte-stream I/O collaborators.
//!
//! Pipelines read from and write to the outside world through [`Io`]
//! implementations addressed by URI strings. The core stores and forwards
//! URIs; each implementation interprets its own scheme.
//!
//! - [`EmbedFlashIo`]: read-only table of files embedded in the binary
//!   (`embed://tone/0_alarm.mp3`)
//! - [`FileIo`]: std file reader or writer (`file:///path` or a plain path)
//! - [`MemoryIo`]: in-memory reader or capture writer

mod embed;
mod file;
mod memory;

pub use embed::{EmbedFlashConfig, EmbedFlashIo, EmbedItem};
pub use file::FileIo;
pub use memory::{MemoryIo, MemorySink};

use crate::error::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which way data flows through an I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoDirection {
    /// Produces data for the pipeline.
    Reader,
    /// Consumes data from the pipeline.
    Writer,
}

impl fmt::Display for IoDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoDirection::Reader => write!(f, "reader"),
            IoDirection::Writer => write!(f, "writer"),
        }
    }
}

/// A URI-addressed byte source or sink.
pub trait Io: Send {
    /// Instance name, for logs.
    fn name(&self) -> &str;

    /// Reader or writer.
    fn direction(&self) -> IoDirection;

    /// Current URI, if set.
    fn uri(&self) -> Option<&str>;

    /// Set the URI used by the next [`open`](Self::open).
    fn set_uri(&mut self, uri: &str);

    /// Resolve the URI and prepare for transfer.
    fn open(&mut self) -> Result<()>;

    /// Read into `buf`, returning the number of bytes read. 0 means end of
    /// stream.
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::NotSupported(format!("{} cannot read", self.name())))
    }

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::NotSupported(format!("{} cannot write", self.name())))
    }

    /// Move the read/write position to `pos`.
    fn seek(&mut self, _pos: u64) -> Result<()> {
        Err(Error::NotSupported(format!("{} cannot seek", self.name())))
    }

    /// Finish the transfer and rewind.
    fn close(&mut self) -> Result<()>;

    /// Total size, if known.
    fn size(&self) -> Option<u64> {
        None
    }

    /// Current position in bytes.
    fn position(&self) -> u64;
}

/// An [`Io`] shared between a pipeline and its ports.
pub type SharedIo = Arc<Mutex<Box<dyn Io>>>;

/// Wrap an I/O for sharing.
pub fn share(io: impl Io + 'static) -> SharedIo {
    Arc::new(Mutex::new(Box::new(io)))
}

/// Strip a `scheme://` prefix, returning the remainder.
pub(crate) fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> &'a str {
    uri.strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix("://"))
        .unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("file:///tmp/a.wav", "file"), "/tmp/a.wav");
        assert_eq!(strip_scheme("/tmp/a.wav", "file"), "/tmp/a.wav");
        assert_eq!(strip_scheme("embed://tone/0_a.mp3", "embed"), "tone/0_a.mp3");
    }

    #[test]
    fn test_share_locks() {
        let io = share(MemoryIo::reader("mem", vec![1, 2, 3]));
        let mut guard = io.lock().unwrap();
        guard.open().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(guard.read(&mut buf).unwrap(), 3);
    }
}
