//! In-memory reader and capture writer.

use super::{Io, IoDirection};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::sync::{Arc, Mutex};

/// Handle to the bytes captured by a [`MemoryIo`] writer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Copy of everything written so far.
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads from a byte buffer or captures writes into one.
#[derive(Debug)]
pub struct MemoryIo {
    name: String,
    direction: IoDirection,
    uri: Option<String>,
    source: Bytes,
    sink: MemorySink,
    pos: u64,
}

impl MemoryIo {
    /// A reader over `data`.
    pub fn reader(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            direction: IoDirection::Reader,
            uri: None,
            source: data.into(),
            sink: MemorySink::default(),
            pos: 0,
        }
    }

    /// A writer; inspect the captured bytes through [`sink`](Self::sink).
    pub fn writer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: IoDirection::Writer,
            uri: None,
            source: Bytes::new(),
            sink: MemorySink::default(),
            pos: 0,
        }
    }

    /// Shared handle to the captured bytes.
    pub fn sink(&self) -> MemorySink {
        self.sink.clone()
    }
}

impl Io for MemoryIo {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> IoDirection {
        self.direction
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        if self.direction == IoDirection::Writer {
            self.sink.data.lock().unwrap().clear();
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.direction != IoDirection::Reader {
            return Err(Error::NotSupported(format!("{} is a writer", self.name)));
        }
        let pos = self.pos as usize;
        let n = buf.len().min(self.source.len() - pos);
        buf[..n].copy_from_slice(&self.source[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.direction != IoDirection::Writer {
            return Err(Error::NotSupported(format!("{} is a reader", self.name)));
        }
        self.sink.data.lock().unwrap().extend_from_slice(data);
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if self.direction != IoDirection::Reader || pos > self.source.len() as u64 {
            return Err(Error::OutOfRange {
                needed: pos as usize,
                available: self.source.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        match self.direction {
            IoDirection::Reader => Some(self.source.len() as u64),
            IoDirection::Writer => None,
        }
    }

    fn position(&self) -> u64 {
        self.pos
    }
}
