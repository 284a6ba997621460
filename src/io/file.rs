//! File-backed reader and writer.

use super::{Io, IoDirection, strip_scheme};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Reads or writes a file named by a `file://` URI or a plain path.
///
/// The file is opened on [`open`](Io::open) and closed on
/// [`close`](Io::close), so the same instance can be reused after a
/// [`set_uri`](Io::set_uri).
#[derive(Debug)]
pub struct FileIo {
    name: String,
    direction: IoDirection,
    uri: Option<String>,
    file: Option<File>,
    size: Option<u64>,
    pos: u64,
}

impl FileIo {
    fn new(name: impl Into<String>, direction: IoDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            uri: None,
            file: None,
            size: None,
            pos: 0,
        }
    }

    /// Create a file reader.
    pub fn reader(name: impl Into<String>) -> Self {
        Self::new(name, IoDirection::Reader)
    }

    /// Create a file writer. Existing files are truncated on open.
    pub fn writer(name: impl Into<String>) -> Self {
        Self::new(name, IoDirection::Writer)
    }

    fn path(&self) -> Result<PathBuf> {
        let uri = self
            .uri
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument(format!("{}: uri not set", self.name)))?;
        Ok(PathBuf::from(strip_scheme(uri, "file")))
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::InvalidState(format!("{} is not open", self.name)))
    }
}

impl Io for FileIo {
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
        let path = self.path()?;
        let file = match self.direction {
            IoDirection::Reader => File::open(&path)?,
            IoDirection::Writer => File::create(&path)?,
        };
        self.size = match self.direction {
            IoDirection::Reader => Some(file.metadata()?.len()),
            IoDirection::Writer => None,
        };
        self.file = Some(file);
        self.pos = 0;
        tracing::debug!("{}: opened {}", self.name, path.display());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.direction != IoDirection::Reader {
            return Err(Error::NotSupported(format!("{} is a writer", self.name)));
        }
        let n = self.file()?.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.direction != IoDirection::Writer {
            return Err(Error::NotSupported(format!("{} is a reader", self.name)));
        }
        self.file()?.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file()?.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            if self.direction == IoDirection::Writer {
                file.flush()?;
            }
            tracing::debug!("{}: closed at {}", self.name, self.pos);
        }
        self.pos = 0;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        let uri = format!("file://{}", path.display());

        let mut writer = FileIo::writer("fw");
        writer.set_uri(&uri);
        writer.open().unwrap();
        writer.write(b"pcm-bytes").unwrap();
        writer.close().unwrap();

        let mut reader = FileIo::reader("fr");
        reader.set_uri(path.to_str().unwrap());
        reader.open().unwrap();
        assert_eq!(reader.size(), Some(9));
        reader.seek(4).unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"bytes");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_missing_file() {
        let mut reader = FileIo::reader("fr");
        reader.set_uri("/definitely/not/here.raw");
        assert!(matches!(reader.open(), Err(Error::Io(_))));
    }

    #[test]
    fn test_read_before_open() {
        let mut reader = FileIo::reader("fr");
        let mut buf = [0u8; 4];
        assert!(matches!(reader.read(&mut buf), Err(Error::InvalidState(_))));
    }
}
