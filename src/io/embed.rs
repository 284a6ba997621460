//! Reader for files embedded in the program image.

use super::{Io, IoDirection};
use crate::error::{Error, Result};
use bytes::Bytes;

/// One embedded file.
#[derive(Debug, Clone)]
pub struct EmbedItem {
    /// File contents.
    pub data: Bytes,
}

impl EmbedItem {
    /// Wrap static data without copying.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            data: Bytes::from_static(data),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Configuration for [`EmbedFlashIo`].
#[derive(Debug, Clone)]
pub struct EmbedFlashConfig {
    /// Instance name.
    pub name: String,
    /// Highest accepted file index.
    pub max_files: usize,
}

impl Default for EmbedFlashConfig {
    fn default() -> Self {
        Self {
            name: "embed_flash".into(),
            max_files: 1000,
        }
    }
}

/// Reads one entry of an embedded file table.
///
/// The URI selects the entry by index: `embed://tone/<index>_<name>.<ext>`.
/// The index is the decimal number between the last `/` and the first `_`.
///
/// # Example
///
/// ```rust
/// use mediaflow::io::{EmbedFlashConfig, EmbedFlashIo, EmbedItem, Io};
///
/// let mut io = EmbedFlashIo::new(EmbedFlashConfig::default());
/// io.set_context(vec![EmbedItem::from_static(b"tone bytes")]);
/// io.set_uri("embed://tone/0_alarm.mp3");
/// io.open().unwrap();
///
/// let mut buf = [0u8; 4];
/// assert_eq!(io.read(&mut buf).unwrap(), 4);
/// assert_eq!(&buf, b"tone");
/// ```
#[derive(Debug)]
pub struct EmbedFlashIo {
    config: EmbedFlashConfig,
    items: Vec<EmbedItem>,
    uri: Option<String>,
    current: Option<usize>,
    pos: u64,
}

impl EmbedFlashIo {
    /// Create a reader with an empty table.
    pub fn new(config: EmbedFlashConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            uri: None,
            current: None,
            pos: 0,
        }
    }

    /// Install the embedded file table.
    pub fn set_context(&mut self, items: Vec<EmbedItem>) {
        self.items = items;
    }

    /// Builder form of [`set_context`](Self::set_context).
    pub fn with_items(mut self, items: Vec<EmbedItem>) -> Self {
        self.items = items;
        self
    }

    fn parse_index(uri: &str) -> Result<usize> {
        let underscore = uri
            .find('_')
            .ok_or_else(|| Error::InvalidArgument(format!("no '_' in embed uri {}", uri)))?;
        let head = &uri[..underscore];
        let slash = head
            .rfind('/')
            .ok_or_else(|| Error::InvalidArgument(format!("no '/' in embed uri {}", uri)))?;
        let digits = &head[slash + 1..];
        digits
            .parse::<usize>()
            .map_err(|_| Error::InvalidArgument(format!("bad file index '{}' in {}", digits, uri)))
    }
}

impl Io for EmbedFlashIo {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn direction(&self) -> IoDirection {
        IoDirection::Reader
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn open(&mut self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::InvalidState(
                "no embedded items, call set_context first".into(),
            ));
        }
        let uri = self
            .uri
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("embed uri not set".into()))?;
        let index = Self::parse_index(uri)?;
        if index > self.config.max_files || index >= self.items.len() {
            return Err(Error::NotFound(format!(
                "embed file index {} out of range ({} items)",
                index,
                self.items.len()
            )));
        }
        tracing::info!("{}: reading item {} from {}", self.config.name, index, uri);
        self.current = Some(index);
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let index = self
            .current
            .ok_or_else(|| Error::InvalidState(format!("{} is not open", self.config.name)))?;
        let data = &self.items[index].data;
        let pos = self.pos as usize;
        let n = buf.len().min(data.len() - pos);
        if n == 0 {
            tracing::debug!("{}: no more data at {}/{}", self.config.name, pos, data.len());
        }
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let size = self.size().unwrap_or(0);
        if pos > size {
            return Err(Error::OutOfRange {
                needed: pos as usize,
                available: size as usize,
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        tracing::info!(
            "{}: closed at {}/{}",
            self.config.name,
            self.pos,
            self.size().unwrap_or(0)
        );
        self.pos = 0;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        self.current.map(|i| self.items[i].size())
    }

    fn position(&self) -> u64 {
        self.pos
    }
}
