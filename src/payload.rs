//! The unit of data exchanged between pipeline stages.
//!
//! A [`Payload`] is a move-only descriptor: a buffer plus its capacity, the
//! number of valid bytes, an end-of-stream flag and a presentation
//! timestamp. Whoever holds the value owns the bytes. Ports and buses hand
//! payloads out on acquire and take them back on release, so "currently
//! unowned" is simply "not in any variable you can name".
//!
//! # Ownership flag
//!
//! Storage is either *engine-owned* (allocated by [`Payload::with_capacity`])
//! or *adopted* (handed in through [`Payload::with_buffer`] or produced by
//! [`Payload::resize`]). [`Payload::destroy`] drops engine-owned storage and
//! gives adopted storage back to the caller.
//!
//! # Example
//!
//! ```rust
//! use mediaflow::payload::Payload;
//!
//! let mut src = Payload::with_capacity(8).unwrap();
//! src.as_mut_slice()[..3].copy_from_slice(b"abc");
//! src.set_valid_size(3).unwrap();
//! src.mark_done();
//!
//! let mut dst = Payload::with_capacity(4).unwrap();
//! dst.copy_from(&src).unwrap();
//! assert_eq!(dst.data(), b"abc");
//! assert!(dst.is_done());
//! ```

use crate::error::{Error, Result};
use crate::memory::AlignedBuf;
use std::fmt;

/// A buffer descriptor with validity and completion metadata.
#[derive(Default)]
pub struct Payload {
    buf: Option<AlignedBuf>,
    valid_size: usize,
    owned: bool,
    is_done: bool,
    pts: u64,
}

impl Payload {
    /// Create an empty shell with no buffer.
    ///
    /// A shell is the "request" state: buses fill it in on acquire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an engine-owned buffer of `len` zeroed bytes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `len` is 0, [`Error::OutOfMemory`] if
    /// allocation fails.
    pub fn with_capacity(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidArgument(
                "payload capacity must be greater than 0".into(),
            ));
        }
        let buf = AlignedBuf::new(len, 0)?;
        tracing::trace!("new payload with {} bytes", len);
        Ok(Self {
            buf: Some(buf),
            owned: true,
            ..Self::default()
        })
    }

    /// Adopt caller-supplied storage without copying.
    ///
    /// The payload is not engine-owned: [`destroy`](Self::destroy) hands the
    /// storage back. An empty vector yields an empty shell.
    pub fn with_buffer(data: Vec<u8>) -> Self {
        Self {
            buf: AlignedBuf::from_boxed(data.into_boxed_slice()),
            ..Self::default()
        }
    }

    /// Whether a buffer is attached.
    #[inline]
    pub fn has_buffer(&self) -> bool {
        self.buf.is_some()
    }

    /// Total capacity in bytes (0 for a shell).
    #[inline]
    pub fn buf_length(&self) -> usize {
        self.buf.as_ref().map_or(0, AlignedBuf::len)
    }

    /// Alignment of the attached buffer, if any.
    pub fn alignment(&self) -> Option<usize> {
        self.buf.as_ref().map(AlignedBuf::align)
    }

    /// Number of valid bytes.
    #[inline]
    pub fn valid_size(&self) -> usize {
        self.valid_size
    }

    /// Set the number of valid bytes.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `size` exceeds the capacity.
    pub fn set_valid_size(&mut self, size: usize) -> Result<()> {
        let cap = self.buf_length();
        if size > cap {
            return Err(Error::OutOfRange {
                needed: size,
                available: cap,
            });
        }
        self.valid_size = size;
        Ok(())
    }

    /// Whether the storage will be freed by [`destroy`](Self::destroy).
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// End-of-stream flag.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.is_done
    }

    /// Mark this payload as the last one of the stream.
    #[inline]
    pub fn mark_done(&mut self) {
        self.is_done = true;
    }

    /// Clear the end-of-stream flag.
    #[inline]
    pub fn clear_done(&mut self) {
        self.is_done = false;
    }

    /// Presentation timestamp in milliseconds.
    #[inline]
    pub fn pts(&self) -> u64 {
        self.pts
    }

    /// Set the presentation timestamp.
    #[inline]
    pub fn set_pts(&mut self, pts: u64) {
        self.pts = pts;
    }

    /// The valid bytes.
    pub fn data(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf.as_slice()[..self.valid_size],
            None => &[],
        }
    }

    /// The whole buffer, valid or not.
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_ref().map_or(&[], AlignedBuf::as_slice)
    }

    /// The whole buffer, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Copy valid bytes and the completion flag from `src`.
    ///
    /// Capacity is never changed. On error `self` is left untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if either side has no buffer.
    /// - [`Error::OutOfRange`] if `src.valid_size()` exceeds `self.buf_length()`.
    pub fn copy_from(&mut self, src: &Payload) -> Result<()> {
        let (Some(from), Some(to)) = (src.buf.as_ref(), self.buf.as_mut()) else {
            return Err(Error::InvalidArgument(
                "copy requires a buffer on both sides".into(),
            ));
        };
        if src.valid_size > to.len() {
            tracing::error!(
                "payload copy out of range: valid {} > capacity {}",
                src.valid_size,
                to.len()
            );
            return Err(Error::OutOfRange {
                needed: src.valid_size,
                available: to.len(),
            });
        }
        to.as_mut_slice()[..src.valid_size].copy_from_slice(&from.as_slice()[..src.valid_size]);
        self.valid_size = src.valid_size;
        self.is_done = src.is_done;
        Ok(())
    }

    /// Grow the buffer to at least `new_len` bytes aligned to `align`.
    ///
    /// A no-op if the capacity already covers `new_len`. Otherwise the old
    /// buffer is dropped (whoever supplied it) and a fresh one is allocated.
    /// Contents are not preserved and `valid_size` resets to 0.
    ///
    /// The ownership flag is only raised when the payload had no buffer
    /// before; growing an existing buffer keeps the previous flag. On
    /// allocation failure the flag is cleared and the payload is left as a
    /// shell.
    ///
    /// `align == 0` selects the default alignment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero length or a non power-of-two
    /// alignment, [`Error::OutOfMemory`] if allocation fails.
    pub fn resize(&mut self, align: usize, new_len: usize) -> Result<()> {
        if new_len == 0 {
            return Err(Error::InvalidArgument(
                "payload length must be greater than 0".into(),
            ));
        }
        if self.buf_length() >= new_len {
            return Ok(());
        }
        match self.buf.take() {
            Some(old) => {
                tracing::debug!(
                    "dropping payload buffer of {} bytes, owned: {}",
                    old.len(),
                    self.owned
                );
            }
            None => self.owned = true,
        }
        self.valid_size = 0;
        match AlignedBuf::new(new_len, align) {
            Ok(buf) => {
                tracing::debug!("payload resized to {} bytes", new_len);
                self.buf = Some(buf);
                Ok(())
            }
            Err(e) => {
                self.owned = false;
                Err(e)
            }
        }
    }

    /// Destroy a payload.
    ///
    /// Engine-owned storage is freed. Adopted storage is returned to the
    /// caller. `None` is a no-op.
    pub fn destroy(payload: Option<Payload>) -> Option<AlignedBuf> {
        let payload = payload?;
        tracing::trace!(
            "destroying payload, owned: {}, len: {}",
            payload.owned,
            payload.buf_length()
        );
        if payload.owned { None } else { payload.buf }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("buf_length", &self.buf_length())
            .field("valid_size", &self.valid_size)
            .field("owned", &self.owned)
            .field("is_done", &self.is_done)
            .field("pts", &self.pts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(len: usize, byte: u8) -> Payload {
        let mut p = Payload::with_capacity(len).unwrap();
        p.as_mut_slice().fill(byte);
        p.set_valid_size(len).unwrap();
        p
    }

    #[test]
    fn test_new_is_shell() {
        let p = Payload::new();
        assert!(!p.has_buffer());
        assert_eq!(p.buf_length(), 0);
        assert_eq!(p.valid_size(), 0);
        assert!(!p.is_owned());
        assert!(p.data().is_empty());
    }

    #[test]
    fn test_with_capacity() {
        let p = Payload::with_capacity(128).unwrap();
        assert_eq!(p.buf_length(), 128);
        assert!(p.is_owned());
        assert!(matches!(
            Payload::with_capacity(0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_copy_from() {
        let mut src = filled(16, 0xAB);
        src.mark_done();
        src.set_pts(99);
        let mut dst = Payload::with_capacity(32).unwrap();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.valid_size(), 16);
        assert_eq!(dst.buf_length(), 32);
        assert!(dst.is_done());
        assert_eq!(dst.pts(), 0);
        assert!(dst.data().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_copy_out_of_range_leaves_dest_untouched() {
        let src = filled(100, 1);
        let mut dst = filled(50, 7);
        dst.set_valid_size(10).unwrap();

        let err = dst.copy_from(&src).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfRange {
                needed: 100,
                available: 50
            }
        ));
        assert_eq!(dst.valid_size(), 10);
        assert!(!dst.is_done());
        assert!(dst.as_slice().iter().all(|&b| b == 7));
    }

    #[test]
    fn test_copy_requires_buffers() {
        let src = Payload::new();
        let mut dst = Payload::with_capacity(4).unwrap();
        assert!(matches!(
            dst.copy_from(&src),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resize_grows_with_alignment() {
        let mut p = Payload::with_capacity(16).unwrap();
        p.resize(64, 1000).unwrap();
        assert_eq!(p.buf_length(), 1000);
        assert_eq!(p.alignment(), Some(64));
        assert_eq!(p.as_slice().as_ptr() as usize % 64, 0);
    }

    #[test]
    fn test_resize_smaller_is_noop() {
        let mut p = filled(64, 3);
        p.resize(16, 32).unwrap();
        assert_eq!(p.buf_length(), 64);
        assert_eq!(p.valid_size(), 64);
        assert!(p.data().iter().all(|&b| b == 3));
    }

    #[test]
    fn test_resize_ownership_flag() {
        // A shell becomes engine-owned.
        let mut shell = Payload::new();
        shell.resize(0, 32).unwrap();
        assert!(shell.is_owned());

        // Adopted storage stays adopted after growing.
        let mut adopted = Payload::with_buffer(vec![0; 8]);
        assert!(!adopted.is_owned());
        adopted.resize(0, 64).unwrap();
        assert!(!adopted.is_owned());
        assert_eq!(adopted.buf_length(), 64);
    }

    #[test]
    fn test_resize_rejects_bad_arguments() {
        let mut p = Payload::new();
        assert!(matches!(p.resize(0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(p.resize(3, 16), Err(Error::InvalidArgument(_))));
        assert!(!p.is_owned());
        assert!(!p.has_buffer());
    }

    #[test]
    fn test_done_flag() {
        let mut p = Payload::new();
        p.mark_done();
        assert!(p.is_done());
        p.clear_done();
        assert!(!p.is_done());
    }

    #[test]
    fn test_destroy() {
        assert!(Payload::destroy(None).is_none());
        assert!(Payload::destroy(Some(Payload::with_capacity(8).unwrap())).is_none());
        let back = Payload::destroy(Some(Payload::with_buffer(vec![5; 4]))).unwrap();
        assert_eq!(back.as_slice(), &[5; 4]);
    }

    #[test]
    fn test_set_valid_size_bounds() {
        let mut p = Payload::with_capacity(4).unwrap();
        assert!(p.set_valid_size(4).is_ok());
        assert!(matches!(
            p.set_valid_size(5),
            Err(Error::OutOfRange { .. })
        ));
    }
}
