//! Heap-backed aligned allocation.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Default alignment used when a caller passes `0`.
pub const DEFAULT_ALIGN: usize = 4;

/// A zero-initialized heap buffer with a caller-chosen alignment.
///
/// This is the storage behind every [`Payload`](crate::payload::Payload).
/// It owns its allocation exclusively; moving it moves ownership.
///
/// # Example
///
/// ```rust
/// use mediaflow::memory::AlignedBuf;
///
/// let buf = AlignedBuf::new(1024, 64).unwrap();
/// assert_eq!(buf.len(), 1024);
/// assert_eq!(buf.as_ptr() as usize % 64, 0);
/// ```
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
}

// SAFETY: AlignedBuf owns its allocation exclusively, like Box<[u8]>.
unsafe impl Send for AlignedBuf {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocate `len` zeroed bytes aligned to `align`.
    ///
    /// `align == 0` selects [`DEFAULT_ALIGN`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `len` is 0 or `align` is not a power of 2.
    /// - [`Error::OutOfMemory`] if the allocator refuses.
    pub fn new(len: usize, align: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidArgument(
                "size must be greater than 0".into(),
            ));
        }
        let align = if align == 0 { DEFAULT_ALIGN } else { align };
        if !align.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "alignment must be a power of 2, got {}",
                align
            )));
        }
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| Error::OutOfMemory { size: len, align })?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory { size: len, align })?;

        Ok(Self { ptr, len, align })
    }

    /// Take over a boxed slice without copying.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_boxed(data: Box<[u8]>) -> Option<Self> {
        let len = data.len();
        if len == 0 {
            return None;
        }
        let raw = Box::into_raw(data) as *mut u8;
        // SAFETY: Box::into_raw never returns null.
        let ptr = unsafe { NonNull::new_unchecked(raw) };
        Some(Self { ptr, len, align: 1 })
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length buffers cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the buffer was allocated with.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Raw pointer to the first byte.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// View the buffer as a byte slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialized (zeroed) bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as a mutable byte slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and we hold &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: the same layout was used (or implied by Box<[u8]>) at allocation.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len, self.align);
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("align", &self.align)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_buf_creation() {
        let buf = AlignedBuf::new(1024, 16).unwrap();
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.align(), 16);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_aligned_buf_zero_size_fails() {
        assert!(matches!(
            AlignedBuf::new(0, 16),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_aligned_buf_bad_alignment_fails() {
        assert!(matches!(
            AlignedBuf::new(64, 24),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_aligned_buf_honors_alignment() {
        for align in [1usize, 8, 64, 128, 4096] {
            let buf = AlignedBuf::new(100, align).unwrap();
            assert_eq!(buf.as_ptr() as usize % align, 0, "align {}", align);
        }
    }

    #[test]
    fn test_aligned_buf_read_write() {
        let mut buf = AlignedBuf::new(8, 0).unwrap();
        assert_eq!(buf.align(), DEFAULT_ALIGN);
        buf.as_mut_slice()[..3].copy_from_slice(&[1, 2, 3]);
        assert_eq!(&buf.as_slice()[..4], &[1, 2, 3, 0]);
    }

    #[test]
    fn test_from_boxed() {
        let buf = AlignedBuf::from_boxed(vec![7u8; 5].into_boxed_slice()).unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_slice(), &[7; 5]);
        assert!(AlignedBuf::from_boxed(Vec::new().into_boxed_slice()).is_none());
    }
}
