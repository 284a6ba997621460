//! Memory management for mediaflow.
//!
//! All payload storage is plain heap memory with an explicit alignment, so
//! codecs that need aligned buffers (DMA, SIMD) get them without a separate
//! pool. See [`AlignedBuf`].

mod heap;

pub use heap::{AlignedBuf, DEFAULT_ALIGN};
