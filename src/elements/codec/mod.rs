//! Decoder elements.

mod pcm;

pub use pcm::{DecoderConfig, PcmDecoder};
