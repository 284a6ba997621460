//! Built-in pipeline elements.
//!
//! ## Routing
//! - [`Copier`]: duplicates one input to every output port (1-to-N fan-out)
//!
//! ## Codecs
//! - [`PcmDecoder`]: widens unsigned 8-bit PCM to signed 16-bit
//!
//! ## Transforms
//! - [`Fade`]: linear fade-in / fade-out over 16-bit PCM

mod codec;
mod flow;
mod transform;

pub use codec::{DecoderConfig, PcmDecoder};
pub use flow::{Copier, CopierConfig};
pub use transform::{Fade, FadeConfig, FadeMode};

use crate::clock::Wait;
use crate::element::Port;
use crate::error::{IoError, IoResult};
use crate::payload::Payload;

/// Publish a copy of `src` on `out`.
///
/// A source without data (an end-of-stream marker) is forwarded as an empty
/// payload carrying the done flag.
pub(crate) fn copy_to(out: &mut Port, src: &Payload, wait: Wait) -> IoResult<()> {
    let mut dst = out.acquire_out(src.buf_length(), wait)?;
    let copied = if src.valid_size() == 0 || !src.has_buffer() {
        let _ = dst.set_valid_size(0);
        if src.is_done() {
            dst.mark_done();
        } else {
            dst.clear_done();
        }
        Ok(())
    } else {
        dst.copy_from(src).map_err(|e| {
            tracing::error!("{}: copy failed: {}", out.name(), e);
            IoError::Fail
        })
    };
    dst.set_pts(src.pts());
    let released = out.release_out(dst, wait);
    copied.and(released)
}

/// An owned copy of `data` to publish on a later cycle.
///
/// Elements keep output here when an output port times out, so they can
/// hand their input back and retry without losing bytes.
pub(crate) fn stash(data: &[u8], done: bool, pts: u64) -> Payload {
    let mut payload = Payload::with_buffer(data.to_vec());
    let _ = payload.set_valid_size(data.len());
    if done {
        payload.mark_done();
    }
    payload.set_pts(pts);
    payload
}

/// Publish `src` on `out`, swapping buffers when the port shares.
///
/// After a swap `src` holds the port's empty slot, which the caller returns
/// through its input release as usual.
pub(crate) fn forward(out: &mut Port, src: &mut Payload, wait: Wait) -> IoResult<()> {
    if !out.is_shared() {
        return copy_to(out, src, wait);
    }
    let mut dst = out.acquire_out(0, wait)?;
    std::mem::swap(&mut dst, src);
    out.release_out(dst, wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::databus::{BusRef, PointerBuffer};
    use crate::element::{PortConfig, port_pair};
    use std::sync::Arc;

    #[test]
    fn test_forward_shares_buffer() {
        let bus: BusRef = Arc::new(PointerBuffer::new("pb", 2).unwrap());
        let (mut out, mut input) = port_pair(
            "share",
            bus,
            PortConfig::default().with_share(true),
            PortConfig::default(),
        );

        let mut src = Payload::with_buffer(b"abcd".to_vec());
        src.set_valid_size(4).unwrap();
        let addr = src.data().as_ptr();
        forward(&mut out, &mut src, Wait::NoWait).unwrap();
        assert!(!src.has_buffer());

        let p = input.acquire_in(0, Wait::NoWait).unwrap();
        assert_eq!(p.data().as_ptr(), addr);
        assert_eq!(p.data(), b"abcd");
        input.release_in(p, Wait::NoWait).unwrap();
    }

    #[test]
    fn test_copy_to_forwards_end_of_stream() {
        let bus: BusRef = Arc::new(PointerBuffer::new("pb", 2).unwrap());
        let (mut out, mut input) =
            port_pair("eos", bus, PortConfig::default(), PortConfig::default());

        let mut eos = Payload::new();
        eos.mark_done();
        copy_to(&mut out, &eos, Wait::NoWait).unwrap();

        let p = input.acquire_in(0, Wait::NoWait).unwrap();
        assert!(p.is_done());
        assert_eq!(p.valid_size(), 0);
        input.release_in(p, Wait::NoWait).unwrap();
    }
}
