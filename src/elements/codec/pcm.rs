//! Unsigned 8-bit to signed 16-bit PCM decoder.

use crate::element::{Element, ElementContext, JobStatus, Port, SoundInfo};
use crate::elements::stash;
use crate::error::{IoError, Result};
use crate::payload::Payload;

/// Configuration for [`PcmDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Input bytes requested per cycle.
    pub in_size: usize,
    /// Output bytes requested before the decoder knows what it needs.
    pub out_size: usize,
    /// Sample rate of the input.
    pub sample_rate: u32,
    /// Interleaved input channels.
    pub channels: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            in_size: 1024,
            out_size: 1024,
            sample_rate: 8_000,
            channels: 1,
        }
    }
}

impl DecoderConfig {
    /// Set the input read size.
    pub fn with_in_size(mut self, size: usize) -> Self {
        self.in_size = size;
        self
    }

    /// Set the initial output request.
    pub fn with_out_size(mut self, size: usize) -> Self {
        self.out_size = size;
        self
    }

    /// Set the input format.
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }
}

/// Decodes unsigned 8-bit PCM into signed 16-bit little-endian PCM.
///
/// Output needs twice the input size. When an acquired output region turns
/// out too small, the decoder publishes what fits, requests a region sized
/// for the remainder and carries on, so no decoded bytes are lost. The
/// larger size is remembered for later cycles.
///
/// If the output port times out part-way, the undecoded input is kept and
/// the cycle returns [`JobStatus::Continue`]. It is decoded first on the
/// next cycle.
///
/// The decoded format (16 bit, same rate and channels) is reported to the
/// next element on open and whenever upstream reports a new format.
///
/// The output port must not share buffers: the decoder writes into
/// regions it sizes itself.
#[derive(Debug)]
pub struct PcmDecoder {
    config: DecoderConfig,
    out_hint: usize,
    out_bytes: u64,
    regrows: u64,
    /// Input left undecoded by a timed-out cycle.
    backlog: Option<Payload>,
}

impl PcmDecoder {
    /// Create a decoder.
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            out_hint: config.out_size,
            out_bytes: 0,
            regrows: 0,
            backlog: None,
        }
    }

    /// Bytes produced since open.
    pub fn out_bytes(&self) -> u64 {
        self.out_bytes
    }

    /// Number of times an output region had to be re-requested.
    pub fn regrows(&self) -> u64 {
        self.regrows
    }

    fn out_info(&self) -> SoundInfo {
        SoundInfo::new(self.config.sample_rate, 16, self.config.channels)
    }

    /// Presentation time of the next output byte, in milliseconds.
    fn next_pts(&self) -> u64 {
        self.out_info().bytes_to_ms(self.out_bytes)
    }

    /// Decode all of `src` into `out`, returning the output size.
    ///
    /// On error returns how many input bytes were decoded and published
    /// before the failure.
    fn decode(
        &mut self,
        name: &str,
        src: &[u8],
        done: bool,
        out: &mut Port,
    ) -> std::result::Result<usize, (usize, IoError)> {
        let wait = out.wait();
        let mut consumed = 0;
        let mut want = self.out_hint.max(2);
        let mut starved = false;

        loop {
            let mut region = out.acquire_out(want, wait).map_err(|e| (consumed, e))?;
            let samples = (region.buf_length() / 2).min(src.len() - consumed);
            widen(
                &src[consumed..consumed + samples],
                &mut region.as_mut_slice()[..samples * 2],
            );
            let _ = region.set_valid_size(samples * 2);
            region.set_pts(self.next_pts());
            consumed += samples;
            if consumed == src.len() && done {
                region.mark_done();
            }
            out.release_out(region, wait).map_err(|e| (consumed - samples, e))?;
            self.out_bytes += (samples * 2) as u64;

            if consumed == src.len() {
                return Ok(src.len() * 2);
            }
            if samples == 0 {
                if starved {
                    tracing::error!("{}: output port hands out no space", name);
                    return Err((consumed, IoError::Fail));
                }
                starved = true;
            }
            want = (src.len() - consumed) * 2;
            self.out_hint = self.out_hint.max(src.len() * 2);
            self.regrows += 1;
            tracing::debug!(
                "{}: output region too small, requesting {} bytes for the rest",
                name,
                want
            );
        }
    }

    /// Decode `src`, keeping what is left of it if the output times out.
    fn decode_or_stash(
        &mut self,
        name: &str,
        src: &[u8],
        done: bool,
        pts: u64,
        out: &mut Port,
    ) -> JobStatus {
        match self.decode(name, src, done, out) {
            Ok(_) if done => JobStatus::Done,
            Ok(0) => JobStatus::Ok,
            Ok(n) => JobStatus::Produced(n),
            Err((consumed, IoError::Timeout)) => {
                tracing::debug!(
                    "{}: output timed out, keeping {} input bytes",
                    name,
                    src.len() - consumed
                );
                self.backlog = Some(stash(&src[consumed..], done, pts));
                JobStatus::Continue
            }
            Err((_, e)) => {
                tracing::debug!("{}: decode cycle failed: {}", name, e);
                e.into()
            }
        }
    }
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

/// Widen unsigned 8-bit samples into signed 16-bit little-endian samples.
fn widen(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(2)) {
        let v = ((*s as i16) - 128) << 8;
        d.copy_from_slice(&v.to_le_bytes());
    }
}

impl Element for PcmDecoder {
    fn open(&mut self, ctx: &mut ElementContext) -> JobStatus {
        if ctx.in_port().is_none() || ctx.out_ports().is_empty() {
            tracing::error!("{}: needs an input and an output port", ctx.name());
            return JobStatus::Fail;
        }
        if self.config.in_size == 0 {
            tracing::error!("{}: input size must be greater than 0", ctx.name());
            return JobStatus::Fail;
        }
        if ctx.out_ports().first().is_some_and(|p| p.is_shared()) {
            tracing::error!("{}: output port must not share buffers", ctx.name());
            return JobStatus::Fail;
        }
        self.out_hint = self.config.out_size;
        self.out_bytes = 0;
        self.regrows = 0;
        self.backlog = None;
        ctx.report_info(self.out_info());
        JobStatus::Ok
    }

    fn process(&mut self, ctx: &mut ElementContext) -> JobStatus {
        let name = ctx.name().to_string();
        let (Some(input), outs) = ctx.ports_mut() else {
            return JobStatus::Fail;
        };
        let Some(out) = outs.first_mut() else {
            return JobStatus::Fail;
        };

        if let Some(backlog) = self.backlog.take() {
            return self.decode_or_stash(
                &name,
                backlog.data(),
                backlog.is_done(),
                backlog.pts(),
                out,
            );
        }

        let wait = input.wait();
        let payload = match input.acquire_in(self.config.in_size, wait) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let status =
            self.decode_or_stash(&name, payload.data(), payload.is_done(), payload.pts(), out);
        if let Err(e) = input.release_in(payload, wait) {
            self.backlog = None;
            tracing::debug!("{}: input release failed: {}", name, e);
            return e.into();
        }
        status
    }

    fn close(&mut self, ctx: &mut ElementContext) -> Result<()> {
        tracing::debug!(
            "{}: decoded {} bytes, {} regrows",
            ctx.name(),
            self.out_bytes,
            self.regrows
        );
        self.out_bytes = 0;
        self.backlog = None;
        Ok(())
    }

    fn on_sound_info(&mut self, ctx: &mut ElementContext, info: SoundInfo) {
        if info.bits != 8 {
            tracing::warn!("{}: expected 8-bit input, got {}", ctx.name(), info);
        }
        self.config.sample_rate = info.sample_rate;
        self.config.channels = info.channels;
        ctx.report_info(self.out_info());
    }

    fn kind(&self) -> &'static str {
        "pcm_decoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Wait;
    use crate::databus::{BusRef, DataBus, PointerBuffer};
    use crate::element::{PortConfig, port_pair};
    use std::sync::Arc;

    fn setup(config: DecoderConfig) -> (PcmDecoder, ElementContext, Port, Port) {
        let in_bus: BusRef = Arc::new(PointerBuffer::new("in", 2).unwrap());
        let out_bus: BusRef = Arc::new(PointerBuffer::new("out", 4).unwrap());
        let cfg = PortConfig::default().with_wait(Wait::NoWait);
        let (feed, dec_in) = port_pair("in", in_bus, cfg, cfg);
        let (dec_out, rx) = port_pair("out", out_bus, cfg, cfg);
        let mut ctx = ElementContext::new("dec").unwrap();
        ctx.attach(dec_in).unwrap();
        ctx.attach(dec_out).unwrap();
        (PcmDecoder::new(config), ctx, feed, rx)
    }

    fn push(feed: &mut Port, data: &[u8], done: bool) {
        let mut p = feed.acquire_out(data.len().max(1), Wait::NoWait).unwrap();
        p.as_mut_slice()[..data.len()].copy_from_slice(data);
        p.set_valid_size(data.len()).unwrap();
        if done {
            p.mark_done();
        }
        feed.release_out(p, Wait::NoWait).unwrap();
    }

    fn drain(rx: &mut Port) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        let mut done = false;
        while let Ok(p) = rx.acquire_in(0, Wait::NoWait) {
            out.extend_from_slice(p.data());
            done |= p.is_done();
            rx.release_in(p, Wait::NoWait).unwrap();
        }
        (out, done)
    }

    #[test]
    fn test_widen() {
        let mut out = [0u8; 6];
        widen(&[128, 255, 0], &mut out);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 0);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 127 << 8);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), -32768);
    }

    #[test]
    fn test_decoder_reports_format_on_open() {
        let (mut dec, mut ctx, _, _) = setup(DecoderConfig::default().with_format(16_000, 2));
        assert_eq!(dec.open(&mut ctx), JobStatus::Ok);
        let info = ctx.take_report().unwrap();
        assert_eq!(info, SoundInfo::new(16_000, 16, 2));
    }

    #[test]
    fn test_decoder_regrows_without_losing_bytes() {
        let (mut dec, mut ctx, mut feed, mut rx) =
            setup(DecoderConfig::default().with_out_size(4));
        assert_eq!(dec.open(&mut ctx), JobStatus::Ok);

        push(&mut feed, &[128, 129, 130, 131, 132], true);
        assert_eq!(dec.process(&mut ctx), JobStatus::Done);
        assert_eq!(dec.regrows(), 1);

        let (out, done) = drain(&mut rx);
        assert!(done);
        assert_eq!(out.len(), 10);
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![0, 256, 512, 768, 1024]);
    }

    #[test]
    fn test_decoder_output_timeout_keeps_input() {
        let in_bus: BusRef = Arc::new(PointerBuffer::new("in", 2).unwrap());
        let out_bus: BusRef = Arc::new(PointerBuffer::new("out", 1).unwrap());
        let fast = PortConfig::default().with_wait(Wait::NoWait);
        let slow = PortConfig::default().with_wait(Wait::from_millis(20));
        let (mut feed, dec_in) = port_pair("in", in_bus.clone(), fast, fast);
        let (dec_out, mut rx) = port_pair("out", out_bus, slow, fast);
        let mut ctx = ElementContext::new("dec").unwrap();
        ctx.attach(dec_in).unwrap();
        ctx.attach(dec_out).unwrap();
        let mut dec = PcmDecoder::new(DecoderConfig::default().with_out_size(4));
        assert_eq!(dec.open(&mut ctx), JobStatus::Ok);

        // The first region holds two samples; the one slot is then full.
        push(&mut feed, &[128, 129, 130, 131, 132], true);
        assert_eq!(dec.process(&mut ctx), JobStatus::Continue);
        assert_eq!(in_bus.filled_size(), 0);
        let (first, done) = drain(&mut rx);
        assert_eq!(first.len(), 4);
        assert!(!done);

        assert_eq!(dec.process(&mut ctx), JobStatus::Done);
        let (rest, done) = drain(&mut rx);
        assert_eq!(rest.len(), 6);
        assert!(done);
        let samples: Vec<i16> = first
            .iter()
            .chain(&rest)
            .copied()
            .collect::<Vec<u8>>()
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![0, 256, 512, 768, 1024]);
    }

    #[test]
    fn test_decoder_rejects_shared_output() {
        let in_bus: BusRef = Arc::new(PointerBuffer::new("in", 2).unwrap());
        let out_bus: BusRef = Arc::new(PointerBuffer::new("out", 2).unwrap());
        let (_, dec_in) = port_pair("in", in_bus, PortConfig::default(), PortConfig::default());
        let (dec_out, _) = port_pair(
            "out",
            out_bus,
            PortConfig::default().with_share(true),
            PortConfig::default(),
        );
        let mut ctx = ElementContext::new("dec").unwrap();
        ctx.attach(dec_in).unwrap();
        ctx.attach(dec_out).unwrap();
        let mut dec = PcmDecoder::default();
        assert_eq!(dec.open(&mut ctx), JobStatus::Fail);
    }

    #[test]
    fn test_decoder_pts_advances() {
        let (mut dec, mut ctx, mut feed, mut rx) =
            setup(DecoderConfig::default().with_format(1_000, 1));
        assert_eq!(dec.open(&mut ctx), JobStatus::Ok);

        push(&mut feed, &[128; 100], false);
        assert_eq!(dec.process(&mut ctx), JobStatus::Produced(200));
        push(&mut feed, &[128; 100], false);
        assert_eq!(dec.process(&mut ctx), JobStatus::Produced(200));

        let first = rx.acquire_in(0, Wait::NoWait).unwrap();
        assert_eq!(first.pts(), 0);
        rx.release_in(first, Wait::NoWait).unwrap();
        let second = rx.acquire_in(0, Wait::NoWait).unwrap();
        // 200 bytes of 16-bit mono at 1 kHz is 100 ms.
        assert_eq!(second.pts(), 100);
        rx.release_in(second, Wait::NoWait).unwrap();
    }

    #[test]
    fn test_decoder_end_of_stream_only() {
        let (mut dec, mut ctx, feed, mut rx) = setup(DecoderConfig::default());
        assert_eq!(dec.open(&mut ctx), JobStatus::Ok);
        feed.done();
        assert_eq!(dec.process(&mut ctx), JobStatus::Done);
        let (out, done) = drain(&mut rx);
        assert!(out.is_empty());
        assert!(done);
    }
}
