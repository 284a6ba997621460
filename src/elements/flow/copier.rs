//! Copier element - duplicates one input to every output port.

use crate::element::{Element, ElementContext, JobStatus};
use crate::element::Port;
use crate::elements::{copy_to, forward, stash};
use crate::payload::Payload;
use crate::error::{IoError, Result};

/// Configuration for [`Copier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopierConfig {
    /// Bytes requested from the input per cycle (0 lets the port decide).
    pub read_size: usize,
    /// Output ports expected at open; 0 accepts any number.
    pub copies: usize,
}

impl CopierConfig {
    /// Set the read size.
    pub fn with_read_size(mut self, size: usize) -> Self {
        self.read_size = size;
        self
    }

    /// Set the expected number of outputs.
    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }
}

/// An element that serves one input to N output ports.
///
/// Each cycle acquires one input payload and serves the outputs. Every
/// output after the first gets a copy. The first output shares the input
/// buffer when its port enables sharing and gets a copy otherwise. The
/// input is released once, after all outputs are served, on every path.
///
/// When an output times out, the copier keeps its own copy of the payload
/// and returns [`JobStatus::Continue`]. The next cycle serves the outputs
/// still missing it before reading new input.
///
/// # Example
///
/// ```rust
/// use mediaflow::elements::{Copier, CopierConfig};
///
/// let copier = Copier::new(CopierConfig::default().with_copies(2));
/// assert_eq!(copier.count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Copier {
    config: CopierConfig,
    /// Number of input payloads served.
    count: u64,
    /// Total input bytes served.
    bytes: u64,
    backlog: Option<Backlog>,
}

/// A payload some outputs have not received yet.
#[derive(Debug)]
struct Backlog {
    payload: Payload,
    /// Serving steps already completed.
    served: usize,
}

/// Serve `payload` to `outs` from step `from` on.
///
/// Outputs 1..n are served before output 0, which may take the buffer
/// itself when `share` is set. On error returns the step that failed.
fn serve(
    outs: &mut [Port],
    payload: &mut Payload,
    from: usize,
    share: bool,
) -> std::result::Result<(), (usize, IoError)> {
    let n = outs.len();
    for step in from..n {
        let idx = if step + 1 < n { step + 1 } else { 0 };
        let out = &mut outs[idx];
        let wait = out.wait();
        let result = if idx == 0 && share {
            forward(out, payload, wait)
        } else {
            copy_to(out, payload, wait)
        };
        result.map_err(|e| (step, e))?;
    }
    Ok(())
}

impl Copier {
    /// Create a copier.
    pub fn new(config: CopierConfig) -> Self {
        Self {
            config,
            count: 0,
            bytes: 0,
            backlog: None,
        }
    }

    /// Get the number of payloads that have passed through.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the total bytes that have passed through.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn account(&mut self, done: bool, valid: usize) -> JobStatus {
        self.count += 1;
        self.bytes += valid as u64;
        if done {
            JobStatus::Done
        } else if valid == 0 {
            JobStatus::Ok
        } else {
            JobStatus::Produced(valid)
        }
    }
}

impl Element for Copier {
    fn open(&mut self, ctx: &mut ElementContext) -> JobStatus {
        let outs = ctx.out_ports().len();
        if ctx.in_port().is_none() || outs == 0 {
            tracing::error!("{}: needs one input and at least one output", ctx.name());
            return JobStatus::Fail;
        }
        if self.config.copies != 0 && self.config.copies != outs {
            tracing::error!(
                "{}: configured for {} outputs, {} attached",
                ctx.name(),
                self.config.copies,
                outs
            );
            return JobStatus::Fail;
        }
        self.backlog = None;
        tracing::debug!("{}: copying to {} outputs", ctx.name(), outs);
        JobStatus::Ok
    }

    fn process(&mut self, ctx: &mut ElementContext) -> JobStatus {
        let name = ctx.name().to_string();
        let (Some(input), outs) = ctx.ports_mut() else {
            return JobStatus::Fail;
        };

        if let Some(mut backlog) = self.backlog.take() {
            return match serve(outs, &mut backlog.payload, backlog.served, false) {
                Ok(()) => {
                    let done = backlog.payload.is_done();
                    let valid = backlog.payload.valid_size();
                    self.account(done, valid)
                }
                Err((step, IoError::Timeout)) => {
                    backlog.served = step;
                    self.backlog = Some(backlog);
                    JobStatus::Continue
                }
                Err((_, e)) => {
                    tracing::debug!("{}: output failed: {}", name, e);
                    e.into()
                }
            };
        }

        let wait = input.wait();
        let mut payload = match input.acquire_in(self.config.read_size, wait) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("{}: input acquire failed: {}", name, e);
                return e.into();
            }
        };
        let done = payload.is_done();
        let valid = payload.valid_size();

        let served = serve(outs, &mut payload, 0, true);
        if let Err((step, IoError::Timeout)) = served {
            tracing::debug!("{}: output {} timed out, keeping a copy", name, step);
            self.backlog = Some(Backlog {
                payload: stash(payload.data(), done, payload.pts()),
                served: step,
            });
        }

        let released = input.release_in(payload, wait);
        if let Err(e) = released {
            self.backlog = None;
            tracing::debug!("{}: input release failed: {}", name, e);
            return e.into();
        }
        match served {
            Ok(()) => self.account(done, valid),
            Err((_, e)) => {
                tracing::debug!("{}: output failed: {}", name, e);
                e.into()
            }
        }
    }

    fn close(&mut self, ctx: &mut ElementContext) -> Result<()> {
        tracing::debug!(
            "{}: closed after {} payloads, {} bytes",
            ctx.name(),
            self.count,
            self.bytes
        );
        self.count = 0;
        self.bytes = 0;
        self.backlog = None;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "copier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Wait;
    use crate::databus::{BusRef, DataBus, PointerBuffer};
    use crate::element::{Port, PortConfig, port_pair};
    use std::sync::Arc;

    fn link(name: &str, share: bool) -> (Port, Port, Arc<PointerBuffer>) {
        let pbuf = Arc::new(PointerBuffer::new(name, 2).unwrap());
        let bus: BusRef = pbuf.clone();
        let (out, input) = port_pair(
            name,
            bus,
            PortConfig::default().with_share(share).with_wait(Wait::NoWait),
            PortConfig::default().with_wait(Wait::NoWait),
        );
        (out, input, pbuf)
    }

    #[test]
    fn test_copier_open_requires_ports() {
        let mut copier = Copier::new(CopierConfig::default());
        let mut ctx = ElementContext::new("copier").unwrap();
        assert_eq!(copier.open(&mut ctx), JobStatus::Fail);
    }

    #[test]
    fn test_copier_copy_count_mismatch() {
        let (_, src_in, _) = link("src", false);
        let (out_a, _, _) = link("a", false);
        let mut ctx = ElementContext::new("copier").unwrap();
        ctx.attach(src_in).unwrap();
        ctx.attach(out_a).unwrap();
        let mut copier = Copier::new(CopierConfig::default().with_copies(2));
        assert_eq!(copier.open(&mut ctx), JobStatus::Fail);
    }

    #[test]
    fn test_copier_fan_out_with_share() {
        let (mut feed, src_in, src_bus) = link("src", false);
        let (out_a, mut rx_a, _) = link("a", true);
        let (out_b, mut rx_b, _) = link("b", false);

        let mut ctx = ElementContext::new("copier").unwrap();
        ctx.attach(src_in).unwrap();
        ctx.attach(out_a).unwrap();
        ctx.attach(out_b).unwrap();
        let mut copier = Copier::new(CopierConfig::default());
        assert_eq!(copier.open(&mut ctx), JobStatus::Ok);

        let mut p = feed.acquire_out(16, Wait::NoWait).unwrap();
        p.as_mut_slice()[..5].copy_from_slice(b"audio");
        p.set_valid_size(5).unwrap();
        feed.release_out(p, Wait::NoWait).unwrap();

        assert_eq!(copier.process(&mut ctx), JobStatus::Produced(5));
        assert_eq!(src_bus.filled_size(), 0);

        for rx in [&mut rx_a, &mut rx_b] {
            let p = rx.acquire_in(0, Wait::NoWait).unwrap();
            assert_eq!(p.data(), b"audio");
            assert!(!p.is_done());
            rx.release_in(p, Wait::NoWait).unwrap();
        }
        assert_eq!(copier.count(), 1);
        assert_eq!(copier.bytes(), 5);
    }

    #[test]
    fn test_copier_output_failure_releases_input() {
        let (mut feed, src_in, src_bus) = link("src", false);
        let (mut out_a, _rx_a, _) = link("a", false);

        // Hold the only writer side so the copier's acquire fails.
        let held = out_a.acquire_out(4, Wait::NoWait).unwrap();
        let mut ctx = ElementContext::new("copier").unwrap();
        ctx.attach(src_in).unwrap();
        ctx.attach(out_a).unwrap();

        let mut p = feed.acquire_out(4, Wait::NoWait).unwrap();
        p.set_valid_size(4).unwrap();
        feed.release_out(p, Wait::NoWait).unwrap();

        let mut copier = Copier::new(CopierConfig::default());
        assert_eq!(copier.process(&mut ctx), JobStatus::Fail);
        // The input went back to the bus: a new read is possible again.
        assert_eq!(src_bus.filled_size(), 0);
        assert!(ctx.in_port_mut().unwrap().acquire_in(0, Wait::NoWait).is_err());
        drop(held);
    }
}
