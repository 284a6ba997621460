//! Ports: an element's connection points.
//!
//! A port puts one acquire/release protocol in front of three kinds of
//! transport:
//!
//! - a [`DataBus`](crate::databus::DataBus) shared with the neighbouring
//!   element (block or byte granularity)
//! - a raw [`Io`](crate::io::Io) at the edge of a pipeline
//! - buffer sharing, where an output port hands out an empty slot so the
//!   caller can swap its own buffer in instead of copying
//!
//! Each side of a port must alternate acquire and release. A second
//! acquire before the release, or a release without an acquire, fails with
//! [`IoError::Fail`].

use crate::clock::Wait;
use crate::databus::{BusKind, BusRef};
use crate::error::{IoError, IoResult};
use crate::io::SharedIo;
use crate::payload::Payload;
use std::fmt;

/// Default buffer size requested by stream ports when the caller passes 0.
pub const DEFAULT_PORT_BUF_SIZE: usize = 4096;

/// Direction of a port relative to its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Receives payloads from upstream.
    In,
    /// Sends payloads downstream.
    Out,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::In => write!(f, "in"),
            PortDirection::Out => write!(f, "out"),
        }
    }
}

/// Port configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Granularity of the data moved through the port.
    pub kind: BusKind,
    /// Wait used by elements that do not pick their own.
    pub wait: Wait,
    /// Whether acquire_out hands out an empty slot for buffer sharing.
    pub share: bool,
    /// Buffer size used by stream ports when `wanted` is 0.
    pub buf_size: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::Block,
            wait: Wait::Forever,
            share: false,
            buf_size: DEFAULT_PORT_BUF_SIZE,
        }
    }
}

impl PortConfig {
    /// Set the granularity.
    pub fn with_kind(mut self, kind: BusKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the default wait.
    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    /// Enable or disable buffer sharing.
    pub fn with_share(mut self, share: bool) -> Self {
        self.share = share;
        self
    }

    /// Set the stream buffer size.
    pub fn with_buf_size(mut self, size: usize) -> Self {
        self.buf_size = size;
        self
    }
}

enum PortBackend {
    Bus(BusRef),
    Stream { io: SharedIo, cache: Option<Payload> },
}

/// A connection point of an element.
pub struct Port {
    name: String,
    direction: PortDirection,
    config: PortConfig,
    backend: PortBackend,
    held: bool,
    aborted: bool,
}

impl Port {
    /// A port over a data bus.
    pub fn bus(name: impl Into<String>, direction: PortDirection, bus: BusRef, config: PortConfig) -> Self {
        let config = PortConfig {
            kind: bus.kind(),
            ..config
        };
        Self {
            name: name.into(),
            direction,
            config,
            backend: PortBackend::Bus(bus),
            held: false,
            aborted: false,
        }
    }

    /// A port reading from or writing to an I/O.
    ///
    /// The I/O must be opened before the first acquire; pipelines do this
    /// in their open job.
    pub fn stream(name: impl Into<String>, direction: PortDirection, io: SharedIo, config: PortConfig) -> Self {
        Self {
            name: name.into(),
            direction,
            config: PortConfig {
                kind: BusKind::Byte,
                share: false,
                ..config
            },
            backend: PortBackend::Stream { io, cache: None },
            held: false,
            aborted: false,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Port configuration.
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Configured wait.
    pub fn wait(&self) -> Wait {
        self.config.wait
    }

    /// Change the configured wait.
    pub fn set_wait(&mut self, wait: Wait) {
        self.config.wait = wait;
    }

    /// Whether acquire_out hands out slots for buffer sharing.
    pub fn is_shared(&self) -> bool {
        self.config.share
    }

    /// Enable or disable buffer sharing on a bus-backed output port.
    pub fn enable_payload_share(&mut self, enable: bool) {
        if matches!(self.backend, PortBackend::Bus(_)) {
            self.config.share = enable;
        }
    }

    /// The underlying bus, if any.
    pub fn bus_ref(&self) -> Option<&BusRef> {
        match &self.backend {
            PortBackend::Bus(bus) => Some(bus),
            PortBackend::Stream { .. } => None,
        }
    }

    /// The underlying I/O, if any.
    pub fn io(&self) -> Option<&SharedIo> {
        match &self.backend {
            PortBackend::Bus(_) => None,
            PortBackend::Stream { io, .. } => Some(io),
        }
    }

    /// Whether a payload is currently acquired and not yet released.
    pub fn is_held(&self) -> bool {
        self.held
    }

    fn begin(&mut self, direction: PortDirection) -> IoResult<()> {
        if self.direction != direction {
            tracing::warn!("{}: wrong side for a {} port", self.name, self.direction);
            return Err(IoError::Fail);
        }
        if self.held {
            tracing::warn!("{}: acquire called twice without release", self.name);
            return Err(IoError::Fail);
        }
        Ok(())
    }

    fn finish(&mut self, direction: PortDirection) -> IoResult<()> {
        if self.direction != direction || !self.held {
            tracing::warn!("{}: release without a matching acquire", self.name);
            return Err(IoError::Fail);
        }
        self.held = false;
        Ok(())
    }

    /// Acquire up to `wanted` bytes of input.
    ///
    /// A zero-length payload with the done flag set means end of stream.
    pub fn acquire_in(&mut self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        self.begin(PortDirection::In)?;
        let buf_size = self.config.buf_size;
        let payload = match &mut self.backend {
            PortBackend::Bus(bus) => bus.acquire_read(wanted, wait)?,
            PortBackend::Stream { io, cache } => {
                if self.aborted {
                    return Err(IoError::Aborted);
                }
                let len = if wanted == 0 { buf_size } else { wanted };
                let mut payload = stream_buffer(cache, len)?;
                let n = {
                    let mut io = io.lock().unwrap();
                    io.read(&mut payload.as_mut_slice()[..len]).map_err(|e| {
                        tracing::error!("{}: read failed: {}", io.name(), e);
                        IoError::Fail
                    })?
                };
                let _ = payload.set_valid_size(n);
                if n == 0 {
                    payload.mark_done();
                }
                payload
            }
        };
        self.held = true;
        Ok(payload)
    }

    /// Return a payload obtained from [`acquire_in`](Self::acquire_in).
    pub fn release_in(&mut self, payload: Payload, wait: Wait) -> IoResult<()> {
        self.finish(PortDirection::In)?;
        match &mut self.backend {
            PortBackend::Bus(bus) => bus.release_read(payload, wait),
            PortBackend::Stream { cache, .. } => {
                *cache = Some(payload);
                Ok(())
            }
        }
    }

    /// Acquire an output payload with room for `wanted` bytes.
    ///
    /// On a sharing port the bus is asked for an empty slot and the caller
    /// is expected to swap its own buffer in.
    pub fn acquire_out(&mut self, wanted: usize, wait: Wait) -> IoResult<Payload> {
        self.begin(PortDirection::Out)?;
        let wanted = if self.config.share { 0 } else { wanted };
        let payload = match &mut self.backend {
            PortBackend::Bus(bus) => bus.acquire_write(wanted, wait)?,
            PortBackend::Stream { cache, .. } => {
                if self.aborted {
                    return Err(IoError::Aborted);
                }
                let mut payload = stream_buffer(cache, wanted.max(1))?;
                let _ = payload.set_valid_size(0);
                payload.clear_done();
                payload
            }
        };
        self.held = true;
        Ok(payload)
    }

    /// Publish a payload obtained from [`acquire_out`](Self::acquire_out).
    pub fn release_out(&mut self, payload: Payload, wait: Wait) -> IoResult<()> {
        self.finish(PortDirection::Out)?;
        match &mut self.backend {
            PortBackend::Bus(bus) => bus.release_write(payload, wait),
            PortBackend::Stream { io, cache } => {
                let result = if payload.valid_size() > 0 {
                    let mut io = io.lock().unwrap();
                    io.write(payload.data()).map(|_| ()).map_err(|e| {
                        tracing::error!("{}: write failed: {}", io.name(), e);
                        IoError::Fail
                    })
                } else {
                    Ok(())
                };
                *cache = Some(payload);
                result
            }
        }
    }

    /// Mark the end of output on a bus-backed port.
    pub fn done(&self) {
        if let PortBackend::Bus(bus) = &self.backend {
            bus.done_write();
        }
    }

    /// Unblock any thread waiting on this port.
    pub fn abort(&mut self) {
        match &self.backend {
            PortBackend::Bus(bus) => bus.abort(),
            PortBackend::Stream { .. } => self.aborted = true,
        }
    }

    /// Return the port to its initial state.
    pub fn reset(&mut self) {
        self.held = false;
        self.aborted = false;
        match &mut self.backend {
            PortBackend::Bus(bus) => bus.reset(),
            PortBackend::Stream { cache, .. } => {
                if let Some(payload) = cache.as_mut() {
                    let _ = payload.set_valid_size(0);
                    payload.clear_done();
                }
            }
        }
    }
}

fn stream_buffer(cache: &mut Option<Payload>, len: usize) -> IoResult<Payload> {
    let mut payload = cache.take().unwrap_or_default();
    if len > payload.buf_length() {
        payload.resize(0, len).map_err(|_| IoError::Fail)?;
    }
    payload.clear_done();
    Ok(payload)
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.backend {
            PortBackend::Bus(bus) => format!("bus:{}", bus.name()),
            PortBackend::Stream { io, .. } => format!("io:{}", io.lock().unwrap().name()),
        };
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("backend", &backend)
            .field("share", &self.config.share)
            .field("held", &self.held)
            .finish()
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            PortBackend::Bus(bus) => write!(f, "{}({} {})", self.name, bus.kind(), bus.name()),
            PortBackend::Stream { io, .. } => {
                let io = io.lock().unwrap();
                write!(f, "{}({} {})", self.name, io.direction(), io.uri().unwrap_or("-"))
            }
        }
    }
}

/// Create a bus-backed output/input port pair over one pointer buffer.
pub fn port_pair(
    name: &str,
    bus: BusRef,
    out_config: PortConfig,
    in_config: PortConfig,
) -> (Port, Port) {
    let out = Port::bus(format!("{}.out", name), PortDirection::Out, bus.clone(), out_config);
    let input = Port::bus(format!("{}.in", name), PortDirection::In, bus, in_config);
    (out, input)
}
