//! Element runtime context.
//!
//! The context gives an element access to its ports and to the sound
//! format negotiated with its neighbours during pipeline execution.

use super::port::{Port, PortDirection};
use super::traits::SoundInfo;
use crate::error::{Error, Result};
use smallvec::SmallVec;

/// Longest accepted element or object name, exclusive.
pub const MAX_TAG_LEN: usize = 16;

/// Check that `tag` is usable as an element or object name.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::InvalidArgument("tag must not be empty".into()));
    }
    if tag.len() >= MAX_TAG_LEN {
        return Err(Error::InvalidArgument(format!(
            "tag '{}' is {} bytes, limit is {}",
            tag,
            tag.len(),
            MAX_TAG_LEN - 1
        )));
    }
    Ok(())
}

/// Runtime context for an element.
pub struct ElementContext {
    /// Name of this element instance.
    name: String,
    in_port: Option<Port>,
    out_ports: SmallVec<[Port; 2]>,
    sound_info: Option<SoundInfo>,
    report: Option<SoundInfo>,
}

impl ElementContext {
    /// Create a context with no ports.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the name fails [`validate_tag`].
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_tag(&name)?;
        Ok(Self {
            name,
            in_port: None,
            out_ports: SmallVec::new(),
            sound_info: None,
            report: None,
        })
    }

    /// Get the element's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a port on the side its direction says.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] when attaching a second input.
    pub fn attach(&mut self, port: Port) -> Result<()> {
        match port.direction() {
            PortDirection::In => {
                if self.in_port.is_some() {
                    return Err(Error::NotSupported(format!(
                        "{} already has an input port",
                        self.name
                    )));
                }
                self.in_port = Some(port);
            }
            PortDirection::Out => self.out_ports.push(port),
        }
        Ok(())
    }

    /// Replace the input port, returning the previous one.
    pub fn replace_in_port(&mut self, port: Option<Port>) -> Option<Port> {
        std::mem::replace(&mut self.in_port, port)
    }

    /// Replace the first output port, or add one if there is none.
    pub fn replace_first_out_port(&mut self, port: Port) -> Option<Port> {
        if self.out_ports.is_empty() {
            self.out_ports.push(port);
            None
        } else {
            Some(std::mem::replace(&mut self.out_ports[0], port))
        }
    }

    /// The input port.
    pub fn in_port(&self) -> Option<&Port> {
        self.in_port.as_ref()
    }

    /// The input port, mutably.
    pub fn in_port_mut(&mut self) -> Option<&mut Port> {
        self.in_port.as_mut()
    }

    /// Output ports in fan-out order.
    pub fn out_ports(&self) -> &[Port] {
        &self.out_ports
    }

    /// Output ports, mutably.
    pub fn out_ports_mut(&mut self) -> &mut [Port] {
        &mut self.out_ports
    }

    /// The first output port, mutably.
    pub fn out_port_mut(&mut self) -> Option<&mut Port> {
        self.out_ports.first_mut()
    }

    /// Input and output ports borrowed together.
    pub fn ports_mut(&mut self) -> (Option<&mut Port>, &mut [Port]) {
        (self.in_port.as_mut(), &mut self.out_ports)
    }

    /// Every port of this element.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.in_port.iter().chain(self.out_ports.iter())
    }

    /// Every port of this element, mutably.
    pub fn ports_iter_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.in_port.iter_mut().chain(self.out_ports.iter_mut())
    }

    /// Sound format last received from upstream.
    pub fn sound_info(&self) -> Option<SoundInfo> {
        self.sound_info
    }

    /// Record the sound format this element is working with.
    pub fn set_sound_info(&mut self, info: SoundInfo) {
        self.sound_info = Some(info);
    }

    /// Queue `info` for delivery to the next element in the chain.
    pub fn report_info(&mut self, info: SoundInfo) {
        self.report = Some(info);
    }

    pub(crate) fn take_report(&mut self) -> Option<SoundInfo> {
        self.report.take()
    }
}

impl std::fmt::Debug for ElementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementContext")
            .field("name", &self.name)
            .field("in_port", &self.in_port.as_ref().map(|p| p.name()))
            .field("out_ports", &self.out_ports.len())
            .field("sound_info", &self.sound_info)
            .finish()
    }
}
