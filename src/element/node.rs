//! An element instance together with its context and lifecycle state.

use super::context::ElementContext;
use super::traits::{Element, ElementState, JobStatus, SoundInfo};
use crate::error::Result;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Shared handle to an element node.
///
/// The pipeline keeps one for graph access; the executor's jobs keep
/// another for the worker thread.
pub type ElementRef = Arc<Mutex<ElementNode>>;

/// An element boxed with its context.
///
/// The node enforces the job contract around the element: `close` runs only
/// after `open` was attempted, and `close` errors are logged, not returned.
pub struct ElementNode {
    element: Box<dyn Element>,
    ctx: ElementContext,
    state: ElementState,
    open_attempted: bool,
}

impl ElementNode {
    /// Wrap `element` under `name`.
    pub fn new(name: impl Into<String>, element: impl Element + 'static) -> Result<Self> {
        Self::from_boxed(name, Box::new(element))
    }

    /// Wrap an already boxed element.
    pub fn from_boxed(name: impl Into<String>, element: Box<dyn Element>) -> Result<Self> {
        Ok(Self {
            element,
            ctx: ElementContext::new(name)?,
            state: ElementState::Idle,
            open_attempted: false,
        })
    }

    /// Element name.
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Element type name.
    pub fn kind(&self) -> &'static str {
        self.element.kind()
    }

    /// Lifecycle state.
    pub fn state(&self) -> ElementState {
        self.state
    }

    /// The element's context.
    pub fn ctx(&self) -> &ElementContext {
        &self.ctx
    }

    /// The element's context, mutably.
    pub fn ctx_mut(&mut self) -> &mut ElementContext {
        &mut self.ctx
    }

    /// Run the element's `open`.
    pub fn open(&mut self) -> JobStatus {
        self.open_attempted = true;
        let status = self.element.open(&mut self.ctx);
        match status {
            JobStatus::Fail => tracing::error!("{}: open failed", self.name()),
            _ => {
                self.state = ElementState::Opened;
                tracing::debug!("{}: opened ({})", self.name(), status);
            }
        }
        status
    }

    /// Run the element's `process`.
    pub fn process(&mut self) -> JobStatus {
        self.state = ElementState::Running;
        let status = self.element.process(&mut self.ctx);
        match status {
            JobStatus::Fail => tracing::error!("{}: process failed", self.name()),
            JobStatus::Done => tracing::debug!("{}: reached end of stream", self.name()),
            _ => tracing::trace!("{}: {}", self.name(), status),
        }
        status
    }

    /// Run the element's `close` if `open` was attempted.
    pub fn close(&mut self) {
        if !self.open_attempted {
            return;
        }
        self.open_attempted = false;
        if let Err(e) = self.element.close(&mut self.ctx) {
            tracing::warn!("{}: close failed: {}", self.name(), e);
        }
        self.state = ElementState::Closed;
        tracing::debug!("{}: closed", self.name());
    }

    /// Hand sound info from upstream to the element.
    pub fn deliver_sound_info(&mut self, info: SoundInfo) {
        self.ctx.set_sound_info(info);
        self.element.on_sound_info(&mut self.ctx, info);
    }

    /// Sound info the element queued for its downstream neighbour.
    pub fn take_report(&mut self) -> Option<SoundInfo> {
        self.ctx.take_report()
    }

    /// Return to `Idle` and reset every port.
    pub fn reset(&mut self) {
        self.state = ElementState::Idle;
        for port in self.ctx.ports_iter_mut() {
            port.reset();
        }
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> ElementRef {
        Arc::new(Mutex::new(self))
    }
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementNode")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct Tracker {
        fail_open: bool,
        fail_close: bool,
        closes: usize,
        info: Option<SoundInfo>,
    }

    impl Element for Tracker {
        fn open(&mut self, _ctx: &mut ElementContext) -> JobStatus {
            if self.fail_open {
                JobStatus::Fail
            } else {
                JobStatus::Ok
            }
        }

        fn process(&mut self, ctx: &mut ElementContext) -> JobStatus {
            ctx.report_info(SoundInfo::new(8_000, 16, 1));
            JobStatus::Done
        }

        fn close(&mut self, _ctx: &mut ElementContext) -> Result<()> {
            self.closes += 1;
            if self.fail_close {
                Err(Error::InvalidState("tracker".into()))
            } else {
                Ok(())
            }
        }

        fn on_sound_info(&mut self, _ctx: &mut ElementContext, info: SoundInfo) {
            self.info = Some(info);
        }
    }

    #[test]
    fn test_node_lifecycle() {
        let mut node = ElementNode::new("tracker", Tracker::default()).unwrap();
        assert_eq!(node.state(), ElementState::Idle);
        node.close();
        assert_eq!(node.state(), ElementState::Idle);

        assert_eq!(node.open(), JobStatus::Ok);
        assert_eq!(node.state(), ElementState::Opened);
        assert_eq!(node.process(), JobStatus::Done);
        assert_eq!(node.state(), ElementState::Running);
        assert_eq!(node.take_report().unwrap().sample_rate, 8_000);
        node.close();
        assert_eq!(node.state(), ElementState::Closed);
    }

    #[test]
    fn test_close_after_failed_open() {
        let mut node = ElementNode::new(
            "tracker",
            Tracker {
                fail_open: true,
                fail_close: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(node.open(), JobStatus::Fail);
        node.close();
        assert_eq!(node.state(), ElementState::Closed);
    }

    #[test]
    fn test_deliver_sound_info() {
        let mut node = ElementNode::new("tracker", Tracker::default()).unwrap();
        node.deliver_sound_info(SoundInfo::new(44_100, 16, 2));
        assert_eq!(node.ctx().sound_info().unwrap().sample_rate, 44_100);
    }
}
