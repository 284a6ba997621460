//! Pipeline construction and execution.
//!
//! This module provides the pipeline layer on top of elements and
//! executors:
//!
//! - [`Pipeline`]: an ordered element chain with input/output I/O, bound to
//!   an [`Executor`](crate::executor::Executor)
//! - [`PipelineEvent`]: state, end-of-stream, error and sound-format events
//! - [`PipelineHandle`]: a view of a pipeline held by linked pipelines
//!
//! # Linked pipelines
//!
//! Two pipelines exchange data through a bus shared by a port pair, set up
//! with [`Pipeline::connect_pipe`], and exchange events through
//! [`Pipeline::reg_event_recipient`]. Event delivery runs the internal
//! acceptor first, then the user callback, then every recipient.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaflow::databus::RingBuffer;
//! use mediaflow::element::{PortConfig, port_pair};
//!
//! let bus = Arc::new(RingBuffer::new("dec2play", 8 * 1024)?);
//! let (out, input) = port_pair("dec2play", bus, PortConfig::default(), PortConfig::default());
//! decode.connect_pipe("copy", out, &mut play, "fade", input)?;
//! decode.reg_event_recipient(&play)?;
//! ```

mod events;
#[allow(clippy::module_inception)]
mod pipeline;

pub use events::{EventReceiver, EventSender, PipelineEvent};
pub use pipeline::{
    DEFAULT_BUS_CAPACITY, DEFAULT_EVENT_CAPACITY, EventCallback, Pipeline, PipelineConfig,
    PipelineHandle,
};
