//! Element system for mediaflow pipelines.
//!
//! This module defines the contract every processing stage implements and
//! the plumbing stages use to move data:
//!
//! - [`Element`]: the `open`/`process`/`close` job contract
//! - [`JobStatus`]: what a job reports back to the executor
//! - [`Port`]: a blocking acquire/release connection point
//! - [`ElementContext`]: an element's ports and negotiated sound format
//! - [`ElementNode`]: an element plus its context and lifecycle state
//!
//! # Design
//!
//! Elements are synchronous. A pipeline's executor calls them on its worker
//! thread, and all blocking happens inside port acquire/release calls. An
//! element owns at most one input port and any number of output ports; the
//! output ports are served in order for fan-out.

mod context;
mod node;
mod port;
mod traits;

pub use context::{ElementContext, MAX_TAG_LEN, validate_tag};
pub use node::{ElementNode, ElementRef};
pub use port::{DEFAULT_PORT_BUF_SIZE, Port, PortConfig, PortDirection, port_pair};
pub use traits::{Element, ElementState, JobStatus, SoundInfo};
