//! # mediaflow
//!
//! The data-flow substrate of a media pipeline engine for small, real-time
//! targets.
//!
//! Independently written processing stages are wired into chains that move
//! audio from a source to a sink with few copies and bounded memory.
//!
//! ## Building blocks
//!
//! - **[`Payload`]**: a buffer plus valid size, done flag and timestamp,
//!   owned by exactly one party at a time
//! - **[`databus`]**: bounded handoff queues between threads, most notably
//!   the zero-copy [`PointerBuffer`](databus::PointerBuffer)
//! - **[`element`]**: the `open`/`process`/`close` job contract and the
//!   blocking acquire/release [`Port`](element::Port)
//! - **[`executor`]**: a worker thread walking a job list
//! - **[`pipeline`]**: element chains, lifecycle control, linked pipelines
//!   and events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediaflow::prelude::*;
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::named("play"))?;
//! pipeline.add_element("dec", PcmDecoder::new(DecoderConfig::default()))?;
//! pipeline.add_element("fade", Fade::default())?;
//! pipeline.set_io(share(FileIo::reader("tone.u8")))?;
//! pipeline.set_io(share(FileIo::writer("tone.s16")))?;
//!
//! pipeline.bind_task(Arc::new(Task::new(TaskConfig::named("play_task"))?));
//! pipeline.load_jobs()?;
//! pipeline.run()?;
//! pipeline.wait_until_done(Wait::Forever)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod clock;
pub mod databus;
pub mod element;
pub mod elements;
pub mod error;
pub mod executor;
pub mod io;
pub mod memory;
pub mod oal;
pub mod payload;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::clock::Wait;
    pub use crate::databus::{BusRef, DataBus, PointerBuffer, RingBuffer};
    pub use crate::element::{Element, ElementContext, JobStatus, Port, PortConfig, SoundInfo};
    pub use crate::elements::{Copier, CopierConfig, DecoderConfig, Fade, FadeConfig, PcmDecoder};
    pub use crate::error::{Error, IoError, Result};
    pub use crate::executor::{Executor, ExecutorRef, Task, TaskConfig, TaskState};
    pub use crate::io::{FileIo, Io, MemoryIo, SharedIo, share};
    pub use crate::payload::Payload;
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineEvent};
    pub use std::sync::Arc;
}

pub use error::{Error, Result};
pub use payload::Payload;
