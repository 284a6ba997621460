//! Sample transformation elements.
//!
//! ## Audio Processing
//! - [`Fade`]: Linear fade-in / fade-out of 16-bit PCM

mod fade;

pub use fade::{Fade, FadeConfig, FadeMode};
