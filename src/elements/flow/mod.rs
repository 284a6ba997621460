//! Flow control and routing elements.

mod copier;

pub use copier::{Copier, CopierConfig};
