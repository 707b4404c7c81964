//! Transfer engine components.

pub(crate) mod buffers;
pub mod engine;
pub mod frame;
