//! Frame consumers driven by the transfer engine.
//!
//! Each consumer implements [`FrameConsumer`](pco_driver::FrameConsumer) and
//! is handed every delivered frame in order:
//!
//! - [`RawCopy`]: copies frames into a [`FrameStack`](pco_storage::FrameStack).
//! - [`MipFolder`]: folds windows of frames into maximum-intensity projections
//!   and sends each completed window to a [`MipSink`].
//! - [`ContainerSink`]: streams frames straight into a
//!   [`TiffStackWriter`](pco_storage::TiffStackWriter).

pub mod container;
pub mod mip;
pub mod raw_copy;

pub use container::ContainerSink;
pub use mip::{MipFolder, MipSink, MipSummary};
pub use raw_copy::RawCopy;
