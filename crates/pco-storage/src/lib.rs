//! Storage for transferred frames.
//!
//! - [`FrameStack`]: contiguous in-memory stack of equally sized frames.
//! - [`TiffStackWriter`]: streaming multi-page 16-bit TIFF output that rolls
//!   over to numbered files before a file would grow past its size ceiling.

pub mod error;
pub mod frame_stack;
pub mod tiff_writer;

pub use error::StorageError;
pub use frame_stack::FrameStack;
pub use tiff_writer::{
    numbered_path, ContainerFile, ContainerLimits, ContainerSummary, TiffStackWriter,
    DEFAULT_FRAME_OVERHEAD_BYTES, DEFAULT_MAX_FILE_BYTES, MIN_FRAME_OVERHEAD_BYTES,
    TIFF_ADDRESS_LIMIT, TIFF_HEADROOM_BYTES,
};
