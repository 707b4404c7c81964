//! Bulk transfer of recorded frames out of camera memory segments.
//!
//! Frames are pulled in order by the double-buffered
//! [`TransferEngine`](pco_driver::TransferEngine) and handed to one of the
//! [`consumers`]: copied into memory, folded into maximum-intensity
//! projections, or streamed to size-limited TIFF stacks.
//! [`SegmentTransfer`] wires the two together.
//!
//! ```no_run
//! use pco_driver::{FrameGeometry, SegmentId, SimSegment, SimulatedCamera};
//! use pco_transfer::SegmentTransfer;
//!
//! # fn main() -> pco_transfer::Result<()> {
//! let camera = SimulatedCamera::new()
//!     .with_segment(1, SimSegment::new(100, FrameGeometry::new(512, 512)));
//! let segment = SegmentId::new(1).unwrap();
//! let transfer = SegmentTransfer::new(&camera, segment);
//!
//! let stack = transfer.transfer_raw(0, Some(10))?;
//! let mips = transfer.transfer_mip(10, 10, None)?;
//! println!("{} frames, {} projections", stack.len(), mips.summary.windows);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumers;
pub mod error;
pub mod logging;
pub mod transfer;

pub use config::{ConfigError, Settings, SimulationConfig};
pub use error::{Error, Result};
pub use transfer::{ContainerOutcome, MipContainerOutcome, MipOutcome, SegmentTransfer};
