//! Segmented frame transfer from camera memory.
//!
//! Cameras with an onboard recorder keep previously recorded frames in
//! numbered memory segments. This crate pulls a run of those frames into host
//! memory through a small pool of device-registered buffers and hands each
//! frame, in order, to a [`FrameConsumer`].
//!
//! # Architecture
//!
//! ```text
//! SegmentDevice (driver capability)        TransferEngine
//! ┌──────────────────────────────┐        ┌─────────────────────────────────┐
//! │ segment_info / geometry      │◄───────┤ plan: skip, bound, geometry     │
//! │ allocate_buffer ──► Buffer A │        │ prime A (frame n), B (frame n+1)│
//! │                 ──► Buffer B │        │ loop:                           │
//! │ cancel_all_transfers         │        │   wait slot ─► Frame<'_> view   │
//! └──────────────────────────────┘        │   consumer.on_frame(i, view)    │
//!                                         │   re-arm slot with frame i + 2  │
//!                                         │ drop: cancel, then free buffers │
//!                                         └─────────────────────────────────┘
//! ```
//!
//! The [`Frame`] handed to a consumer borrows the buffer it was transferred
//! into. The borrow ends before the buffer is re-armed, so a consumer cannot
//! keep a view into memory the device is about to overwrite.

pub mod components;
pub mod device;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;

pub use components::engine::{FrameConsumer, TransferEngine, TransferPlan, BUFFER_COUNT};
pub use components::frame::{Frame, FrameGeometry};
pub use device::{BufferId, SegmentDevice, SegmentId, SegmentInfo, TransferBuffer, TransferStatus};
pub use error::{DeviceError, TransferError};

#[cfg(feature = "mock")]
pub use mock::{Fault, PixelPattern, SimSegment, SimStats, SimulatedCamera};
