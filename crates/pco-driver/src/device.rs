//! Device capability traits.
//!
//! A camera driver plugs into the engine by implementing [`SegmentDevice`]
//! for the camera handle and [`TransferBuffer`] for the buffers it allocates.
//! The traits describe only what segment readout needs; opening, arming and
//! recording stay with whoever owns the camera.

use crate::components::frame::FrameGeometry;
use crate::error::DeviceError;
use std::fmt;
use std::num::NonZeroU16;

/// Camera memory segment number. Segments are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(NonZeroU16);

impl SegmentId {
    /// Returns `None` for segment 0.
    pub fn new(segment: u16) -> Option<Self> {
        NonZeroU16::new(segment).map(Self)
    }

    pub fn get(self) -> u16 {
        self.0.get()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame counts reported for a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Frames recorded and available for readout.
    pub valid_frames: u32,
    /// Frames the segment can hold.
    pub max_frames: u32,
}

/// Device-assigned buffer number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub i16);

/// Completion status reported by the driver for one buffer.
///
/// Only the driver word decides success; the library word is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    pub dll: u32,
    pub driver: u32,
}

impl TransferStatus {
    pub const OK: Self = Self { dll: 0, driver: 0 };

    pub const fn new(dll: u32, driver: u32) -> Self {
        Self { dll, driver }
    }

    pub fn is_ok(&self) -> bool {
        self.driver == 0
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.driver)
    }
}

/// One host buffer registered with the device.
///
/// Implementations free the device registration in `Drop`. The type must not
/// be `Clone`: two owners of one registration would free it twice. The engine
/// cancels every in-flight transfer before it drops a buffer, so `Drop` may
/// assume the device is no longer writing into it.
pub trait TransferBuffer {
    fn id(&self) -> BufferId;

    /// Queue a transfer of `frame` (1-based device numbering) into this buffer.
    fn start_transfer(&mut self, frame: u32) -> Result<(), DeviceError>;

    /// Block until the queued transfer finishes.
    ///
    /// `Err` means the wait primitive itself failed. A completed transfer
    /// returns its status, which may still report an error.
    fn wait_for_completion(&mut self) -> Result<TransferStatus, DeviceError>;

    /// Pixel data of the most recently completed transfer.
    fn pixels(&self) -> &[u16];
}

/// Segment readout capability of a camera.
pub trait SegmentDevice {
    type Buffer: TransferBuffer;

    fn segment_info(&self, segment: SegmentId) -> Result<SegmentInfo, DeviceError>;

    fn segment_geometry(&self, segment: SegmentId) -> Result<FrameGeometry, DeviceError>;

    /// Allocate a buffer sized for one frame of `geometry` (16 bits per pixel).
    fn allocate_buffer(&self, geometry: FrameGeometry) -> Result<Self::Buffer, DeviceError>;

    /// Switch the image path to read from `segment`. Called once per transfer,
    /// after buffers are allocated and before the first transfer starts.
    fn prepare_readout(
        &self,
        _segment: SegmentId,
        _geometry: FrameGeometry,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Cancel every queued or running transfer on the device.
    fn cancel_all_transfers(&self) -> Result<(), DeviceError>;
}
