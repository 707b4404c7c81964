//! Frame geometry and the borrowed frame view handed to consumers.

use crate::error::TransferError;
use std::fmt;

/// Bytes per pixel. Segment readout is always 16-bit monochrome.
pub const BYTES_PER_PIXEL: usize = 2;

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one frame in bytes.
    #[inline]
    #[must_use]
    pub fn frame_bytes(&self) -> u64 {
        self.pixel_count() as u64 * BYTES_PER_PIXEL as u64
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read-only view of one transferred frame.
///
/// The view borrows the device buffer the frame arrived in and is only valid
/// for the duration of a [`FrameConsumer::on_frame`](crate::FrameConsumer::on_frame)
/// call. Copy the pixels out if they are needed afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    geometry: FrameGeometry,
    pixels: &'a [u16],
}

impl<'a> Frame<'a> {
    /// Wrap `pixels`, which must hold exactly one frame of `geometry`.
    pub fn new(geometry: FrameGeometry, pixels: &'a [u16]) -> Result<Self, TransferError> {
        if pixels.len() != geometry.pixel_count() {
            return Err(TransferError::BufferSize {
                expected: geometry.pixel_count(),
                actual: pixels.len(),
            });
        }
        Ok(Self { geometry, pixels })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    /// Row-major pixel data.
    pub fn pixels(&self) -> &'a [u16] {
        self.pixels
    }
}
