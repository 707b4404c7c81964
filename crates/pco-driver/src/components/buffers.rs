//! Device buffer set with guaranteed cancellation.
//!
//! The device writes into registered buffers asynchronously. Freeing a buffer
//! while a transfer into it is still queued lets the device write into freed
//! memory, so every exit from a transfer (success, device error, consumer
//! error) must cancel outstanding transfers first. `BufferSet` ties that to
//! scope: its `Drop` cancels, and only afterwards are the buffer fields dropped
//! (which frees them).

use crate::components::frame::{Frame, FrameGeometry};
use crate::device::{SegmentDevice, TransferBuffer};
use crate::error::TransferError;
use tracing::{debug, error};

pub(crate) struct BufferSet<'d, D: SegmentDevice> {
    device: &'d D,
    geometry: FrameGeometry,
    buffers: Vec<D::Buffer>,
}

impl<'d, D: SegmentDevice> BufferSet<'d, D> {
    /// Allocate `count` buffers of one frame each.
    ///
    /// If an allocation fails, buffers already allocated are freed on return.
    /// No transfer has been started at that point, so no cancel is needed.
    pub(crate) fn allocate(
        device: &'d D,
        geometry: FrameGeometry,
        count: usize,
    ) -> Result<Self, TransferError> {
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let buffer = device
                .allocate_buffer(geometry)
                .map_err(TransferError::device("allocate buffer"))?;
            debug!(buffer = buffer.id().0, %geometry, "Allocated transfer buffer");
            buffers.push(buffer);
        }
        Ok(Self {
            device,
            geometry,
            buffers,
        })
    }

    pub(crate) fn start(&mut self, slot: usize, frame: u32) -> Result<(), TransferError> {
        debug!(frame, slot, "Start transfer");
        self.buffers[slot]
            .start_transfer(frame)
            .map_err(TransferError::device("start transfer"))
    }

    /// Wait for the transfer queued on `slot` and expose the frame it holds.
    ///
    /// The returned view borrows the set, so the slot cannot be re-armed
    /// while the view is alive.
    pub(crate) fn wait(&mut self, slot: usize, frame: u32) -> Result<Frame<'_>, TransferError> {
        debug!(frame, slot, "Wait for transfer");
        let buffer = &mut self.buffers[slot];
        let status = buffer
            .wait_for_completion()
            .map_err(|source| TransferError::Wait { frame, source })?;

        // The driver status must always be checked; a signalled event alone
        // does not mean the data is good.
        if !status.is_ok() {
            error!(frame, slot, %status, "Buffer completed with error status");
            return Err(TransferError::BufferStatus { frame, status });
        }

        Frame::new(self.geometry, buffer.pixels())
    }
}

impl<D: SegmentDevice> Drop for BufferSet<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.cancel_all_transfers() {
            error!(error = %e, "Failed to cancel outstanding transfers before freeing buffers");
        }
        debug!(buffers = self.buffers.len(), "Releasing transfer buffers");
    }
}
