//! Caller-facing segment transfer operations.
//!
//! [`SegmentTransfer`] pairs a [`TransferEngine`] with one of the frame
//! consumers and returns what the consumer produced:
//!
//! | operation                     | consumer                   | result                    |
//! |-------------------------------|----------------------------|---------------------------|
//! | `transfer_raw`                | [`RawCopy`]                | [`FrameStack`]            |
//! | `transfer_mip`                | [`MipFolder`] to a stack   | [`MipOutcome`]            |
//! | `transfer_to_container`       | [`ContainerSink`]          | [`ContainerOutcome`]      |
//! | `transfer_mip_to_container`   | [`MipFolder`] to a TIFF    | [`MipContainerOutcome`]   |
//!
//! Frame bounds are `Option<usize>`; `None` means every frame the segment
//! holds past `skip`.

use crate::consumers::{ContainerSink, MipFolder, MipSink, MipSummary, RawCopy};
use crate::error::{Error, Result};
use pco_driver::{SegmentDevice, SegmentId, TransferEngine};
use pco_storage::{ContainerLimits, ContainerSummary, FrameStack, TiffStackWriter};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::info;

/// Result of [`SegmentTransfer::transfer_mip`].
#[derive(Debug)]
pub struct MipOutcome {
    /// One projection per completed window.
    pub stack: FrameStack,
    pub summary: MipSummary,
}

/// Result of [`SegmentTransfer::transfer_to_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOutcome {
    pub frames: usize,
    pub files: ContainerSummary,
}

/// Result of [`SegmentTransfer::transfer_mip_to_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipContainerOutcome {
    pub summary: MipSummary,
    pub files: ContainerSummary,
}

/// Transfers out of one camera memory segment.
pub struct SegmentTransfer<'d, D: SegmentDevice> {
    engine: TransferEngine<'d, D>,
    limits: ContainerLimits,
}

impl<'d, D: SegmentDevice> SegmentTransfer<'d, D> {
    pub fn new(device: &'d D, segment: SegmentId) -> Self {
        Self {
            engine: TransferEngine::new(device, segment),
            limits: ContainerLimits::default(),
        }
    }

    /// Log engine progress every `interval` frames; 0 disables it.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.engine = self.engine.with_progress_interval(interval);
        self
    }

    /// Size accounting for TIFF output.
    #[must_use]
    pub fn with_container_limits(mut self, limits: ContainerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn engine(&self) -> &TransferEngine<'d, D> {
        &self.engine
    }

    /// Copy up to `max_count` frames after `skip` into memory.
    pub fn transfer_raw(&self, skip: usize, max_count: Option<usize>) -> Result<FrameStack> {
        let mut consumer = RawCopy::new();
        let delivered = self.engine.transfer(skip, max_count, &mut consumer)?;
        Ok(consumer.into_stack(delivered))
    }

    /// Fold runs of `images_per_mip` frames into up to `num_mips` projections.
    pub fn transfer_mip(
        &self,
        skip: usize,
        images_per_mip: usize,
        num_mips: Option<usize>,
    ) -> Result<MipOutcome> {
        let (stack, summary) =
            self.run_mip(skip, images_per_mip, num_mips, FrameStack::default())?;
        Ok(MipOutcome { stack, summary })
    }

    /// Stream up to `max_count` frames after `skip` to a TIFF stack at `path`.
    ///
    /// Frames already written stay on disk if the transfer fails part way.
    pub fn transfer_to_container(
        &self,
        skip: usize,
        max_count: Option<usize>,
        path: &Path,
    ) -> Result<ContainerOutcome> {
        let mut sink = ContainerSink::new(TiffStackWriter::with_limits(path, self.limits));
        let frames = self.engine.transfer(skip, max_count, &mut sink)?;
        let files = sink.into_writer().finish()?;
        info!(frames, files = files.files.len(), path = %path.display(), "Frames written");
        Ok(ContainerOutcome { frames, files })
    }

    /// Like [`transfer_mip`](Self::transfer_mip), writing one TIFF page per
    /// completed window.
    pub fn transfer_mip_to_container(
        &self,
        skip: usize,
        images_per_mip: usize,
        num_mips: Option<usize>,
        path: &Path,
    ) -> Result<MipContainerOutcome> {
        let writer = TiffStackWriter::with_limits(path, self.limits);
        let (mut writer, summary) = self.run_mip(skip, images_per_mip, num_mips, writer)?;
        let files = writer.finish()?;
        info!(
            windows = summary.windows,
            lost_frames = summary.lost_frames,
            path = %path.display(),
            "Projections written"
        );
        Ok(MipContainerOutcome { summary, files })
    }

    fn run_mip<S: MipSink>(
        &self,
        skip: usize,
        images_per_mip: usize,
        num_mips: Option<usize>,
        target: S,
    ) -> Result<(S, MipSummary)> {
        let images_per_mip = NonZeroUsize::new(images_per_mip)
            .ok_or_else(|| Error::InvalidRequest("images_per_mip must be at least 1".into()))?;
        let max_frames = num_mips.map(|windows| images_per_mip.get().saturating_mul(windows));

        let mut folder = MipFolder::new(images_per_mip, target);
        self.engine.transfer(skip, max_frames, &mut folder)?;
        Ok(folder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pco_driver::{FrameGeometry, SimSegment, SimulatedCamera};
    use tracing_test::traced_test;

    #[test]
    fn test_zero_window_is_rejected_before_touching_the_device() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        let transfer = SegmentTransfer::new(&camera, SegmentId::new(1).unwrap());

        let err = transfer.transfer_mip(0, 0, None).unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(camera.stats().buffers_allocated, 0);
    }

    #[test]
    fn test_unbounded_windows_do_not_overflow() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(12, FrameGeometry::new(2, 2)));
        let transfer = SegmentTransfer::new(&camera, SegmentId::new(1).unwrap());

        let outcome = transfer.transfer_mip(0, 4, Some(usize::MAX)).unwrap();

        assert_eq!(outcome.summary, MipSummary { windows: 3, lost_frames: 0 });
    }

    #[traced_test]
    #[test]
    fn test_lost_frames_are_logged() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(97, FrameGeometry::new(2, 2)));
        let transfer = SegmentTransfer::new(&camera, SegmentId::new(1).unwrap());

        let outcome = transfer.transfer_mip(0, 10, None).unwrap();

        assert_eq!(outcome.summary.lost_frames, 7);
        assert!(logs_contain("Discarding partial MIP window"));
        assert!(logs_contain("lost_frames=7"));
    }

    #[traced_test]
    #[test]
    fn test_complete_windows_log_no_warning() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(20, FrameGeometry::new(2, 2)));
        let transfer = SegmentTransfer::new(&camera, SegmentId::new(1).unwrap());

        transfer.transfer_mip(0, 10, None).unwrap();

        assert!(!logs_contain("Discarding partial MIP window"));
    }
}
