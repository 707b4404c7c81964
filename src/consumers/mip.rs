//! Maximum-intensity projection over fixed windows of frames.
//!
//! Frames `k*w .. k*w + w` fold into projection `k`, where `w` is the window
//! size. A window is emitted only once all `w` of its frames have arrived; a
//! trailing partial window is discarded and reported as lost frames.

use crate::error::{Error, Result};
use pco_driver::{Frame, FrameConsumer, FrameGeometry, TransferPlan};
use pco_storage::{FrameStack, TiffStackWriter};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// Destination of completed projections.
///
/// Implemented for [`FrameStack`] (one slot per window, in memory) and
/// [`TiffStackWriter`] (one page per window).
pub trait MipSink {
    /// Called once before the first frame with the number of complete
    /// windows the transfer can produce.
    fn prepare(&mut self, _geometry: FrameGeometry, _windows: usize) {}

    fn write_window(
        &mut self,
        window: usize,
        geometry: FrameGeometry,
        pixels: &[u16],
    ) -> Result<()>;

    /// Called by [`MipFolder::finish`] with the windows actually written.
    fn complete(&mut self, _windows: usize) {}
}

impl MipSink for FrameStack {
    fn prepare(&mut self, geometry: FrameGeometry, windows: usize) {
        *self = FrameStack::new(geometry, windows);
    }

    fn write_window(
        &mut self,
        window: usize,
        _geometry: FrameGeometry,
        pixels: &[u16],
    ) -> Result<()> {
        Ok(self.write_frame(window, pixels)?)
    }

    fn complete(&mut self, windows: usize) {
        self.truncate(windows);
    }
}

impl MipSink for TiffStackWriter {
    fn write_window(
        &mut self,
        _window: usize,
        geometry: FrameGeometry,
        pixels: &[u16],
    ) -> Result<()> {
        Ok(self.write_frame(geometry, pixels)?)
    }
}

/// Outcome of a MIP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipSummary {
    /// Completed windows, each one emitted projection.
    pub windows: usize,
    /// Source frames in the discarded trailing partial window.
    pub lost_frames: usize,
}

/// Folds delivered frames into per-window running maxima.
pub struct MipFolder<S> {
    images_per_mip: NonZeroUsize,
    geometry: FrameGeometry,
    accumulator: Vec<u16>,
    delivered: usize,
    windows: usize,
    target: S,
}

impl<S: MipSink> MipFolder<S> {
    pub fn new(images_per_mip: NonZeroUsize, target: S) -> Self {
        Self {
            images_per_mip,
            geometry: FrameGeometry::default(),
            accumulator: Vec::new(),
            delivered: 0,
            windows: 0,
            target,
        }
    }

    pub fn images_per_mip(&self) -> usize {
        self.images_per_mip.get()
    }

    /// Windows completed so far.
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Close the run and hand back the target.
    ///
    /// Frames of an unfinished window are dropped; their count is reported in
    /// [`MipSummary::lost_frames`] and logged.
    pub fn finish(mut self) -> (S, MipSummary) {
        let ipm = self.images_per_mip.get();
        let summary = MipSummary {
            windows: self.windows,
            lost_frames: self.delivered - self.windows * ipm,
        };
        if summary.lost_frames > 0 {
            warn!(
                lost_frames = summary.lost_frames,
                images_per_mip = ipm,
                windows = summary.windows,
                "Discarding partial MIP window"
            );
        }

        self.target.complete(summary.windows);
        (self.target, summary)
    }
}

impl<S: MipSink> FrameConsumer for MipFolder<S> {
    type Error = Error;

    fn on_start(&mut self, plan: &TransferPlan) -> Result<()> {
        let windows = plan.frames / self.images_per_mip.get();
        debug!(
            windows,
            images_per_mip = self.images_per_mip.get(),
            geometry = %plan.geometry,
            "Allocating MIP accumulator"
        );
        self.geometry = plan.geometry;
        self.accumulator = vec![0; plan.geometry.pixel_count()];
        self.target.prepare(plan.geometry, windows);
        Ok(())
    }

    fn on_frame(&mut self, index: usize, frame: Frame<'_>) -> Result<()> {
        for (max, &pixel) in self.accumulator.iter_mut().zip(frame.pixels()) {
            *max = (*max).max(pixel);
        }
        self.delivered = index + 1;

        let ipm = self.images_per_mip.get();
        if index % ipm == ipm - 1 {
            let window = index / ipm;
            self.target
                .write_window(window, self.geometry, &self.accumulator)?;
            self.accumulator.fill(0);
            self.windows += 1;
        }
        Ok(())
    }
}
