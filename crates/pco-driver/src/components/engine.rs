//! Double-buffered segment transfer.
//!
//! While the consumer processes frame `i` out of one buffer, frame `i + 1`
//! is landing in the other. Even indices use buffer A, odd indices buffer B.
//!
//! ```text
//! index:    0     1     2     3     4   ...
//! buffer:   A     B     A     B     A
//!          wait  wait  wait  wait  wait
//!          use   use   use   use   use
//!          arm 2 arm 3 arm 4 ...
//! ```

use crate::components::buffers::BufferSet;
use crate::components::frame::{Frame, FrameGeometry};
use crate::device::{SegmentDevice, SegmentId};
use crate::error::TransferError;
use std::marker::PhantomData;
use std::time::Instant;
use tracing::{debug, info};

/// Number of device buffers cycled by the engine.
pub const BUFFER_COUNT: usize = 2;

/// What a transfer is about to deliver. Passed to
/// [`FrameConsumer::on_start`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub segment: SegmentId,
    /// Frames skipped at the start of the segment.
    pub skip: usize,
    /// Frames that will be delivered, indices `0..frames`.
    pub frames: usize,
    pub geometry: FrameGeometry,
}

impl TransferPlan {
    /// Device frame number (1-based) for transfer index `index`.
    #[inline]
    pub fn device_frame(&self, index: usize) -> u32 {
        (self.skip + index + 1) as u32
    }
}

/// Receives frames from a transfer, in order, one call per frame.
pub trait FrameConsumer {
    /// Consumer errors must be able to carry engine errors so both flow out
    /// of [`TransferEngine::transfer`] through one type.
    type Error: From<TransferError>;

    /// Called once, after the plan is known and before the first frame.
    /// Not called when the transfer delivers nothing.
    fn on_start(&mut self, _plan: &TransferPlan) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called for every delivered frame with `index` counting up from 0.
    fn on_frame(&mut self, index: usize, frame: Frame<'_>) -> Result<(), Self::Error>;
}

/// Adapts a closure into a [`FrameConsumer`].
struct FnConsumer<F, E> {
    handler: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> FrameConsumer for FnConsumer<F, E>
where
    F: FnMut(usize, Frame<'_>) -> Result<(), E>,
    E: From<TransferError>,
{
    type Error = E;

    fn on_frame(&mut self, index: usize, frame: Frame<'_>) -> Result<(), E> {
        (self.handler)(index, frame)
    }
}

/// Pulls runs of frames out of one camera memory segment.
pub struct TransferEngine<'d, D: SegmentDevice> {
    device: &'d D,
    segment: SegmentId,
    progress_interval: usize,
}

impl<'d, D: SegmentDevice> TransferEngine<'d, D> {
    pub fn new(device: &'d D, segment: SegmentId) -> Self {
        Self {
            device,
            segment,
            progress_interval: 0,
        }
    }

    /// Log progress every `interval` frames. 0 disables progress logging.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Query the segment and work out what a transfer would deliver.
    ///
    /// Returns `None` when nothing would be delivered: `skip` is at or past
    /// the number of valid frames, or `max_frames` is `Some(0)`.
    pub fn plan(
        &self,
        skip: usize,
        max_frames: Option<usize>,
    ) -> Result<Option<TransferPlan>, TransferError> {
        let info = self
            .device
            .segment_info(self.segment)
            .map_err(TransferError::device("query segment"))?;
        let valid = info.valid_frames as usize;

        if skip >= valid {
            debug!(segment = %self.segment, skip, valid, "Nothing to transfer past skip");
            return Ok(None);
        }

        let frames = (valid - skip).min(max_frames.unwrap_or(usize::MAX));
        if frames == 0 {
            return Ok(None);
        }

        let geometry = self
            .device
            .segment_geometry(self.segment)
            .map_err(TransferError::device("query segment geometry"))?;

        Ok(Some(TransferPlan {
            segment: self.segment,
            skip,
            frames,
            geometry,
        }))
    }

    /// Transfer up to `max_frames` frames (`None` for all) after skipping
    /// `skip`, handing each to `consumer`. Returns the number delivered.
    ///
    /// Any error aborts the transfer. Outstanding device transfers are
    /// cancelled and the buffers freed before the error is returned.
    pub fn transfer<C>(
        &self,
        skip: usize,
        max_frames: Option<usize>,
        consumer: &mut C,
    ) -> Result<usize, C::Error>
    where
        C: FrameConsumer + ?Sized,
    {
        let Some(plan) = self.plan(skip, max_frames)? else {
            return Ok(0);
        };
        info!(
            segment = %plan.segment,
            skip = plan.skip,
            frames = plan.frames,
            geometry = %plan.geometry,
            "Starting segment transfer"
        );

        let mut buffers = BufferSet::allocate(self.device, plan.geometry, BUFFER_COUNT)?;
        self.device
            .prepare_readout(plan.segment, plan.geometry)
            .map_err(TransferError::device("prepare segment readout"))?;

        consumer.on_start(&plan)?;

        let started = Instant::now();
        for index in 0..plan.frames.min(BUFFER_COUNT) {
            buffers.start(index, plan.device_frame(index))?;
        }

        for index in 0..plan.frames {
            let slot = index % BUFFER_COUNT;
            let frame = buffers.wait(slot, plan.device_frame(index))?;
            consumer.on_frame(index, frame)?;

            // Re-arm the buffer just drained with the farthest frame ahead.
            let next = index + BUFFER_COUNT;
            if next < plan.frames {
                buffers.start(slot, plan.device_frame(next))?;
            }

            let delivered = index + 1;
            if self.progress_interval > 0 && delivered % self.progress_interval == 0 {
                info!(delivered, total = plan.frames, "Transfer progress");
            }
        }

        let elapsed = started.elapsed();
        let bytes = plan.geometry.frame_bytes() * plan.frames as u64;
        let seconds = elapsed.as_secs_f64();
        let mb_per_sec = if seconds > 0.0 {
            bytes as f64 / seconds / 1e6
        } else {
            0.0
        };
        info!(
            frames = plan.frames,
            elapsed_ms = elapsed.as_millis() as u64,
            bytes,
            mb_per_sec,
            "Segment transfer complete"
        );

        Ok(plan.frames)
    }

    /// [`transfer`](Self::transfer) with a closure as the consumer.
    pub fn transfer_with<F, E>(
        &self,
        skip: usize,
        max_frames: Option<usize>,
        handler: F,
    ) -> Result<usize, E>
    where
        F: FnMut(usize, Frame<'_>) -> Result<(), E>,
        E: From<TransferError>,
    {
        let mut consumer = FnConsumer {
            handler,
            _error: PhantomData,
        };
        self.transfer(skip, max_frames, &mut consumer)
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{SimSegment, SimulatedCamera};

    fn segment(n: u16) -> SegmentId {
        SegmentId::new(n).unwrap()
    }

    #[test]
    fn test_plan_clamps_to_valid_frames() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(20, FrameGeometry::new(4, 2)));
        let engine = TransferEngine::new(&camera, segment(1));

        let plan = engine.plan(5, Some(100)).unwrap().unwrap();
        assert_eq!(plan.frames, 15);
        assert_eq!(plan.device_frame(0), 6);
        assert_eq!(plan.device_frame(14), 20);

        let plan = engine.plan(5, Some(3)).unwrap().unwrap();
        assert_eq!(plan.frames, 3);
    }

    #[test]
    fn test_plan_degenerate_requests() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(10, FrameGeometry::new(4, 2)));
        let engine = TransferEngine::new(&camera, segment(1));

        assert!(engine.plan(10, None).unwrap().is_none());
        assert!(engine.plan(11, None).unwrap().is_none());
        assert!(engine.plan(0, Some(0)).unwrap().is_none());
    }

    #[test]
    fn test_closure_consumer_sees_every_index() {
        let camera =
            SimulatedCamera::new().with_segment(2, SimSegment::new(7, FrameGeometry::new(3, 3)));
        let engine = TransferEngine::new(&camera, segment(2));

        let mut seen = Vec::new();
        let delivered = engine
            .transfer_with(0, None, |index, frame| {
                assert_eq!(frame.geometry(), FrameGeometry::new(3, 3));
                seen.push(index);
                Ok::<(), TransferError>(())
            })
            .unwrap();

        assert_eq!(delivered, 7);
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_frame_transfer_starts_one_buffer() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(1, FrameGeometry::new(2, 2)));
        let engine = TransferEngine::new(&camera, segment(1));

        let delivered = engine
            .transfer_with(0, None, |_, _| Ok::<(), TransferError>(()))
            .unwrap();

        assert_eq!(delivered, 1);
        let stats = camera.stats();
        assert_eq!(stats.transfers_started, 1);
        assert_eq!(stats.buffers_allocated, 2);
        assert_eq!(stats.buffers_freed, 2);
    }
}
