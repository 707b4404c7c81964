//! Simulated recorder camera.
//!
//! Behaves like a camera with onboard memory segments: buffers are allocated
//! from the device, transfers are queued per buffer and complete when waited
//! on, and `cancel_all_transfers` drops everything queued. Counters record how
//! the engine used the device so tests can check cleanup and ordering, and
//! faults can be injected at specific device frames.

use crate::components::frame::FrameGeometry;
use crate::device::{
    BufferId, SegmentDevice, SegmentId, SegmentInfo, TransferBuffer, TransferStatus,
};
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Driver code reported for a transfer that was cancelled before completion.
pub const STATUS_CANCELLED: u32 = 0x8000_0013;
/// Driver code reported for an injected transfer fault.
pub const STATUS_TRANSFER_FAILED: u32 = 0x8000_0010;

const ERR_NO_SEGMENT: u32 = 0x8000_2010;
const ERR_FRAME_RANGE: u32 = 0x8000_2011;
const ERR_BUFFER_BUSY: u32 = 0x8000_2012;
const ERR_NOT_PREPARED: u32 = 0x8000_2013;
const ERR_WAIT: u32 = 0x8000_2014;
const ERR_ALLOCATION: u32 = 0x8000_2015;
const ERR_INJECTED: u32 = 0x8000_2016;

/// Pixel values generated for simulated frames.
#[derive(Clone)]
pub enum PixelPattern {
    /// Every pixel of device frame `n` holds `n` (truncated to 16 bits).
    FrameNumber,
    /// `(x + y + n) % 4096`, a diagonal ramp that moves with the frame number.
    Ramp,
    /// Arbitrary function of `(device frame, pixel index)`.
    Custom(Arc<dyn Fn(u32, usize) -> u16 + Send + Sync>),
}

impl PixelPattern {
    pub fn custom(f: impl Fn(u32, usize) -> u16 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    fn fill(&self, frame: u32, geometry: FrameGeometry, pixels: &mut [u16]) {
        match self {
            Self::FrameNumber => pixels.fill(frame as u16),
            Self::Ramp => {
                let width = geometry.width.max(1) as usize;
                for (i, px) in pixels.iter_mut().enumerate() {
                    let (x, y) = (i % width, i / width);
                    *px = ((x + y + frame as usize) % 4096) as u16;
                }
            }
            Self::Custom(f) => {
                for (i, px) in pixels.iter_mut().enumerate() {
                    *px = f(frame, i);
                }
            }
        }
    }
}

impl fmt::Debug for PixelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameNumber => f.write_str("FrameNumber"),
            Self::Ramp => f.write_str("Ramp"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One simulated memory segment.
#[derive(Debug, Clone)]
pub struct SimSegment {
    pub valid_frames: u32,
    pub max_frames: u32,
    pub geometry: FrameGeometry,
    pub pattern: PixelPattern,
}

impl SimSegment {
    /// Segment holding `valid_frames` recorded frames, filled to capacity.
    pub fn new(valid_frames: u32, geometry: FrameGeometry) -> Self {
        Self {
            valid_frames,
            max_frames: valid_frames,
            geometry,
            pattern: PixelPattern::FrameNumber,
        }
    }

    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u32) -> Self {
        self.max_frames = max_frames;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: PixelPattern) -> Self {
        self.pattern = pattern;
        self
    }
}

/// Injectable device failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `segment_info` fails.
    SegmentQuery,
    /// `segment_geometry` fails.
    GeometryQuery,
    /// The `n`th buffer allocation (1-based) fails.
    Allocation(usize),
    /// `prepare_readout` fails.
    PrepareReadout,
    /// Starting a transfer of this device frame fails.
    StartAt(u32),
    /// The completion wait for this device frame fails.
    WaitAt(u32),
    /// The transfer of this device frame completes with a bad status.
    StatusAt(u32),
}

/// Usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub buffers_allocated: usize,
    pub buffers_freed: usize,
    /// Buffers dropped while a transfer into them was still queued.
    pub freed_while_in_flight: usize,
    pub cancel_calls: usize,
    pub transfers_started: usize,
    pub transfers_completed: usize,
    pub max_in_flight: usize,
    pub readouts_prepared: usize,
}

#[derive(Default)]
struct SimState {
    segments: HashMap<u16, SimSegment>,
    faults: Vec<Fault>,
    readout: Option<SegmentId>,
    next_buffer: i16,
    in_flight: HashMap<BufferId, u32>,
    cancelled: HashSet<BufferId>,
    stats: SimStats,
}

impl SimState {
    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn injected(&self, what: &str) -> DeviceError {
        DeviceError::new(ERR_INJECTED, format!("Injected fault: {what}"))
    }
}

/// In-memory stand-in for a camera with onboard recorder segments.
///
/// Cloning yields another handle to the same simulated camera.
#[derive(Clone, Default)]
pub struct SimulatedCamera {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_segment(self, segment: u16, config: SimSegment) -> Self {
        self.state.lock().segments.insert(segment, config);
        self
    }

    #[must_use]
    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.lock().faults.push(fault);
        self
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> SimStats {
        self.state.lock().stats
    }

    /// Transfers currently queued on the device.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    fn segment(&self, segment: SegmentId) -> Result<SimSegment, DeviceError> {
        self.state
            .lock()
            .segments
            .get(&segment.get())
            .cloned()
            .ok_or_else(|| {
                DeviceError::new(ERR_NO_SEGMENT, format!("Segment {segment} does not exist"))
            })
    }
}

impl SegmentDevice for SimulatedCamera {
    type Buffer = SimBuffer;

    fn segment_info(&self, segment: SegmentId) -> Result<SegmentInfo, DeviceError> {
        {
            let state = self.state.lock();
            if state.has_fault(Fault::SegmentQuery) {
                return Err(state.injected("segment query"));
            }
        }
        let config = self.segment(segment)?;
        Ok(SegmentInfo {
            valid_frames: config.valid_frames,
            max_frames: config.max_frames,
        })
    }

    fn segment_geometry(&self, segment: SegmentId) -> Result<FrameGeometry, DeviceError> {
        {
            let state = self.state.lock();
            if state.has_fault(Fault::GeometryQuery) {
                return Err(state.injected("geometry query"));
            }
        }
        Ok(self.segment(segment)?.geometry)
    }

    fn allocate_buffer(&self, geometry: FrameGeometry) -> Result<SimBuffer, DeviceError> {
        let mut state = self.state.lock();
        let attempt = state.stats.buffers_allocated + 1;
        if state.has_fault(Fault::Allocation(attempt)) {
            return Err(DeviceError::new(
                ERR_ALLOCATION,
                format!("Injected fault: allocation {attempt}"),
            ));
        }

        let id = BufferId(state.next_buffer);
        state.next_buffer = state.next_buffer.wrapping_add(1);
        state.stats.buffers_allocated += 1;
        Ok(SimBuffer {
            id,
            geometry,
            pixels: vec![0; geometry.pixel_count()],
            state: Arc::clone(&self.state),
        })
    }

    fn prepare_readout(
        &self,
        segment: SegmentId,
        _geometry: FrameGeometry,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.has_fault(Fault::PrepareReadout) {
            return Err(state.injected("prepare readout"));
        }
        state.readout = Some(segment);
        state.stats.readouts_prepared += 1;
        Ok(())
    }

    fn cancel_all_transfers(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.stats.cancel_calls += 1;
        let pending: Vec<BufferId> = state.in_flight.drain().map(|(id, _)| id).collect();
        if !pending.is_empty() {
            debug!(cancelled = pending.len(), "Cancelled queued transfers");
        }
        state.cancelled.extend(pending);
        Ok(())
    }
}

/// Buffer allocated from a [`SimulatedCamera`].
pub struct SimBuffer {
    id: BufferId,
    geometry: FrameGeometry,
    pixels: Vec<u16>,
    state: Arc<Mutex<SimState>>,
}

impl TransferBuffer for SimBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn start_transfer(&mut self, frame: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.has_fault(Fault::StartAt(frame)) {
            return Err(state.injected("start transfer"));
        }
        if state.in_flight.contains_key(&self.id) {
            return Err(DeviceError::new(
                ERR_BUFFER_BUSY,
                format!("Buffer {} already has a transfer queued", self.id.0),
            ));
        }
        let segment = state.readout.ok_or_else(|| {
            DeviceError::new(ERR_NOT_PREPARED, "Segment readout not prepared")
        })?;
        let valid = state
            .segments
            .get(&segment.get())
            .map_or(0, |s| s.valid_frames);
        if frame == 0 || frame > valid {
            return Err(DeviceError::new(
                ERR_FRAME_RANGE,
                format!("Frame {frame} outside segment {segment} (1..={valid})"),
            ));
        }

        state.cancelled.remove(&self.id);
        state.in_flight.insert(self.id, frame);
        state.stats.transfers_started += 1;
        state.stats.max_in_flight = state.stats.max_in_flight.max(state.in_flight.len());
        Ok(())
    }

    fn wait_for_completion(&mut self) -> Result<TransferStatus, DeviceError> {
        let mut state = self.state.lock();
        let Some(frame) = state.in_flight.remove(&self.id) else {
            if state.cancelled.remove(&self.id) {
                return Ok(TransferStatus::new(0, STATUS_CANCELLED));
            }
            return Err(DeviceError::new(
                ERR_WAIT,
                format!("Wait on buffer {} with no transfer queued", self.id.0),
            ));
        };

        if state.has_fault(Fault::WaitAt(frame)) {
            return Err(state.injected("wait for buffer"));
        }
        if state.has_fault(Fault::StatusAt(frame)) {
            return Ok(TransferStatus::new(0, STATUS_TRANSFER_FAILED));
        }

        let Some(pattern) = state
            .readout
            .and_then(|segment| state.segments.get(&segment.get()))
            .map(|s| s.pattern.clone())
        else {
            return Err(DeviceError::new(ERR_NOT_PREPARED, "Segment readout not prepared"));
        };
        state.stats.transfers_completed += 1;
        drop(state);

        pattern.fill(frame, self.geometry, &mut self.pixels);
        Ok(TransferStatus::OK)
    }

    fn pixels(&self) -> &[u16] {
        &self.pixels
    }
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(frame) = state.in_flight.remove(&self.id) {
            warn!(buffer = self.id.0, frame, "Buffer freed with a transfer still queued");
            state.stats.freed_while_in_flight += 1;
        }
        state.cancelled.remove(&self.id);
        state.stats.buffers_freed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(camera: &SimulatedCamera) -> SegmentId {
        let segment = SegmentId::new(1).unwrap();
        camera
            .prepare_readout(segment, FrameGeometry::new(2, 2))
            .unwrap();
        segment
    }

    #[test]
    fn test_transfer_fills_pattern() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        prepared(&camera);
        let mut buffer = camera.allocate_buffer(FrameGeometry::new(2, 2)).unwrap();

        buffer.start_transfer(3).unwrap();
        assert_eq!(camera.in_flight(), 1);
        assert!(buffer.wait_for_completion().unwrap().is_ok());
        assert_eq!(buffer.pixels(), &[3, 3, 3, 3]);
        assert_eq!(camera.in_flight(), 0);
    }

    #[test]
    fn test_buffer_ids_wrap_instead_of_overflowing() {
        let camera = SimulatedCamera::new();
        let geometry = FrameGeometry::new(1, 1);

        for _ in 0..=i16::MAX as usize {
            drop(camera.allocate_buffer(geometry).unwrap());
        }
        let wrapped = camera.allocate_buffer(geometry).unwrap();

        assert_eq!(wrapped.id(), BufferId(i16::MIN));
        assert_eq!(camera.stats().buffers_allocated, i16::MAX as usize + 2);
    }

    #[test]
    fn test_cancel_reports_cancelled_status() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        prepared(&camera);
        let mut buffer = camera.allocate_buffer(FrameGeometry::new(2, 2)).unwrap();

        buffer.start_transfer(1).unwrap();
        camera.cancel_all_transfers().unwrap();
        let status = buffer.wait_for_completion().unwrap();
        assert_eq!(status.driver, STATUS_CANCELLED);
    }

    #[test]
    fn test_drop_in_flight_is_counted() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        prepared(&camera);
        let mut buffer = camera.allocate_buffer(FrameGeometry::new(2, 2)).unwrap();
        buffer.start_transfer(1).unwrap();
        drop(buffer);

        let stats = camera.stats();
        assert_eq!(stats.freed_while_in_flight, 1);
        assert_eq!(stats.buffers_freed, 1);
    }

    #[test]
    fn test_busy_buffer_rejects_second_start() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        prepared(&camera);
        let mut buffer = camera.allocate_buffer(FrameGeometry::new(2, 2)).unwrap();
        buffer.start_transfer(1).unwrap();
        assert_eq!(buffer.start_transfer(2).unwrap_err().code, ERR_BUFFER_BUSY);
        camera.cancel_all_transfers().unwrap();
    }

    #[test]
    fn test_frame_out_of_range() {
        let camera =
            SimulatedCamera::new().with_segment(1, SimSegment::new(5, FrameGeometry::new(2, 2)));
        prepared(&camera);
        let mut buffer = camera.allocate_buffer(FrameGeometry::new(2, 2)).unwrap();
        assert_eq!(buffer.start_transfer(6).unwrap_err().code, ERR_FRAME_RANGE);
        assert_eq!(buffer.start_transfer(0).unwrap_err().code, ERR_FRAME_RANGE);
    }

    #[test]
    fn test_ramp_pattern() {
        let mut pixels = [0u16; 6];
        PixelPattern::Ramp.fill(1, FrameGeometry::new(3, 2), &mut pixels);
        assert_eq!(pixels, [1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_missing_segment() {
        let camera = SimulatedCamera::new();
        let err = camera.segment_info(SegmentId::new(4).unwrap()).unwrap_err();
        assert_eq!(err.code, ERR_NO_SEGMENT);
    }
}
