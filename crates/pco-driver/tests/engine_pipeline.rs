//! Pipeline behaviour of the transfer engine against the simulated camera.
#![cfg(feature = "mock")]

use pco_driver::{
    Fault, Frame, FrameConsumer, FrameGeometry, SegmentId, SimSegment, SimulatedCamera,
    TransferEngine, TransferError, TransferPlan,
};

const GEOMETRY: FrameGeometry = FrameGeometry::new(8, 4);

fn camera(valid_frames: u32) -> SimulatedCamera {
    SimulatedCamera::new().with_segment(1, SimSegment::new(valid_frames, GEOMETRY))
}

fn segment() -> SegmentId {
    SegmentId::new(1).unwrap()
}

/// Records indices and the first pixel of every frame.
#[derive(Default)]
struct Recorder {
    plan: Option<TransferPlan>,
    indices: Vec<usize>,
    first_pixels: Vec<u16>,
    fail_at: Option<usize>,
}

#[derive(Debug)]
enum RecorderError {
    Transfer(TransferError),
    Refused(usize),
}

impl From<TransferError> for RecorderError {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

impl FrameConsumer for Recorder {
    type Error = RecorderError;

    fn on_start(&mut self, plan: &TransferPlan) -> Result<(), RecorderError> {
        self.plan = Some(*plan);
        Ok(())
    }

    fn on_frame(&mut self, index: usize, frame: Frame<'_>) -> Result<(), RecorderError> {
        if self.fail_at == Some(index) {
            return Err(RecorderError::Refused(index));
        }
        self.indices.push(index);
        self.first_pixels.push(frame.pixels()[0]);
        Ok(())
    }
}

#[test]
fn delivers_in_order_with_skip() {
    let camera = camera(20);
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let delivered = engine.transfer(5, Some(100), &mut recorder).unwrap();

    assert_eq!(delivered, 15);
    assert_eq!(recorder.indices, (0..15).collect::<Vec<_>>());
    // Index i carries device frame skip + i + 1.
    assert_eq!(recorder.first_pixels, (6..=20).collect::<Vec<u16>>());
    let plan = recorder.plan.unwrap();
    assert_eq!(plan.frames, 15);
    assert_eq!(plan.geometry, GEOMETRY);
}

#[test]
fn never_more_than_two_transfers_in_flight() {
    let camera = camera(50);
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    engine.transfer(0, None, &mut recorder).unwrap();

    let stats = camera.stats();
    assert_eq!(stats.max_in_flight, 2);
    assert_eq!(stats.transfers_started, 50);
    assert_eq!(stats.transfers_completed, 50);
    assert_eq!(stats.buffers_allocated, 2);
    assert_eq!(stats.buffers_freed, 2);
    assert_eq!(stats.readouts_prepared, 1);
    assert!(stats.cancel_calls >= 1);
}

#[test]
fn skip_past_valid_frames_is_a_no_op() {
    for skip in [10, 11, 1000] {
        let camera = camera(10);
        let engine = TransferEngine::new(&camera, segment());
        let mut recorder = Recorder::default();

        assert_eq!(engine.transfer(skip, None, &mut recorder).unwrap(), 0);
        assert!(recorder.plan.is_none());
        assert!(recorder.indices.is_empty());
        assert_eq!(camera.stats().buffers_allocated, 0);
    }
}

#[test]
fn consumer_failure_cancels_before_free() {
    let camera = camera(10);
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder {
        fail_at: Some(3),
        ..Recorder::default()
    };

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    assert!(matches!(err, RecorderError::Refused(3)));
    assert_eq!(recorder.indices, vec![0, 1, 2]);
    let stats = camera.stats();
    assert!(stats.cancel_calls >= 1);
    assert_eq!(stats.freed_while_in_flight, 0);
    assert_eq!(stats.buffers_freed, 2);
    assert_eq!(camera.in_flight(), 0);
}

#[test]
fn bad_buffer_status_is_fatal() {
    let camera = camera(10).with_fault(Fault::StatusAt(4));
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    match err {
        RecorderError::Transfer(TransferError::BufferStatus { frame, status }) => {
            assert_eq!(frame, 4);
            assert!(!status.is_ok());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(recorder.indices, vec![0, 1, 2]);
    assert_eq!(camera.stats().freed_while_in_flight, 0);
}

#[test]
fn wait_failure_is_fatal() {
    let camera = camera(10).with_fault(Fault::WaitAt(2));
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    assert!(matches!(
        err,
        RecorderError::Transfer(TransferError::Wait { frame: 2, .. })
    ));
    assert_eq!(camera.stats().freed_while_in_flight, 0);
}

#[test]
fn start_failure_mid_run_cleans_up() {
    let camera = camera(10).with_fault(Fault::StartAt(6));
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    assert!(matches!(
        err,
        RecorderError::Transfer(TransferError::Device { operation: "start transfer", .. })
    ));
    // Frame 6 is armed after index 3 is consumed.
    assert_eq!(recorder.indices, vec![0, 1, 2, 3]);
    let stats = camera.stats();
    assert_eq!(stats.freed_while_in_flight, 0);
    assert_eq!(camera.in_flight(), 0);
}

#[test]
fn prepare_failure_after_allocation_still_frees() {
    let camera = camera(10).with_fault(Fault::PrepareReadout);
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    assert!(matches!(err, RecorderError::Transfer(TransferError::Device { .. })));
    assert!(recorder.plan.is_none());
    let stats = camera.stats();
    assert_eq!(stats.buffers_allocated, 2);
    assert_eq!(stats.buffers_freed, 2);
    assert!(stats.cancel_calls >= 1);
}

#[test]
fn second_allocation_failure_frees_the_first() {
    let camera = camera(10).with_fault(Fault::Allocation(2));
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    assert!(matches!(
        err,
        RecorderError::Transfer(TransferError::Device { operation: "allocate buffer", .. })
    ));
    let stats = camera.stats();
    assert_eq!(stats.buffers_allocated, 1);
    assert_eq!(stats.buffers_freed, 1);
}

#[test]
fn segment_query_failure_surfaces_device_text() {
    let camera = camera(10).with_fault(Fault::SegmentQuery);
    let engine = TransferEngine::new(&camera, segment());
    let mut recorder = Recorder::default();

    let err = engine.transfer(0, None, &mut recorder).unwrap_err();

    let RecorderError::Transfer(err) = err else {
        panic!("expected a transfer error");
    };
    assert!(err.to_string().contains("Injected fault: segment query"));
    assert_eq!(camera.stats().buffers_allocated, 0);
}

#[test]
fn geometry_query_failure_allocates_nothing() {
    let camera = camera(10).with_fault(Fault::GeometryQuery);
    let engine = TransferEngine::new(&camera, segment());

    let err = engine
        .transfer_with(0, None, |_, _| Ok::<(), TransferError>(()))
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::Device { operation: "query segment geometry", .. }
    ));
    let stats = camera.stats();
    assert_eq!(stats.buffers_allocated, 0);
    assert_eq!(stats.transfers_started, 0);
}

#[test]
fn missing_segment_is_a_device_error() {
    let camera = camera(10);
    let engine = TransferEngine::new(&camera, SegmentId::new(3).unwrap());

    let err = engine
        .transfer_with(0, None, |_, _| Ok::<(), TransferError>(()))
        .unwrap_err();

    assert!(matches!(err, TransferError::Device { operation: "query segment", .. }));
}
