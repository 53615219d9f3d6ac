// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests: synthetic source, CPU transform, software presenter

use edgecam::backends::SyntheticSource;
use edgecam::presenter::SoftwarePresenter;
use edgecam::{
    AppError, AppResult, CaptureConstraints, Dimensions, FramePresenter, FrameSource,
    FrameTransform, PipelineEvent, PipelineLoop, PipelineState, PixelBuffer,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

fn ready_transform() -> FrameTransform {
    let mut transform = FrameTransform::cpu();
    transform.initialize().unwrap();
    transform
}

fn vga() -> CaptureConstraints {
    CaptureConstraints {
        preferred: Dimensions::new(640, 480),
        ..Default::default()
    }
}

fn pipeline_with(source: SyntheticSource, presenter: Box<dyn FramePresenter>) -> PipelineLoop {
    PipelineLoop::new(Box::new(source), ready_transform(), presenter).with_constraints(vga())
}

fn software_pipeline(source: SyntheticSource) -> PipelineLoop {
    pipeline_with(source, Box::new(SoftwarePresenter::new()))
}

/// Presenter whose draws always fail
#[derive(Default)]
struct BrokenPresenter {
    dims: Option<Dimensions>,
    disposed: bool,
}

impl FramePresenter for BrokenPresenter {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn resize(&mut self, dims: Dimensions) -> AppResult<()> {
        self.dims = Some(dims);
        Ok(())
    }

    fn present(&mut self, _pixels: &PixelBuffer) -> AppResult<()> {
        Err(AppError::Present("device lost".into()))
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.dims
    }

    fn read_back(&mut self) -> AppResult<Option<&PixelBuffer>> {
        Ok(None)
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// One scripted `capture_frame` outcome
enum Capture {
    Fill([u8; 4]),
    Resize(Dimensions, [u8; 4]),
    Fail(AppError),
}

/// Source that replays a fixed list of capture outcomes
struct ScriptedSource {
    dims: Dimensions,
    script: VecDeque<Capture>,
    frame: PixelBuffer,
    active: bool,
}

impl ScriptedSource {
    fn new(dims: Dimensions, script: Vec<Capture>) -> Self {
        Self {
            dims,
            script: script.into(),
            frame: PixelBuffer::default(),
            active: false,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&mut self, _constraints: &CaptureConstraints) -> AppResult<Dimensions> {
        self.frame = PixelBuffer::filled(self.dims, [0, 0, 0, 255]);
        self.active = true;
        Ok(self.dims)
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.active.then(|| self.frame.dimensions())
    }

    fn capture_frame(&mut self) -> AppResult<()> {
        match self.script.pop_front() {
            Some(Capture::Fill(rgba)) => {
                self.frame = PixelBuffer::filled(self.frame.dimensions(), rgba);
                Ok(())
            }
            Some(Capture::Resize(dims, rgba)) => {
                self.frame = PixelBuffer::filled(dims, rgba);
                Ok(())
            }
            Some(Capture::Fail(e)) => Err(e),
            None => Ok(()),
        }
    }

    fn frame(&self) -> &PixelBuffer {
        &self.frame
    }

    fn close(&mut self) {
        self.active = false;
    }
}

fn scripted_pipeline(script: Vec<Capture>) -> (PipelineLoop, Rc<RefCell<Vec<PipelineEvent>>>) {
    let source = ScriptedSource::new(Dimensions::new(16, 12), script);
    let mut pipeline = PipelineLoop::new(
        Box::new(source),
        ready_transform(),
        Box::new(SoftwarePresenter::new()),
    )
    .with_processing(false);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
        sink.borrow_mut().push(event.clone());
    }));
    (pipeline, events)
}

fn error_count(events: &[PipelineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Error { .. }))
        .count()
}

#[test]
fn test_first_tick_presents_edge_map_at_negotiated_size() {
    let mut pipeline = software_pipeline(SyntheticSource::new());

    let dims = pipeline.start().unwrap();
    assert_eq!(dims, Dimensions::new(640, 480));
    assert_eq!(pipeline.presenter().dimensions(), Some(dims));

    let report = pipeline.tick().unwrap();
    assert_eq!(report.mode, "Edge Detection");
    assert_eq!(report.resolution, "640x480");
    assert!(report.transform_ms >= 0.0);

    let shown = pipeline.presenter_mut().read_back().unwrap().unwrap();
    assert_eq!(shown.dimensions(), dims);
    assert_eq!(shown.as_bytes().len(), 640 * 480 * 4);

    // Edge map: every pixel black or white, some of each
    let mut white = 0;
    let mut black = 0;
    for px in shown.as_bytes().chunks_exact(4) {
        match px[0] {
            255 => white += 1,
            0 => black += 1,
            other => panic!("non-binary edge value {}", other),
        }
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
    assert!(white > 0, "expected edges in the test pattern");
    assert!(black > white);
}

#[test]
fn test_missing_device_stays_idle_and_allows_retry() {
    let mut pipeline = software_pipeline(SyntheticSource::unavailable());

    for _ in 0..2 {
        assert!(matches!(
            pipeline.start(),
            Err(AppError::DeviceUnavailable(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    // Device becomes available
    pipeline
        .set_source(Box::new(SyntheticSource::new()))
        .unwrap();
    assert_eq!(pipeline.start().unwrap(), Dimensions::new(640, 480));
    assert_eq!(pipeline.state(), PipelineState::Running);
}

#[test]
fn test_toggle_off_presents_raw_frames() {
    let mut pipeline = software_pipeline(SyntheticSource::new());
    pipeline.start().unwrap();
    pipeline.tick().unwrap();

    assert!(!pipeline.toggle_processing());

    for _ in 0..3 {
        let report = pipeline.tick().unwrap();
        assert_eq!(report.mode, "Raw Feed");

        let raw = pipeline.source().frame().clone();
        let shown = pipeline.presenter_mut().read_back().unwrap().unwrap();
        assert_eq!(shown, &raw);
    }

    assert!(pipeline.toggle_processing());
    assert_eq!(pipeline.tick().unwrap().mode, "Edge Detection");
}

#[test]
fn test_stop_while_idle_is_noop() {
    let mut pipeline = software_pipeline(SyntheticSource::new());
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
        sink.borrow_mut().push(event.clone());
    }));

    pipeline.stop();

    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(events.borrow().is_empty());
}

#[test]
fn test_start_while_running_is_rejected() {
    let mut pipeline = software_pipeline(SyntheticSource::new());
    pipeline.start().unwrap();

    assert!(matches!(pipeline.start(), Err(AppError::InvalidState(_))));
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(pipeline.tick().is_ok());
}

#[test]
fn test_toggle_while_idle_has_no_effect() {
    let mut pipeline = software_pipeline(SyntheticSource::new());

    assert!(pipeline.toggle_processing());
    assert!(pipeline.is_processing_enabled());

    pipeline.start().unwrap();
    assert_eq!(pipeline.tick().unwrap().mode, "Edge Detection");
}

#[test]
fn test_presenter_failure_stops_pipeline() {
    let mut pipeline = pipeline_with(SyntheticSource::new(), Box::new(BrokenPresenter::default()));
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
        if let PipelineEvent::Error { message } = event {
            sink.borrow_mut().push(message.clone());
        }
    }));

    pipeline.start().unwrap();
    assert!(matches!(pipeline.tick(), Err(AppError::Present(_))));

    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(!pipeline.source().is_active());
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("device lost"));
}

#[test]
fn test_stop_keeps_transform_and_presenter() {
    let mut pipeline = software_pipeline(SyntheticSource::new());
    pipeline.start().unwrap();
    pipeline.tick().unwrap();
    pipeline.stop();

    assert!(pipeline.transform().is_ready());
    assert_eq!(
        pipeline.presenter().dimensions(),
        Some(Dimensions::new(640, 480))
    );

    pipeline.start().unwrap();
    pipeline.tick().unwrap();
    assert_eq!(pipeline.transform().scratch_allocations(), 1);
}

#[test]
fn test_fixed_resolution_source_resizes_presenter() {
    let negotiated = Dimensions::new(320, 240);
    let mut pipeline = software_pipeline(SyntheticSource::with_fixed_resolution(negotiated));

    assert_eq!(pipeline.start().unwrap(), negotiated);
    assert_eq!(pipeline.tick().unwrap().resolution, "320x240");
    assert_eq!(pipeline.presenter().dimensions(), Some(negotiated));
}

#[test]
fn test_capture_failure_presents_previous_frame() {
    let red = [200, 10, 10, 255];
    let green = [10, 200, 10, 255];
    let (mut pipeline, events) = scripted_pipeline(vec![
        Capture::Fill(red),
        Capture::Fail(AppError::Capture("dequeue timed out".into())),
        Capture::Resize(Dimensions::new(8, 6), green),
    ]);
    pipeline.start().unwrap();

    assert_eq!(pipeline.tick().unwrap().resolution, "16x12");

    let report = pipeline.tick().unwrap();
    assert_eq!(report.resolution, "16x12");
    assert_eq!(pipeline.state(), PipelineState::Running);
    let shown = pipeline.presenter_mut().read_back().unwrap().unwrap();
    assert_eq!(shown, &PixelBuffer::filled(Dimensions::new(16, 12), red));
    assert_eq!(error_count(&events.borrow()), 0);

    // Frame size changes mid-run
    let report = pipeline.tick().unwrap();
    assert_eq!(report.resolution, "8x6");
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert_eq!(
        pipeline.presenter().dimensions(),
        Some(Dimensions::new(8, 6))
    );
    let shown = pipeline.presenter_mut().read_back().unwrap().unwrap();
    assert_eq!(shown, &PixelBuffer::filled(Dimensions::new(8, 6), green));
}

#[test]
fn test_unrecoverable_source_error_stops_pipeline() {
    let (mut pipeline, events) = scripted_pipeline(vec![
        Capture::Fill([1, 2, 3, 255]),
        Capture::Fail(AppError::InvalidState("stream closed".into())),
    ]);
    pipeline.start().unwrap();
    pipeline.tick().unwrap();

    assert!(matches!(pipeline.tick(), Err(AppError::InvalidState(_))));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(!pipeline.source().is_active());
    assert_eq!(error_count(&events.borrow()), 1);
}
