// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipeline
//!
//! `PipelineLoop` owns the source, the transform and the presenter and drives
//! one tick at a time: capture, transform or pass through, present, measure.
//! Ticks never overlap, so none of the owned state needs synchronization.
//!
//! ```text
//!        start                      stop
//! Idle ───────► Starting ──► Running ───────► Stopping ──► Idle
//!   ▲              │ open failed
//!   └──────────────┘
//! ```

pub mod scheduler;

pub use scheduler::{LoopAction, TickScheduler};

use crate::backends::{CaptureConstraints, FrameSource};
use crate::clock::FrameClock;
use crate::constants::{TransformMode, mode_label, timing::FRAME_LOG_INTERVAL};
use crate::errors::{AppError, AppResult};
use crate::frame::Dimensions;
use crate::presenter::FramePresenter;
use crate::transform::FrameTransform;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// What observers see after every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    /// Ticks since the last start, starting at 1
    pub tick: u64,
    /// Frames per second over the last measurement window
    pub fps: u32,
    /// "Edge Detection", "Grayscale" or "Raw Feed"
    pub mode: String,
    /// Presented resolution as "WxH"
    pub resolution: String,
    /// Duration of the most recent transform in milliseconds
    pub transform_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    Started {
        resolution: String,
    },
    Tick(TickReport),
    Error {
        message: String,
    },
}

/// Receives pipeline events on the pipeline's thread
pub trait PipelineObserver {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F> PipelineObserver for F
where
    F: FnMut(&PipelineEvent),
{
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event)
    }
}

pub struct PipelineLoop {
    source: Box<dyn FrameSource>,
    transform: FrameTransform,
    presenter: Box<dyn FramePresenter>,
    clock: FrameClock,
    state: PipelineState,
    constraints: CaptureConstraints,
    processing_enabled: bool,
    mode: TransformMode,
    /// Size the presenter was last resized to
    presented: Option<Dimensions>,
    observers: Vec<Box<dyn PipelineObserver>>,
    tick_index: u64,
    capture_failures: u64,
    shut_down: bool,
}

impl PipelineLoop {
    /// Assemble a pipeline. The transform should already be initialized;
    /// `start` is rejected until it is.
    pub fn new(
        source: Box<dyn FrameSource>,
        transform: FrameTransform,
        presenter: Box<dyn FramePresenter>,
    ) -> Self {
        Self {
            source,
            transform,
            presenter,
            clock: FrameClock::new(),
            state: PipelineState::Idle,
            constraints: CaptureConstraints::default(),
            processing_enabled: true,
            mode: TransformMode::default(),
            presented: None,
            observers: Vec::new(),
            tick_index: 0,
            capture_failures: 0,
            shut_down: false,
        }
    }

    pub fn with_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_processing(mut self, enabled: bool) -> Self {
        self.processing_enabled = enabled;
        self
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    pub fn is_processing_enabled(&self) -> bool {
        self.processing_enabled
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// Label for what the next tick presents
    pub fn mode_label(&self) -> &'static str {
        mode_label(self.processing_enabled, self.mode)
    }

    /// Frames per second as of the last tick
    pub fn fps(&self) -> u32 {
        self.clock.rate()
    }

    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    pub fn presenter(&self) -> &dyn FramePresenter {
        self.presenter.as_ref()
    }

    pub fn presenter_mut(&mut self) -> &mut dyn FramePresenter {
        self.presenter.as_mut()
    }

    /// Swap the frame source, e.g. after the user picks another device.
    ///
    /// Only allowed while idle.
    pub fn set_source(&mut self, source: Box<dyn FrameSource>) -> AppResult<()> {
        if self.state != PipelineState::Idle {
            return Err(AppError::InvalidState(format!(
                "cannot change source while {}",
                self.state
            )));
        }
        self.source.close();
        info!(source = source.name(), "Frame source replaced");
        self.source = source;
        Ok(())
    }

    /// Select the transform used while processing is enabled
    pub fn set_mode(&mut self, mode: TransformMode) {
        if self.mode != mode {
            info!(mode = mode.display_name(), "Transform mode changed");
            self.mode = mode;
        }
    }

    /// Open the source and begin running.
    ///
    /// Returns the negotiated resolution. On failure the pipeline is back in
    /// `Idle` and start may be retried.
    pub fn start(&mut self) -> AppResult<Dimensions> {
        if self.shut_down {
            return Err(AppError::InvalidState("pipeline has been shut down".into()));
        }
        if self.state != PipelineState::Idle {
            return Err(AppError::InvalidState(format!(
                "cannot start while {}",
                self.state
            )));
        }
        if !self.transform.is_ready() {
            let err = AppError::EngineUnavailable("transform engine is not ready".into());
            self.emit(PipelineEvent::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        self.set_state(PipelineState::Starting);

        let dims = match self.source.open(&self.constraints) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Failed to open frame source");
                self.set_state(PipelineState::Idle);
                self.emit(PipelineEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = self.presenter.resize(dims) {
            error!(error = %e, "Failed to size presenter");
            self.source.close();
            self.set_state(PipelineState::Idle);
            self.emit(PipelineEvent::Error {
                message: e.to_string(),
            });
            return Err(e);
        }
        self.presented = Some(dims);

        if dims != self.constraints.preferred {
            info!(
                requested = %self.constraints.preferred,
                negotiated = %dims,
                "Source negotiated a different resolution"
            );
        }

        self.clock.reset();
        self.tick_index = 0;
        self.capture_failures = 0;
        self.set_state(PipelineState::Running);
        self.emit(PipelineEvent::Started {
            resolution: dims.to_string(),
        });
        Ok(dims)
    }

    /// Run one iteration: capture, transform or pass through, present, measure
    pub fn tick(&mut self) -> AppResult<TickReport> {
        if self.state != PipelineState::Running {
            return Err(AppError::InvalidState(format!(
                "cannot tick while {}",
                self.state
            )));
        }

        if let Err(e) = self.source.capture_frame() {
            if !e.is_recoverable() {
                return Err(self.fail(e));
            }
            // Keep presenting the previous frame
            if self.capture_failures % FRAME_LOG_INTERVAL == 0 {
                warn!(failures = self.capture_failures + 1, error = %e, "Frame capture failed");
            }
            self.capture_failures += 1;
        }

        let dims = self.source.frame().dimensions();
        if self.presented != Some(dims) {
            debug!(from = ?self.presented, to = %dims, "Frame size changed");
            if let Err(e) = self.presenter.resize(dims) {
                return Err(self.fail(e));
            }
            self.presented = Some(dims);
        }

        let presented = if self.processing_enabled {
            let output = self.transform.apply(self.source.frame(), self.mode);
            self.presenter.present(output)
        } else {
            self.presenter.present(self.source.frame())
        };
        if let Err(e) = presented {
            return Err(self.fail(e));
        }

        let fps = self.clock.tick();
        self.tick_index += 1;

        let report = TickReport {
            tick: self.tick_index,
            fps,
            mode: self.mode_label().to_string(),
            resolution: dims.to_string(),
            transform_ms: self.transform.last_duration(),
        };

        if self.tick_index % FRAME_LOG_INTERVAL == 0 {
            debug!(
                tick = report.tick,
                fps = report.fps,
                mode = %report.mode,
                transform_ms = report.transform_ms,
                "Pipeline tick"
            );
        }

        self.emit(PipelineEvent::Tick(report.clone()));
        Ok(report)
    }

    /// Stop running: close the source and reset the clock.
    ///
    /// Transform and presenter stay alive for the next start. A no-op while
    /// idle.
    pub fn stop(&mut self) {
        if self.state != PipelineState::Running {
            debug!(state = %self.state, "Stop ignored");
            return;
        }

        self.set_state(PipelineState::Stopping);
        self.source.close();
        self.clock.reset();
        self.set_state(PipelineState::Idle);
        info!(ticks = self.tick_index, "Pipeline stopped");
    }

    /// Flip processing on or off; returns the resulting flag.
    ///
    /// Only honored while running.
    pub fn toggle_processing(&mut self) -> bool {
        if self.state != PipelineState::Running {
            debug!(state = %self.state, "Processing toggle ignored");
            return self.processing_enabled;
        }
        self.processing_enabled = !self.processing_enabled;
        info!(label = self.mode_label(), "Processing toggled");
        self.processing_enabled
    }

    /// Tick on `scheduler` until stopped, a tick fails, or `limit` ticks ran.
    ///
    /// A stop request on the scheduler only prevents further ticks; the
    /// pipeline stays `Running` so the caller decides whether to `stop`.
    pub fn run(&mut self, scheduler: &mut TickScheduler, limit: Option<u64>) -> AppResult<u64> {
        let mut failure = None;
        let ticks = scheduler.run(|| {
            if self.state != PipelineState::Running {
                return LoopAction::Stop;
            }
            match self.tick() {
                Ok(report) if limit.is_some_and(|max| report.tick >= max) => LoopAction::Stop,
                Ok(_) => LoopAction::Continue,
                Err(e) => {
                    failure = Some(e);
                    LoopAction::Stop
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(ticks),
        }
    }

    /// Stop, then release the transform and presenter. Further calls are
    /// no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.stop();
        self.source.close();
        self.transform.dispose();
        self.presenter.dispose();
        self.shut_down = true;
        info!("Pipeline shut down");
    }

    /// Per-tick presenter failure: stop and report
    fn fail(&mut self, err: AppError) -> AppError {
        error!(error = %err, "Tick failed, stopping pipeline");
        self.emit(PipelineEvent::Error {
            message: err.to_string(),
        });
        self.stop();
        err
    }

    fn set_state(&mut self, to: PipelineState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(%from, %to, "Pipeline state changed");
        self.emit(PipelineEvent::StateChanged { from, to });
    }

    fn emit(&mut self, event: PipelineEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

impl Drop for PipelineLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::synthetic::SyntheticSource;
    use crate::presenter::SoftwarePresenter;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ready_transform() -> FrameTransform {
        let mut transform = FrameTransform::cpu();
        transform.initialize().unwrap();
        transform
    }

    fn pipeline(source: SyntheticSource) -> PipelineLoop {
        PipelineLoop::new(
            Box::new(source),
            ready_transform(),
            Box::new(SoftwarePresenter::new()),
        )
        .with_constraints(CaptureConstraints {
            preferred: Dimensions::new(64, 48),
            ..Default::default()
        })
    }

    fn record(pipeline: &mut PipelineLoop) -> Rc<RefCell<Vec<PipelineEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        pipeline.add_observer(Box::new(move |event: &PipelineEvent| {
            sink.borrow_mut().push(event.clone());
        }));
        events
    }

    #[test]
    fn test_start_walks_through_starting() {
        let mut pipeline = pipeline(SyntheticSource::new());
        let events = record(&mut pipeline);

        let dims = pipeline.start().unwrap();
        assert_eq!(dims, Dimensions::new(64, 48));
        assert_eq!(pipeline.state(), PipelineState::Running);

        let events = events.borrow();
        assert_eq!(
            events[0],
            PipelineEvent::StateChanged {
                from: PipelineState::Idle,
                to: PipelineState::Starting
            }
        );
        assert_eq!(
            events[1],
            PipelineEvent::StateChanged {
                from: PipelineState::Starting,
                to: PipelineState::Running
            }
        );
        assert_eq!(
            events[2],
            PipelineEvent::Started {
                resolution: "64x48".into()
            }
        );
    }

    #[test]
    fn test_start_requires_ready_engine() {
        let mut pipeline = PipelineLoop::new(
            Box::new(SyntheticSource::new()),
            FrameTransform::cpu(),
            Box::new(SoftwarePresenter::new()),
        );
        assert!(matches!(
            pipeline.start(),
            Err(AppError::EngineUnavailable(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_failed_open_reports_error() {
        let mut pipeline = pipeline(SyntheticSource::unavailable());
        let events = record(&mut pipeline);

        assert!(matches!(
            pipeline.start(),
            Err(AppError::DeviceUnavailable(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(
            events
                .borrow()
                .iter()
                .any(|e| matches!(e, PipelineEvent::Error { .. }))
        );
    }

    #[test]
    fn test_tick_reports_label_and_resolution() {
        let mut pipeline = pipeline(SyntheticSource::new());
        pipeline.start().unwrap();

        let report = pipeline.tick().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.mode, "Edge Detection");
        assert_eq!(report.resolution, "64x48");

        pipeline.set_mode(TransformMode::Grayscale);
        assert_eq!(pipeline.tick().unwrap().mode, "Grayscale");
    }

    #[test]
    fn test_tick_while_idle_is_rejected() {
        let mut pipeline = pipeline(SyntheticSource::new());
        assert!(matches!(pipeline.tick(), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_negotiated_resolution_sizes_presenter() {
        let mut pipeline = pipeline(SyntheticSource::with_fixed_resolution(Dimensions::new(
            32, 16,
        )));
        let dims = pipeline.start().unwrap();
        assert_eq!(dims, Dimensions::new(32, 16));
        assert_eq!(pipeline.presenter().dimensions(), Some(dims));
    }

    #[test]
    fn test_stop_resets_and_allows_restart() {
        let mut pipeline = pipeline(SyntheticSource::new());
        pipeline.start().unwrap();
        pipeline.tick().unwrap();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(!pipeline.source().is_active());
        assert_eq!(pipeline.fps(), 0);

        pipeline.start().unwrap();
        assert_eq!(pipeline.tick().unwrap().tick, 1);
    }

    #[test]
    fn test_set_source_only_while_idle() {
        let mut pipeline = pipeline(SyntheticSource::new());
        pipeline.start().unwrap();
        assert!(
            pipeline
                .set_source(Box::new(SyntheticSource::new()))
                .is_err()
        );
        pipeline.stop();
        assert!(
            pipeline
                .set_source(Box::new(SyntheticSource::new()))
                .is_ok()
        );
    }

    #[test]
    fn test_run_stops_at_limit() {
        let mut pipeline = pipeline(SyntheticSource::new());
        pipeline.start().unwrap();
        let mut scheduler = TickScheduler::new(1000);
        let ticks = pipeline.run(&mut scheduler, Some(5)).unwrap();
        assert_eq!(ticks, 5);
        assert!(pipeline.is_running());
    }

    #[test]
    fn test_run_without_start_does_nothing() {
        let mut pipeline = pipeline(SyntheticSource::new());
        let mut scheduler = TickScheduler::new(1000);
        pipeline.run(&mut scheduler, None).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.presenter().dimensions(), None);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut pipeline = pipeline(SyntheticSource::new());
        pipeline.start().unwrap();
        pipeline.shutdown();
        pipeline.shutdown();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(!pipeline.transform().is_ready());
        assert!(matches!(pipeline.start(), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let event = PipelineEvent::Started {
            resolution: "640x480".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"started","resolution":"640x480"}"#);
    }
}
