// SPDX-License-Identifier: GPL-3.0-only

//! Frame transform
//!
//! [`FrameTransform`] turns an RGBA frame into an RGBA frame of the same
//! size. The engine behind it is loaded once with a bounded wait, and its
//! availability is tracked explicitly in [`EngineState`].
//!
//! Processing never fails outwards: when the engine is not ready, or any step
//! reports an error, `apply` hands back the caller's input untouched.

pub mod context;
pub mod engine;

pub use context::TransformContext;
pub use engine::{CpuEngine, EngineLoader, ImageEngine, cpu_loader};

use crate::constants::timing::{ENGINE_INIT_TIMEOUT, FRAME_LOG_INTERVAL};
use crate::constants::{TransformMode, edges};
use crate::errors::{AppError, AppResult};
use crate::frame::PixelBuffer;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gradient thresholds of the edge operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub low: u16,
    pub high: u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: edges::LOW_THRESHOLD,
            high: edges::HIGH_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> AppResult<()> {
        if self.low > self.high {
            return Err(AppError::Config(format!(
                "low threshold {} is above high threshold {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Whether an engine is loaded
pub enum EngineState {
    NotReady,
    Ready {
        engine: Box<dyn ImageEngine>,
        context: TransformContext,
    },
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::NotReady => write!(f, "NotReady"),
            EngineState::Ready { engine, context } => f
                .debug_struct("Ready")
                .field("engine", &engine.name())
                .field("dimensions", &context.dimensions())
                .finish(),
        }
    }
}

/// Stateful, mode-switchable image transform
pub struct FrameTransform {
    loader: EngineLoader,
    timeout: Duration,
    thresholds: Thresholds,
    state: EngineState,
    last_duration_ms: f64,
    failures: u64,
}

impl FrameTransform {
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            loader,
            timeout: ENGINE_INIT_TIMEOUT,
            thresholds: Thresholds::default(),
            state: EngineState::NotReady,
            last_duration_ms: 0.0,
            failures: 0,
        }
    }

    /// Transform backed by the built-in CPU engine
    pub fn cpu() -> Self {
        Self::new(cpu_loader())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> AppResult<()> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    /// Load the engine, waiting at most the configured timeout.
    ///
    /// Returns immediately once ready. On failure the transform stays
    /// not-ready; calling again retries the load.
    pub fn initialize(&mut self) -> AppResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        info!(timeout_ms = self.timeout.as_millis() as u64, "Loading transform engine");

        let loader = self.loader.clone();
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("engine-loader".into())
            .spawn(move || {
                // Receiver may be gone after a timeout
                let _ = sender.send(loader());
            })
            .map_err(|e| AppError::EngineUnavailable(format!("failed to spawn loader: {}", e)))?;

        let engine = match receiver.recv_timeout(self.timeout) {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => {
                warn!(error = %e, "Engine failed to load");
                let msg = match e {
                    AppError::EngineUnavailable(msg) => msg,
                    other => other.to_string(),
                };
                return Err(AppError::EngineUnavailable(msg));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Engine load timed out");
                return Err(AppError::EngineUnavailable(format!(
                    "engine did not load within {} ms",
                    self.timeout.as_millis()
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AppError::EngineUnavailable(
                    "engine loader exited without a result".into(),
                ));
            }
        };

        info!(engine = engine.name(), "Transform engine ready");
        self.state = EngineState::Ready {
            engine,
            context: TransformContext::new(),
        };
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Transform `input` according to `mode`.
    ///
    /// The result always has the input's dimensions. It is the transform's
    /// own output buffer on success and `input` itself otherwise.
    pub fn apply<'a>(&'a mut self, input: &'a PixelBuffer, mode: TransformMode) -> &'a PixelBuffer {
        let started = Instant::now();
        let outcome = self.process(input, mode);
        self.last_duration_ms = round_ms(started.elapsed());

        match outcome {
            Ok(true) => match &self.state {
                EngineState::Ready { context, .. } => &context.output,
                EngineState::NotReady => input,
            },
            Ok(false) => input,
            Err(e) => {
                self.failures += 1;
                if self.failures % FRAME_LOG_INTERVAL == 1 {
                    warn!(
                        error = %e,
                        failures = self.failures,
                        "Frame transform failed, passing frame through"
                    );
                }
                input
            }
        }
    }

    /// Returns Ok(false) when there is nothing to do
    fn process(&mut self, input: &PixelBuffer, mode: TransformMode) -> AppResult<bool> {
        let EngineState::Ready { engine, context } = &mut self.state else {
            return Ok(false);
        };
        let dims = input.dimensions();
        if dims.is_empty() {
            return Ok(false);
        }

        context.ensure(dims);
        engine.luminance(input, &mut context.gray)?;

        match mode {
            TransformMode::Grayscale => {
                context.gray.expand_into(&mut context.output);
            }
            TransformMode::EdgeDetect => {
                engine.smooth(&context.gray, &mut context.blurred, &mut context.blur_tmp)?;
                engine.edges(
                    &context.blurred,
                    &mut context.edges,
                    self.thresholds,
                    &mut context.canny,
                )?;
                context.edges.expand_into(&mut context.output);
            }
        }
        Ok(true)
    }

    /// Wall-clock milliseconds of the last `apply`, two decimals
    pub fn last_duration(&self) -> f64 {
        self.last_duration_ms
    }

    /// Number of scratch (re)allocations since the engine became ready
    pub fn scratch_allocations(&self) -> u32 {
        match &self.state {
            EngineState::Ready { context, .. } => context.allocations(),
            EngineState::NotReady => 0,
        }
    }

    /// Release the engine and scratch buffers
    pub fn dispose(&mut self) {
        if let EngineState::Ready { engine, context } = &self.state {
            debug!(
                engine = engine.name(),
                allocations = context.allocations(),
                "Disposing transform engine"
            );
        }
        self.state = EngineState::NotReady;
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Dimensions, Plane};
    use super::context::CannyScratch;
    use std::sync::Arc;

    /// Engine that scribbles over its output and then fails
    struct FailingEngine;

    impl ImageEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn luminance(&self, _input: &PixelBuffer, out: &mut Plane) -> AppResult<()> {
            out.as_mut_slice().fill(7);
            Ok(())
        }

        fn smooth(&self, _input: &Plane, out: &mut Plane, _tmp: &mut Vec<u16>) -> AppResult<()> {
            out.as_mut_slice().fill(9);
            Err(AppError::TransformRuntime("injected".into()))
        }

        fn edges(
            &self,
            _input: &Plane,
            _out: &mut Plane,
            _thresholds: Thresholds,
            _scratch: &mut CannyScratch,
        ) -> AppResult<()> {
            unreachable!()
        }
    }

    fn gradient(dims: Dimensions) -> PixelBuffer {
        let mut buffer = PixelBuffer::new(dims);
        let w = dims.width as usize;
        for (i, px) in buffer.as_bytes_mut().chunks_exact_mut(4).enumerate() {
            let x = (i % w) as u8;
            px.copy_from_slice(&[x.wrapping_mul(13), x.wrapping_mul(7), 40, 255]);
        }
        buffer
    }

    fn ready() -> FrameTransform {
        let mut transform = FrameTransform::cpu();
        transform.initialize().unwrap();
        transform
    }

    #[test]
    fn test_output_dimensions_match_input() {
        let mut transform = ready();
        for (w, h) in [(1, 1), (2, 3), (17, 5), (64, 48), (640, 480)] {
            let dims = Dimensions::new(w, h);
            let input = gradient(dims);
            for mode in TransformMode::ALL {
                let out = transform.apply(&input, mode);
                assert_eq!(out.dimensions(), dims, "{:?} at {}", mode, dims);
                assert_eq!(out.as_bytes().len(), dims.rgba_len());
            }
        }
    }

    #[test]
    fn test_no_reallocation_at_stable_dimensions() {
        let mut transform = ready();
        let input = gradient(Dimensions::new(64, 48));
        for _ in 0..10 {
            transform.apply(&input, TransformMode::EdgeDetect);
        }
        assert_eq!(transform.scratch_allocations(), 1);

        let other = gradient(Dimensions::new(32, 24));
        transform.apply(&other, TransformMode::EdgeDetect);
        assert_eq!(transform.scratch_allocations(), 2);
    }

    #[test]
    fn test_not_ready_passes_through() {
        let mut transform = FrameTransform::cpu();
        let input = gradient(Dimensions::new(8, 8));
        let snapshot = input.clone();
        for mode in [TransformMode::EdgeDetect, TransformMode::Grayscale] {
            let out = transform.apply(&input, mode);
            assert!(std::ptr::eq(out, &input), "{:?} did not pass through", mode);
            assert_eq!(out, &snapshot);
        }
    }

    #[test]
    fn test_failure_returns_input_unchanged() {
        let loader: EngineLoader = Arc::new(|| Ok(Box::new(FailingEngine) as Box<dyn ImageEngine>));
        let mut transform = FrameTransform::new(loader);
        transform.initialize().unwrap();

        let input = gradient(Dimensions::new(16, 16));
        let snapshot = input.clone();
        let out = transform.apply(&input, TransformMode::EdgeDetect);

        assert_eq!(out.as_bytes(), snapshot.as_bytes());
        assert_eq!(out.dimensions(), snapshot.dimensions());
    }

    #[test]
    fn test_grayscale_output() {
        let mut transform = ready();
        let input = PixelBuffer::filled(Dimensions::new(4, 4), [255, 0, 0, 255]);
        let out = transform.apply(&input, TransformMode::Grayscale);
        assert_eq!(out.pixel(0, 0), Some([76, 76, 76, 255]));
    }

    #[test]
    fn test_edge_output_is_binary() {
        let mut transform = ready();
        let input = gradient(Dimensions::new(40, 30));
        let out = transform.apply(&input, TransformMode::EdgeDetect);
        for px in out.as_bytes().chunks_exact(4) {
            assert!(px[0] == 0 || px[0] == 255);
            assert_eq!(px[0], px[1]);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_initialize_timeout() {
        let loader: EngineLoader = Arc::new(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(Box::new(CpuEngine) as Box<dyn ImageEngine>)
        });
        let mut transform = FrameTransform::new(loader).with_timeout(Duration::from_millis(20));

        let err = transform.initialize().unwrap_err();
        assert!(matches!(err, AppError::EngineUnavailable(_)));
        assert!(!transform.is_ready());
    }

    #[test]
    fn test_initialize_load_error() {
        let loader: EngineLoader =
            Arc::new(|| Err(AppError::EngineUnavailable("missing library".into())));
        let mut transform = FrameTransform::new(loader);
        assert_eq!(
            transform.initialize(),
            Err(AppError::EngineUnavailable("missing library".into()))
        );
    }

    #[test]
    fn test_initialize_idempotent() {
        let mut transform = ready();
        let input = gradient(Dimensions::new(8, 8));
        transform.apply(&input, TransformMode::EdgeDetect);
        transform.initialize().unwrap();
        // Context survived the second call
        assert_eq!(transform.scratch_allocations(), 1);
    }

    #[test]
    fn test_dispose_without_initialize() {
        let mut transform = FrameTransform::cpu();
        transform.dispose();
        transform.dispose();
        assert!(!transform.is_ready());
    }

    #[test]
    fn test_last_duration() {
        let mut transform = ready();
        assert_eq!(transform.last_duration(), 0.0);

        let input = gradient(Dimensions::new(64, 64));
        transform.apply(&input, TransformMode::EdgeDetect);
        let ms = transform.last_duration();
        assert!(ms >= 0.0);
        assert_eq!((ms * 100.0).round() / 100.0, ms);
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(Duration::from_micros(1234)), 1.23);
        assert_eq!(round_ms(Duration::from_micros(1236)), 1.24);
    }
}
