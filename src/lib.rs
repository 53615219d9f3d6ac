// SPDX-License-Identifier: GPL-3.0-only

//! edgecam - real-time camera edge detection
//!
//! Captures frames from a camera (or a synthetic pattern), optionally turns
//! them into an edge map, and presents the result through a GPU textured quad.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame sources (V4L2 capture, synthetic pattern)
//! - [`transform`]: Grayscale and edge-detection transform with scratch reuse
//! - [`presenter`]: wgpu and software presenters
//! - [`pipeline`]: Tick loop, lifecycle state machine and observers
//! - [`clock`]: Frame rate measurement
//! - [`config`]: User configuration handling
//! - [`terminal`]: Terminal viewer
//!
//! # Example
//!
//! ```ignore
//! let config = edgecam::Config::load()?;
//! let mut pipeline = edgecam::app::assemble(&config)?;
//! pipeline.start()?;
//! let report = pipeline.tick()?;
//! println!("{} fps, {}", report.fps, report.mode);
//! ```

pub mod app;
pub mod backends;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod presenter;
pub mod terminal;
pub mod transform;

// Re-export commonly used types
pub use backends::{CaptureConstraints, FrameSource};
pub use clock::FrameClock;
pub use config::Config;
pub use constants::TransformMode;
pub use errors::{AppError, AppResult};
pub use frame::{Dimensions, PixelBuffer};
pub use pipeline::{PipelineEvent, PipelineLoop, PipelineState, TickReport, TickScheduler};
pub use presenter::{FramePresenter, PresenterKind};
pub use transform::FrameTransform;
