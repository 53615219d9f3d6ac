// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources
//!
//! A [`FrameSource`] owns one capture session at a time and snapshots the
//! live signal into a buffer it owns:
//!
//! ```text
//! open(constraints) ──► capture_frame() ──► frame() ──► ... ──► close()
//!        │                    (repeated every tick)
//!        └── negotiated Dimensions
//! ```
//!
//! # Modules
//!
//! - [`synthetic`]: moving test pattern, no hardware required
//! - [`v4l2`]: Video4Linux2 capture devices (Linux only)
//! - [`format_converters`]: packed device formats to RGBA

pub mod format_converters;
pub mod synthetic;
#[cfg(target_os = "linux")]
pub mod v4l2;

use crate::config::{Config, SourceKind};
use crate::errors::AppResult;
use crate::frame::{Dimensions, PixelBuffer};
use serde::{Deserialize, Serialize};

pub use synthetic::SyntheticSource;

/// Which way the camera should face
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Facing {
    /// Towards the user (front camera)
    #[default]
    User,
    /// Away from the user (rear camera)
    Environment,
}

/// Preferences passed to [`FrameSource::open`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub preferred: Dimensions,
    pub facing: Facing,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            preferred: Dimensions::new(
                crate::constants::capture::DEFAULT_WIDTH,
                crate::constants::capture::DEFAULT_HEIGHT,
            ),
            facing: Facing::User,
        }
    }
}

/// A capture device producing RGBA frames on demand
pub trait FrameSource {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open an exclusive session and return the negotiated dimensions.
    ///
    /// An already open session is closed first. Fails with
    /// [`crate::errors::AppError::DeviceUnavailable`] when no device grants access.
    fn open(&mut self, constraints: &CaptureConstraints) -> AppResult<Dimensions>;

    /// Whether a session is open
    fn is_active(&self) -> bool;

    /// Negotiated dimensions of the open session
    fn dimensions(&self) -> Option<Dimensions>;

    /// Snapshot the live signal into the owned buffer.
    ///
    /// Does nothing when no session is open.
    fn capture_frame(&mut self) -> AppResult<()>;

    /// Most recently captured frame
    fn frame(&self) -> &PixelBuffer;

    /// Release the session. Safe to call repeatedly or before `open`.
    fn close(&mut self);
}

/// Build the source selected in the configuration
pub fn create_source(config: &Config) -> Box<dyn FrameSource> {
    match config.source {
        SourceKind::Synthetic => Box::new(SyntheticSource::new()),
        SourceKind::Device => device_source(&config.device_path),
    }
}

#[cfg(target_os = "linux")]
fn device_source(path: &str) -> Box<dyn FrameSource> {
    Box::new(v4l2::V4l2Source::new(path))
}

#[cfg(not(target_os = "linux"))]
fn device_source(path: &str) -> Box<dyn FrameSource> {
    Box::new(UnsupportedSource {
        path: path.to_string(),
        frame: PixelBuffer::default(),
    })
}

/// Stand-in for platforms without a capture backend; never opens
#[cfg(not(target_os = "linux"))]
struct UnsupportedSource {
    path: String,
    frame: PixelBuffer,
}

#[cfg(not(target_os = "linux"))]
impl FrameSource for UnsupportedSource {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn open(&mut self, _constraints: &CaptureConstraints) -> AppResult<Dimensions> {
        Err(crate::errors::AppError::DeviceUnavailable(format!(
            "{}: device capture is only supported on Linux",
            self.path
        )))
    }

    fn is_active(&self) -> bool {
        false
    }

    fn dimensions(&self) -> Option<Dimensions> {
        None
    }

    fn capture_frame(&mut self) -> AppResult<()> {
        Ok(())
    }

    fn frame(&self) -> &PixelBuffer {
        &self.frame
    }

    fn close(&mut self) {}
}

/// A capture device node found on the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

/// List capture devices that can be passed as `device_path`
pub fn list_devices() -> AppResult<Vec<DeviceInfo>> {
    #[cfg(target_os = "linux")]
    {
        Ok(v4l2::enumerate_devices())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(crate::errors::AppError::DeviceUnavailable(
            "device enumeration is only supported on Linux".into(),
        ))
    }
}
