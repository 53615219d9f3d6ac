// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Processing applied to each frame while processing is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransformMode {
    /// Luminance, smoothing and two-threshold edge detection
    #[default]
    EdgeDetect,
    /// Luminance only
    Grayscale,
}

impl TransformMode {
    /// All modes, for UI iteration
    pub const ALL: [TransformMode; 2] = [TransformMode::EdgeDetect, TransformMode::Grayscale];

    /// Label shown while this mode is active
    pub fn display_name(&self) -> &'static str {
        match self {
            TransformMode::EdgeDetect => "Edge Detection",
            TransformMode::Grayscale => "Grayscale",
        }
    }
}

/// Label shown while processing is disabled
pub const RAW_FEED_LABEL: &str = "Raw Feed";

/// Label for the current pipeline output
pub fn mode_label(processing_enabled: bool, mode: TransformMode) -> &'static str {
    if processing_enabled {
        mode.display_name()
    } else {
        RAW_FEED_LABEL
    }
}

/// Capture defaults
pub mod capture {
    /// Preferred capture width
    pub const DEFAULT_WIDTH: u32 = 640;

    /// Preferred capture height
    pub const DEFAULT_HEIGHT: u32 = 480;

    /// Default V4L2 device node
    pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";

    /// Number of mmap buffers queued on the device
    pub const STREAM_BUFFER_COUNT: u32 = 4;
}

/// Edge operator defaults
pub mod edges {
    /// Gradient magnitude below which a pixel is never an edge
    pub const LOW_THRESHOLD: u16 = 50;

    /// Gradient magnitude above which a pixel is always an edge
    pub const HIGH_THRESHOLD: u16 = 150;

    /// Side length of the smoothing kernel
    pub const SMOOTHING_KERNEL_SIZE: usize = 5;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Window after which the frame rate is recomputed
    pub const RATE_WINDOW: Duration = Duration::from_millis(1000);

    /// Upper bound on engine loading
    pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default display refresh rate driving the tick scheduler
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    /// Log a per-frame debug line every N ticks
    pub const FRAME_LOG_INTERVAL: u64 = 60;
}

/// Application metadata
pub mod app_info {
    /// Binary and config directory name
    pub const APP_NAME: &str = "edgecam";

    /// Config file name inside the config directory
    pub const CONFIG_FILE: &str = "config.json";

    /// Version string including the commit hash when available
    pub fn version() -> &'static str {
        env!("EDGECAM_BUILD_VERSION")
    }
}
