// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::{CaptureConstraints, Facing};
use crate::constants::{TransformMode, app_info, capture, edges, timing};
use crate::errors::{AppError, AppResult};
use crate::frame::Dimensions;
use crate::presenter::PresenterKind;
use crate::transform::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where frames come from
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SourceKind {
    /// V4L2 device node
    #[default]
    Device,
    /// Built-in moving test pattern
    Synthetic,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture device node used when `source` is `Device`
    pub device_path: String,
    /// Capture source
    pub source: SourceKind,
    /// Preferred capture width (the device may negotiate another)
    pub preferred_width: u32,
    /// Preferred capture height
    pub preferred_height: u32,
    /// Preferred camera facing
    pub facing: Facing,
    /// Ticks per second
    pub refresh_hz: u32,
    /// Upper bound on engine loading, in milliseconds
    pub engine_timeout_ms: u64,
    /// Edge operator lower threshold
    pub low_threshold: u16,
    /// Edge operator upper threshold
    pub high_threshold: u16,
    /// Transform applied while processing is enabled
    pub processing_mode: TransformMode,
    /// Whether processing is on when the pipeline starts
    pub processing_enabled: bool,
    /// Presenter backend
    pub presenter: PresenterKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: capture::DEFAULT_DEVICE_PATH.to_string(),
            source: SourceKind::default(),
            preferred_width: capture::DEFAULT_WIDTH,
            preferred_height: capture::DEFAULT_HEIGHT,
            facing: Facing::default(),
            refresh_hz: timing::DEFAULT_REFRESH_HZ,
            engine_timeout_ms: timing::ENGINE_INIT_TIMEOUT.as_millis() as u64,
            low_threshold: edges::LOW_THRESHOLD,
            high_threshold: edges::HIGH_THRESHOLD,
            processing_mode: TransformMode::default(),
            processing_enabled: true,
            presenter: PresenterKind::default(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/edgecam/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join(app_info::CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.preferred_width == 0 || self.preferred_height == 0 {
            return Err(AppError::Config(format!(
                "preferred resolution {}x{} must be non-zero",
                self.preferred_width, self.preferred_height
            )));
        }
        if self.refresh_hz == 0 {
            return Err(AppError::Config("refresh_hz must be at least 1".into()));
        }
        self.thresholds().validate()
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            preferred: Dimensions::new(self.preferred_width, self.preferred_height),
            facing: self.facing,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low: self.low_threshold,
            high: self.high_threshold,
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}
