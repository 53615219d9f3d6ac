// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the frame pipeline

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main pipeline error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No capture device could be opened (missing, busy or permission denied)
    DeviceUnavailable(String),
    /// The image transform engine failed to load or timed out
    EngineUnavailable(String),
    /// No GPU context could be created for the presenter
    SurfaceUnsupported(String),
    /// A single frame could not be processed
    TransformRuntime(String),
    /// A single frame could not be captured
    Capture(String),
    /// The presenter failed while drawing a frame
    Present(String),
    /// Operation not allowed in the current pipeline state
    InvalidState(String),
    /// Configuration errors
    Config(String),
}

impl AppError {
    /// Whether the pipeline can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::TransformRuntime(_) | AppError::Capture(_) | AppError::DeviceUnavailable(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DeviceUnavailable(msg) => write!(f, "Capture device unavailable: {}", msg),
            AppError::EngineUnavailable(msg) => write!(f, "Transform engine unavailable: {}", msg),
            AppError::SurfaceUnsupported(msg) => write!(f, "GPU surface unsupported: {}", msg),
            AppError::TransformRuntime(msg) => write!(f, "Transform failed: {}", msg),
            AppError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            AppError::Present(msg) => write!(f, "Presentation failed: {}", msg),
            AppError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
