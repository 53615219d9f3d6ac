// SPDX-License-Identifier: GPL-3.0-only

//! CPU presenter
//!
//! Keeps the surface as a plain RGBA buffer. Used when no GPU adapter is
//! available and by the terminal viewer and tests.

use super::FramePresenter;
use crate::errors::{AppError, AppResult};
use crate::frame::{Dimensions, PixelBuffer};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct SoftwarePresenter {
    surface: Option<PixelBuffer>,
    has_presented: bool,
    presents: u64,
    texture_allocations: u32,
    disposed: bool,
}

impl SoftwarePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed presents
    pub fn presents(&self) -> u64 {
        self.presents
    }

    /// How many times the surface buffer has been (re)allocated
    pub fn texture_allocations(&self) -> u32 {
        self.texture_allocations
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl FramePresenter for SoftwarePresenter {
    fn name(&self) -> &'static str {
        "software"
    }

    fn resize(&mut self, dims: Dimensions) -> AppResult<()> {
        if self.disposed {
            return Err(AppError::InvalidState("presenter has been disposed".into()));
        }
        if dims.is_empty() {
            return Err(AppError::Present(format!("cannot size surface to {}", dims)));
        }
        if self.surface.as_ref().is_some_and(|s| s.dimensions() == dims) {
            return Ok(());
        }

        self.surface = Some(PixelBuffer::new(dims));
        self.has_presented = false;
        self.texture_allocations += 1;
        debug!(width = dims.width, height = dims.height, "Software surface resized");
        Ok(())
    }

    fn present(&mut self, pixels: &PixelBuffer) -> AppResult<()> {
        let Some(surface) = self.surface.as_mut() else {
            return Err(AppError::InvalidState(
                "present called before resize".into(),
            ));
        };
        if pixels.dimensions() != surface.dimensions() {
            return Err(AppError::Present(format!(
                "frame is {}, surface is {}",
                pixels.dimensions(),
                surface.dimensions()
            )));
        }

        surface.as_bytes_mut().copy_from_slice(pixels.as_bytes());
        self.has_presented = true;
        self.presents += 1;
        Ok(())
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.surface.as_ref().map(PixelBuffer::dimensions)
    }

    fn read_back(&mut self) -> AppResult<Option<&PixelBuffer>> {
        if !self.has_presented {
            return Ok(None);
        }
        Ok(self.surface.as_ref())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.surface = None;
        self.has_presented = false;
        self.disposed = true;
        info!(presents = self.presents, "Software presenter disposed");
    }
}
