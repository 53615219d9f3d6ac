// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic frame source
//!
//! Produces a deterministic moving pattern (vertical colour bars over a
//! scrolling checkerboard) so the pipeline can run without a camera. It can
//! also be told to refuse access or to negotiate a fixed resolution, which is
//! how the pipeline's start/stop paths are exercised in tests.

use super::{CaptureConstraints, FrameSource};
use crate::errors::{AppError, AppResult};
use crate::frame::{Dimensions, PixelBuffer};
use tracing::{debug, info};

const BAR_COLORS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

const CHECKER_SIZE: u32 = 32;

/// Pattern generator implementing [`FrameSource`]
#[derive(Debug)]
pub struct SyntheticSource {
    available: bool,
    /// Resolution granted regardless of the request, if set
    fixed_resolution: Option<Dimensions>,
    active: bool,
    dims: Option<Dimensions>,
    frame: PixelBuffer,
    frame_index: u64,
    open_count: u32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticSource {
    /// Source that grants whatever resolution is requested
    pub fn new() -> Self {
        Self {
            available: true,
            fixed_resolution: None,
            active: false,
            dims: None,
            frame: PixelBuffer::default(),
            frame_index: 0,
            open_count: 0,
        }
    }

    /// Source that always negotiates `dims`, whatever is requested
    pub fn with_fixed_resolution(dims: Dimensions) -> Self {
        Self {
            fixed_resolution: Some(dims),
            ..Self::new()
        }
    }

    /// Source whose `open` always fails with `DeviceUnavailable`
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Toggle availability, e.g. to simulate permission being granted later
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// Number of frames captured in the current session
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn render_pattern(&mut self) {
        let width = self.frame.width();
        let height = self.frame.height();
        if width == 0 || height == 0 {
            return;
        }

        let offset = (self.frame_index % u64::from(CHECKER_SIZE * 2)) as u32;
        let bar_width = width.div_ceil(BAR_COLORS.len() as u32).max(1);
        let stride = self.frame.stride();
        let data = self.frame.as_bytes_mut();

        for y in 0..height {
            let row = &mut data[y as usize * stride..(y as usize + 1) * stride];
            let in_bars = y < height / 2;
            for x in 0..width {
                let rgb = if in_bars {
                    BAR_COLORS[((x / bar_width) as usize).min(BAR_COLORS.len() - 1)]
                } else {
                    let cell = ((x + offset) / CHECKER_SIZE + y / CHECKER_SIZE) % 2;
                    if cell == 0 { [32, 32, 32] } else { [224, 224, 224] }
                };
                let i = x as usize * 4;
                row[i..i + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self, constraints: &CaptureConstraints) -> AppResult<Dimensions> {
        if self.active {
            self.close();
        }

        if !self.available {
            return Err(AppError::DeviceUnavailable(
                "synthetic source configured as unavailable".into(),
            ));
        }

        let dims = self.fixed_resolution.unwrap_or(constraints.preferred);
        if dims.is_empty() {
            return Err(AppError::DeviceUnavailable(format!(
                "cannot negotiate empty resolution {}",
                dims
            )));
        }

        self.frame.reshape(dims);
        self.frame_index = 0;
        self.render_pattern();
        self.dims = Some(dims);
        self.active = true;
        self.open_count += 1;

        info!(
            requested = %constraints.preferred,
            negotiated = %dims,
            facing = ?constraints.facing,
            "Synthetic source opened"
        );
        Ok(dims)
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.dims
    }

    fn capture_frame(&mut self) -> AppResult<()> {
        if !self.active {
            return Ok(());
        }
        self.frame_index += 1;
        self.render_pattern();
        Ok(())
    }

    fn frame(&self) -> &PixelBuffer {
        &self.frame
    }

    fn close(&mut self) {
        if self.active {
            debug!(frames = self.frame_index, "Synthetic source closed");
        }
        self.active = false;
        self.dims = None;
    }
}
