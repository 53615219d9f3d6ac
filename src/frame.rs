// SPDX-License-Identifier: GPL-3.0-only

//! Pixel containers shared by every pipeline stage
//!
//! A [`PixelBuffer`] is always 8-bit RGBA, row-major, top row first, and its
//! byte length is always `width * height * 4`. A [`Plane`] is the single
//! channel equivalent used for intermediate images.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per RGBA pixel
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Width and height of a frame in pixels
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of an RGBA buffer with these dimensions
    pub fn rgba_len(&self) -> usize {
        self.pixel_count() * RGBA_BYTES_PER_PIXEL
    }

    /// True when either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// RGBA8 image owned by exactly one pipeline stage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    dims: Dimensions,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Zero-filled (transparent black) buffer
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0; dims.rgba_len()],
        }
    }

    /// Wrap existing RGBA bytes, checking the length matches the dimensions
    pub fn from_rgba(dims: Dimensions, data: Vec<u8>) -> AppResult<Self> {
        if data.len() != dims.rgba_len() {
            return Err(AppError::TransformRuntime(format!(
                "RGBA buffer for {} needs {} bytes, got {}",
                dims,
                dims.rgba_len(),
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Buffer filled with a single colour
    pub fn filled(dims: Dimensions, rgba: [u8; 4]) -> Self {
        let mut buffer = Self::new(dims);
        for pixel in buffer.data.chunks_exact_mut(RGBA_BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&rgba);
        }
        buffer
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.dims.width as usize * RGBA_BYTES_PER_PIXEL
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGBA value at (x, y), or `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dims.width || y >= self.dims.height {
            return None;
        }
        let idx = y as usize * self.stride() + x as usize * RGBA_BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + RGBA_BYTES_PER_PIXEL]);
        Some(px)
    }

    /// Change dimensions, reusing the allocation when it is large enough.
    ///
    /// Returns true when the dimensions actually changed. Contents are
    /// unspecified afterwards.
    pub fn reshape(&mut self, dims: Dimensions) -> bool {
        if self.dims == dims {
            return false;
        }
        self.dims = dims;
        self.data.resize(dims.rgba_len(), 0);
        true
    }

    /// Replace contents with another buffer of any size
    pub fn copy_from(&mut self, other: &PixelBuffer) {
        self.reshape(other.dims);
        self.data.copy_from_slice(&other.data);
    }
}

/// Single-channel 8-bit image
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plane {
    dims: Dimensions,
    data: Vec<u8>,
}

impl Plane {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0; dims.pixel_count()],
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> usize {
        self.dims.width as usize
    }

    pub fn height(&self) -> usize {
        self.dims.height as usize
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width() + x]
    }

    /// Expand into an RGBA buffer of the same dimensions (alpha = 255)
    pub fn expand_into(&self, out: &mut PixelBuffer) {
        out.reshape(self.dims);
        for (dst, &v) in out
            .as_bytes_mut()
            .chunks_exact_mut(RGBA_BYTES_PER_PIXEL)
            .zip(self.data.iter())
        {
            dst.copy_from_slice(&[v, v, v, 255]);
        }
    }
}
