// SPDX-License-Identifier: GPL-3.0-only

//! Scratch buffers reused across transform calls
//!
//! Buffers are sized lazily on first use and only reallocated when the input
//! dimensions change, so steady-state processing performs no allocation.

use crate::frame::{Dimensions, PixelBuffer, Plane};
use tracing::debug;

/// Cached resource dimensions, avoids reallocation when dimensions match
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub struct CachedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CachedDimensions {
    /// Check if dimensions have changed and need update
    pub fn needs_update(&self, dims: Dimensions) -> bool {
        self.width != dims.width || self.height != dims.height
    }

    pub fn update(&mut self, dims: Dimensions) {
        self.width = dims.width;
        self.height = dims.height;
    }

    /// Check if dimensions are initialized (non-zero)
    pub fn is_initialized(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Per-pixel state of the edge operator
#[derive(Debug, Default)]
pub struct CannyScratch {
    pub dx: Vec<i16>,
    pub dy: Vec<i16>,
    pub magnitude: Vec<i32>,
    pub marks: Vec<u8>,
    pub stack: Vec<usize>,
}

impl CannyScratch {
    pub const NONE: u8 = 0;
    pub const CANDIDATE: u8 = 1;
    pub const STRONG: u8 = 2;

    /// Size for `len` pixels and clear the marks from the previous frame
    pub fn prepare(&mut self, len: usize) {
        self.dx.resize(len, 0);
        self.dy.resize(len, 0);
        self.magnitude.resize(len, 0);
        self.marks.clear();
        self.marks.resize(len, Self::NONE);
        self.stack.clear();
    }

    fn reserve_exact(&mut self, len: usize) {
        *self = Self {
            dx: vec![0; len],
            dy: vec![0; len],
            magnitude: vec![0; len],
            marks: vec![Self::NONE; len],
            stack: Vec::with_capacity(len / 16),
        };
    }
}

/// Intermediate planes plus the RGBA output of the transform
#[derive(Debug, Default)]
pub struct TransformContext {
    pub gray: Plane,
    pub blurred: Plane,
    pub edges: Plane,
    pub blur_tmp: Vec<u16>,
    pub canny: CannyScratch,
    pub output: PixelBuffer,
    cached: CachedDimensions,
    allocations: u32,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every buffer match `dims`; returns true when it reallocated
    pub fn ensure(&mut self, dims: Dimensions) -> bool {
        if self.cached.is_initialized() && !self.cached.needs_update(dims) {
            return false;
        }

        debug!(
            old_width = self.cached.width,
            old_height = self.cached.height,
            width = dims.width,
            height = dims.height,
            "Allocating transform scratch buffers"
        );

        let len = dims.pixel_count();
        self.gray = Plane::new(dims);
        self.blurred = Plane::new(dims);
        self.edges = Plane::new(dims);
        self.blur_tmp = vec![0; len];
        self.canny.reserve_exact(len);
        self.output = PixelBuffer::new(dims);
        self.cached.update(dims);
        self.allocations += 1;
        true
    }

    /// How many times the buffers have been (re)allocated
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.cached
            .is_initialized()
            .then(|| Dimensions::new(self.cached.width, self.cached.height))
    }
}
