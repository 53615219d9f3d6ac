// SPDX-License-Identifier: GPL-3.0-only

//! Frame presenters
//!
//! A presenter owns a drawing surface and exactly one frame texture. Each
//! `present` replaces the texture contents and redraws the surface; the
//! texture itself is only recreated by `resize` when the size changes.

pub mod gpu;
pub mod software;

pub use gpu::GpuPresenter;
pub use software::SoftwarePresenter;

use crate::errors::AppResult;
use crate::frame::{Dimensions, PixelBuffer};
use serde::{Deserialize, Serialize};

/// Presenter implementation to construct
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PresenterKind {
    /// wgpu render pipeline with a textured quad
    #[default]
    Gpu,
    /// CPU copy into a surface buffer
    Software,
}

pub trait FramePresenter {
    fn name(&self) -> &'static str;

    /// Size the surface, viewport and frame texture.
    ///
    /// Must be called before the first `present` and whenever the frame
    /// dimensions change. Same-size calls keep the existing texture.
    fn resize(&mut self, dims: Dimensions) -> AppResult<()>;

    /// Upload `pixels` into the frame texture and draw it over the surface
    fn present(&mut self, pixels: &PixelBuffer) -> AppResult<()>;

    /// Current surface size, `None` before the first `resize`
    fn dimensions(&self) -> Option<Dimensions>;

    /// Contents of the surface after the last `present`
    fn read_back(&mut self) -> AppResult<Option<&PixelBuffer>>;

    /// Release all surface resources. Further calls are no-ops.
    fn dispose(&mut self);
}

/// Construct the presenter selected in the configuration
pub fn create_presenter(kind: PresenterKind) -> AppResult<Box<dyn FramePresenter>> {
    match kind {
        PresenterKind::Gpu => Ok(Box::new(GpuPresenter::new()?)),
        PresenterKind::Software => Ok(Box::new(SoftwarePresenter::new())),
    }
}
