// SPDX-License-Identifier: GPL-3.0-only

//! Video4Linux2 capture source
//!
//! Opens a device node, asks for YUYV at the preferred size and accepts
//! whatever the driver negotiates as long as it is YUYV, UYVY, MJPG or RGB3.
//! Frames are dequeued from a memory-mapped stream and converted into the
//! source's RGBA buffer in place.

use super::format_converters::{Packed422, mjpeg_to_rgba, packed_422_to_rgba, rgb_to_rgba};
use super::{CaptureConstraints, DeviceInfo, FrameSource};
use crate::constants::capture::STREAM_BUFFER_COUNT;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{AppError, AppResult};
use crate::frame::{Dimensions, PixelBuffer};
use tracing::{debug, info, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Pixel layouts this source can convert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Yuyv,
    Uyvy,
    Mjpeg,
    Rgb24,
}

impl WireFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"UYVY" => Some(Self::Uyvy),
            b"MJPG" => Some(Self::Mjpeg),
            b"RGB3" => Some(Self::Rgb24),
            _ => None,
        }
    }
}

/// An open device with its streaming buffers
struct Session {
    // Declared before `device` so streaming stops before the handle closes
    stream: Stream<'static>,
    _device: Device,
    format: WireFormat,
    stride: usize,
    dims: Dimensions,
}

/// V4L2 device implementing [`FrameSource`]
pub struct V4l2Source {
    path: String,
    session: Option<Session>,
    frame: PixelBuffer,
    frame_count: u64,
}

impl V4l2Source {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            session: None,
            frame: PixelBuffer::default(),
            frame_count: 0,
        }
    }

    fn start_session(&self, constraints: &CaptureConstraints) -> AppResult<Session> {
        let unavailable = |what: &str, e: std::io::Error| {
            AppError::DeviceUnavailable(format!("{}: {}: {}", self.path, what, e))
        };

        let device = Device::with_path(&self.path).map_err(|e| unavailable("open", e))?;

        let mut format = device.format().map_err(|e| unavailable("query format", e))?;
        format.width = constraints.preferred.width;
        format.height = constraints.preferred.height;
        format.fourcc = FourCC::new(b"YUYV");

        // Drivers adjust unsupported requests instead of failing, so read back
        let negotiated = match device.set_format(&format) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "Could not set format, using current device format");
                device.format().map_err(|e| unavailable("query format", e))?
            }
        };

        let Some(wire_format) = WireFormat::from_fourcc(negotiated.fourcc) else {
            return Err(AppError::DeviceUnavailable(format!(
                "{}: unsupported pixel format {}",
                self.path, negotiated.fourcc
            )));
        };

        let dims = Dimensions::new(negotiated.width, negotiated.height);
        if dims.is_empty() {
            return Err(AppError::DeviceUnavailable(format!(
                "{}: driver negotiated empty resolution",
                self.path
            )));
        }

        // V4L2 exposes no facing attribute; the device node decides
        debug!(facing = ?constraints.facing, "Facing preference not negotiable on V4L2");

        let stream = Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFER_COUNT)
            .map_err(|e| unavailable("create buffer stream", e))?;

        info!(
            path = %self.path,
            requested = %constraints.preferred,
            negotiated = %dims,
            fourcc = %negotiated.fourcc,
            "V4L2 capture session opened"
        );

        Ok(Session {
            stream,
            _device: device,
            format: wire_format,
            stride: negotiated.stride as usize,
            dims,
        })
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.path
    }

    fn open(&mut self, constraints: &CaptureConstraints) -> AppResult<Dimensions> {
        self.close();

        let session = self.start_session(constraints)?;
        let dims = session.dims;
        self.frame.reshape(dims);
        self.frame.as_bytes_mut().fill(0);
        self.frame_count = 0;
        self.session = Some(session);
        Ok(dims)
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.session.as_ref().map(|s| s.dims)
    }

    fn capture_frame(&mut self) -> AppResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let (buf, meta) = session
            .stream
            .next()
            .map_err(|e| AppError::Capture(format!("{}: dequeue failed: {}", self.path, e)))?;

        let dims = session.dims;
        let rgba = self.frame.as_bytes_mut();
        let written = match session.format {
            WireFormat::Yuyv | WireFormat::Uyvy => {
                let layout = if session.format == WireFormat::Yuyv {
                    Packed422::Yuyv
                } else {
                    Packed422::Uyvy
                };
                let stride = session.stride.max(dims.width as usize * 2);
                packed_422_to_rgba(buf, dims.width, dims.height, stride, layout, rgba)
            }
            WireFormat::Mjpeg => {
                let used = (meta.bytesused as usize).min(buf.len());
                mjpeg_to_rgba(&buf[..used], dims.width, dims.height, rgba)
                    .map_err(AppError::Capture)?;
                dims.pixel_count()
            }
            WireFormat::Rgb24 => {
                let stride = session.stride.max(dims.width as usize * 3);
                rgb_to_rgba(buf, dims.width, dims.height, stride, rgba)
            }
        };
        if written < dims.pixel_count() {
            return Err(AppError::Capture(format!(
                "short frame: {} of {} pixels",
                written,
                dims.pixel_count()
            )));
        }

        self.frame_count += 1;
        if self.frame_count % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = self.frame_count,
                sequence = meta.sequence,
                size = buf.len(),
                "V4L2 frame captured"
            );
        }
        Ok(())
    }

    fn frame(&self) -> &PixelBuffer {
        &self.frame
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(path = %self.path, frames = self.frame_count, "Closing V4L2 capture session");
            drop(session);
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scan /dev for video capture nodes
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let mut paths: Vec<_> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut devices = Vec::new();
    for path in paths {
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }
        devices.push(DeviceInfo {
            path: path.to_string_lossy().to_string(),
            name: caps.card,
        });
    }

    devices
}
