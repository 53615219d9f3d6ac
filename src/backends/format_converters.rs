// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for capture backends
//!
//! Converters write into a caller-owned RGBA slice so a source can reuse its
//! frame buffer across captures. Packed 4:2:2 formats use BT.601 coefficients.

/// Convert one BT.601 YUV sample to RGB
#[inline]
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    [r, g, b]
}

/// Byte order of a packed 4:2:2 macropixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packed422 {
    /// Y0 U Y1 V
    Yuyv,
    /// U Y0 V Y1
    Uyvy,
}

/// Convert packed YUV 4:2:2 to RGBA
///
/// Each 4-byte group encodes 2 pixels sharing chroma. `stride` is the source
/// row length in bytes (drivers may pad rows). Returns the number of pixels
/// written.
pub fn packed_422_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    layout: Packed422,
    rgba: &mut [u8],
) -> usize {
    let w = width as usize;
    let row_bytes = w * 2;
    let mut written = 0;

    for row in 0..height as usize {
        let start = row * stride;
        let Some(src_row) = data.get(start..start + row_bytes) else {
            break;
        };
        let dst_row = &mut rgba[row * w * 4..(row + 1) * w * 4];

        for (pair, chunk) in src_row.chunks_exact(4).enumerate() {
            let (y0, u, y1, v) = match layout {
                Packed422::Yuyv => (chunk[0], chunk[1], chunk[2], chunk[3]),
                Packed422::Uyvy => (chunk[1], chunk[0], chunk[3], chunk[2]),
            };
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            for (i, y) in [y0, y1].into_iter().enumerate() {
                let x = pair * 2 + i;
                if x >= w {
                    break;
                }
                let [r, g, b] = yuv_to_rgb(y as f32, u, v);
                dst_row[x * 4..x * 4 + 4].copy_from_slice(&[r, g, b, 255]);
                written += 1;
            }
        }
    }

    written
}

/// Convert packed RGB24 to RGBA by adding alpha=255
///
/// `stride` is the source row length in bytes. Returns the number of pixels
/// written; rows missing from a short buffer are left untouched.
pub fn rgb_to_rgba(rgb: &[u8], width: u32, height: u32, stride: usize, rgba: &mut [u8]) -> usize {
    let w = width as usize;
    let row_bytes = w * 3;
    let mut written = 0;

    for row in 0..height as usize {
        let start = row * stride;
        let Some(src_row) = rgb.get(start..start + row_bytes) else {
            break;
        };
        let dst_row = &mut rgba[row * w * 4..(row + 1) * w * 4];

        for (src, dst) in src_row.chunks_exact(3).zip(dst_row.chunks_exact_mut(4)) {
            dst.copy_from_slice(&[src[0], src[1], src[2], 255]);
            written += 1;
        }
    }
    written
}

/// Decode a motion-JPEG frame into RGBA
pub fn mjpeg_to_rgba(jpeg: &[u8], width: u32, height: u32, rgba: &mut [u8]) -> Result<(), String> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| format!("Failed to decode MJPEG frame: {}", e))?
        .to_rgba8();

    if decoded.width() != width || decoded.height() != height {
        return Err(format!(
            "MJPEG frame is {}x{}, expected {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        ));
    }

    rgba.copy_from_slice(decoded.as_raw());
    Ok(())
}
