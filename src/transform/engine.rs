// SPDX-License-Identifier: GPL-3.0-only

//! Image engine capability
//!
//! [`ImageEngine`] is the boundary between the transform pipeline and the
//! code that actually touches pixels. [`CpuEngine`] is the built-in
//! implementation: integer luminance, a separable binomial 5x5 blur and a
//! Canny edge operator with L1 gradient magnitude.

use super::Thresholds;
use super::context::CannyScratch;
use crate::constants::edges::SMOOTHING_KERNEL_SIZE;
use crate::errors::{AppError, AppResult};
use crate::frame::{PixelBuffer, Plane};
use std::sync::Arc;

/// Loads an engine; may block, runs on a loader thread
pub type EngineLoader = Arc<dyn Fn() -> AppResult<Box<dyn ImageEngine>> + Send + Sync>;

/// Operations the transform pipeline is built from
pub trait ImageEngine: Send {
    fn name(&self) -> &str;

    /// RGBA to single-channel luminance; `out` already has the input's dimensions
    fn luminance(&self, input: &PixelBuffer, out: &mut Plane) -> AppResult<()>;

    /// 5x5 smoothing of `input` into `out`; `tmp` holds the intermediate pass
    fn smooth(&self, input: &Plane, out: &mut Plane, tmp: &mut Vec<u16>) -> AppResult<()>;

    /// Binary edge map (0 or 255) of `input`
    fn edges(
        &self,
        input: &Plane,
        out: &mut Plane,
        thresholds: Thresholds,
        scratch: &mut CannyScratch,
    ) -> AppResult<()>;
}

/// Loader for the built-in engine
pub fn cpu_loader() -> EngineLoader {
    Arc::new(|| Ok(Box::new(CpuEngine) as Box<dyn ImageEngine>))
}

/// Portable engine, no external libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuEngine;

/// Mirror index into `0..n` without repeating the edge sample (reflect-101)
#[inline]
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * n - 2 - i;
    }
    i.clamp(0, n - 1) as usize
}

fn check_dims(a: &Plane, b: &Plane) -> AppResult<()> {
    if a.dimensions() != b.dimensions() {
        return Err(AppError::TransformRuntime(format!(
            "plane size mismatch: {} vs {}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    Ok(())
}

// tan(22.5 deg) in Q15
const TAN_22_5_Q15: i64 = 13573;

impl ImageEngine for CpuEngine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn luminance(&self, input: &PixelBuffer, out: &mut Plane) -> AppResult<()> {
        if input.dimensions() != out.dimensions() {
            return Err(AppError::TransformRuntime(format!(
                "luminance target is {}, input is {}",
                out.dimensions(),
                input.dimensions()
            )));
        }

        // BT.601 weights in Q14
        for (dst, px) in out
            .as_mut_slice()
            .iter_mut()
            .zip(input.as_bytes().chunks_exact(4))
        {
            let y = px[0] as u32 * 4899 + px[1] as u32 * 9617 + px[2] as u32 * 1868 + 8192;
            *dst = (y >> 14) as u8;
        }
        Ok(())
    }

    fn smooth(&self, input: &Plane, out: &mut Plane, tmp: &mut Vec<u16>) -> AppResult<()> {
        check_dims(input, out)?;
        const KERNEL: [u32; SMOOTHING_KERNEL_SIZE] = [1, 4, 6, 4, 1];
        const RADIUS: isize = (SMOOTHING_KERNEL_SIZE / 2) as isize;

        let w = input.width();
        let h = input.height();
        tmp.resize(w * h, 0);
        let src = input.as_slice();

        // Horizontal pass, sums fit in u16 (255 * 16)
        for y in 0..h {
            let row = &src[y * w..(y + 1) * w];
            for x in 0..w {
                let mut acc = 0u32;
                for (k, weight) in KERNEL.iter().enumerate() {
                    let sx = reflect101(x as isize + k as isize - RADIUS, w);
                    acc += weight * row[sx] as u32;
                }
                tmp[y * w + x] = acc as u16;
            }
        }

        let dst = out.as_mut_slice();
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0u32;
                for (k, weight) in KERNEL.iter().enumerate() {
                    let sy = reflect101(y as isize + k as isize - RADIUS, h);
                    acc += weight * tmp[sy * w + x] as u32;
                }
                dst[y * w + x] = ((acc + 128) >> 8) as u8;
            }
        }
        Ok(())
    }

    fn edges(
        &self,
        input: &Plane,
        out: &mut Plane,
        thresholds: Thresholds,
        scratch: &mut CannyScratch,
    ) -> AppResult<()> {
        check_dims(input, out)?;
        thresholds.validate()?;

        let w = input.width();
        let h = input.height();
        let n = w * h;
        scratch.prepare(n);
        let src = input.as_slice();

        // 3x3 Sobel with reflect-101 borders, L1 magnitude
        for y in 0..h {
            let ym = reflect101(y as isize - 1, h) * w;
            let yc = y * w;
            let yp = reflect101(y as isize + 1, h) * w;
            for x in 0..w {
                let xm = reflect101(x as isize - 1, w);
                let xp = reflect101(x as isize + 1, w);
                let p = |row: usize, col: usize| src[row + col] as i32;

                let dx = (p(ym, xp) + 2 * p(yc, xp) + p(yp, xp))
                    - (p(ym, xm) + 2 * p(yc, xm) + p(yp, xm));
                let dy = (p(yp, xm) + 2 * p(yp, x) + p(yp, xp))
                    - (p(ym, xm) + 2 * p(ym, x) + p(ym, xp));

                let i = yc + x;
                scratch.dx[i] = dx as i16;
                scratch.dy[i] = dy as i16;
                scratch.magnitude[i] = dx.abs() + dy.abs();
            }
        }

        // Non-maximum suppression along the quantised gradient direction,
        // then classify against the two thresholds
        let low = thresholds.low as i32;
        let high = thresholds.high as i32;
        let mag = |x: isize, y: isize, m: &[i32]| -> i32 {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0
            } else {
                m[y as usize * w + x as usize]
            }
        };

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let m = scratch.magnitude[i];
                if m <= low {
                    continue;
                }

                let dx = scratch.dx[i] as i64;
                let dy = scratch.dy[i] as i64;
                let ax = dx.abs();
                let ay = dy.abs();
                let tg22x = ax * TAN_22_5_Q15;
                let ay15 = ay << 15;
                let (xi, yi) = (x as isize, y as isize);

                let is_max = if ay15 < tg22x {
                    // Horizontal gradient, compare left/right
                    m > mag(xi - 1, yi, &scratch.magnitude)
                        && m >= mag(xi + 1, yi, &scratch.magnitude)
                } else {
                    let tg67x = tg22x + (ax << 16);
                    if ay15 > tg67x {
                        // Vertical gradient, compare up/down
                        m > mag(xi, yi - 1, &scratch.magnitude)
                            && m >= mag(xi, yi + 1, &scratch.magnitude)
                    } else {
                        let s: isize = if (dx ^ dy) < 0 { -1 } else { 1 };
                        m > mag(xi - s, yi - 1, &scratch.magnitude)
                            && m > mag(xi + s, yi + 1, &scratch.magnitude)
                    }
                };

                if !is_max {
                    continue;
                }
                if m > high {
                    scratch.marks[i] = CannyScratch::STRONG;
                    scratch.stack.push(i);
                } else {
                    scratch.marks[i] = CannyScratch::CANDIDATE;
                }
            }
        }

        // Hysteresis: grow strong edges through 8-connected candidates
        while let Some(i) = scratch.stack.pop() {
            let x = (i % w) as isize;
            let y = (i / w) as isize;
            for (ox, oy) in [
                (-1, -1),
                (0, -1),
                (1, -1),
                (-1, 0),
                (1, 0),
                (-1, 1),
                (0, 1),
                (1, 1),
            ] {
                let nx = x + ox;
                let ny = y + oy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if scratch.marks[j] == CannyScratch::CANDIDATE {
                    scratch.marks[j] = CannyScratch::STRONG;
                    scratch.stack.push(j);
                }
            }
        }

        for (dst, &mark) in out.as_mut_slice().iter_mut().zip(scratch.marks.iter()) {
            *dst = if mark == CannyScratch::STRONG { 255 } else { 0 };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Dimensions;

    fn plane_from(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> Plane {
        let mut plane = Plane::new(Dimensions::new(w, h));
        for y in 0..h {
            for x in 0..w {
                plane.as_mut_slice()[(y * w + x) as usize] = f(x, y);
            }
        }
        plane
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 1), 0);
        assert_eq!(reflect101(-1, 2), 1);
    }

    #[test]
    fn test_luminance_weights() {
        let dims = Dimensions::new(4, 1);
        let input = PixelBuffer::from_rgba(
            dims,
            vec![
                255, 255, 255, 255, //
                0, 0, 0, 255, //
                255, 0, 0, 255, //
                0, 255, 0, 255,
            ],
        )
        .unwrap();
        let mut out = Plane::new(dims);
        CpuEngine.luminance(&input, &mut out).unwrap();

        assert_eq!(out.as_slice(), &[255, 0, 76, 150]);
    }

    #[test]
    fn test_smooth_preserves_flat_image() {
        let input = plane_from(7, 5, |_, _| 90);
        let mut out = Plane::new(input.dimensions());
        let mut tmp = Vec::new();
        CpuEngine.smooth(&input, &mut out, &mut tmp).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 90));
    }

    #[test]
    fn test_smooth_spreads_impulse() {
        let input = plane_from(5, 5, |x, y| if x == 2 && y == 2 { 255 } else { 0 });
        let mut out = Plane::new(input.dimensions());
        let mut tmp = Vec::new();
        CpuEngine.smooth(&input, &mut out, &mut tmp).unwrap();

        // centre weight 36/256
        assert_eq!(out.get(2, 2), 36);
        assert!(out.get(1, 2) > 0);
        assert_eq!(out.get(1, 2), out.get(3, 2));
    }

    #[test]
    fn test_edges_on_vertical_step() {
        let input = plane_from(16, 8, |x, _| if x < 8 { 0 } else { 200 });
        let mut out = Plane::new(input.dimensions());
        let mut scratch = CannyScratch::default();
        CpuEngine
            .edges(&input, &mut out, Thresholds::default(), &mut scratch)
            .unwrap();

        for y in 0..8 {
            let row: Vec<u8> = (0..16).map(|x| out.get(x, y)).collect();
            assert_eq!(row.iter().filter(|&&v| v == 255).count(), 1, "row {}", y);
            assert!(row[7] == 255 || row[8] == 255);
        }
    }

    #[test]
    fn test_edges_flat_image_is_empty() {
        let input = plane_from(10, 10, |_, _| 128);
        let mut out = Plane::new(input.dimensions());
        let mut scratch = CannyScratch::default();
        CpuEngine
            .edges(&input, &mut out, Thresholds::default(), &mut scratch)
            .unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_weak_edge_needs_strong_neighbour() {
        // Step height 20 gives |dx| = 80: above low, below high
        let input = plane_from(16, 8, |x, _| if x < 8 { 100 } else { 120 });
        let mut out = Plane::new(input.dimensions());
        let mut scratch = CannyScratch::default();
        CpuEngine
            .edges(&input, &mut out, Thresholds::default(), &mut scratch)
            .unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 0));

        let lowered = Thresholds { low: 50, high: 70 };
        CpuEngine
            .edges(&input, &mut out, lowered, &mut scratch)
            .unwrap();
        assert!(out.as_slice().iter().any(|&v| v == 255));
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let input = plane_from(4, 4, |_, _| 0);
        let mut out = Plane::new(Dimensions::new(3, 4));
        let mut tmp = Vec::new();
        assert!(matches!(
            CpuEngine.smooth(&input, &mut out, &mut tmp),
            Err(AppError::TransformRuntime(_))
        ));
    }
}
