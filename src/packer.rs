//! Bit packers turning RGBA pixels into printer dots.
//!
//! A packer receives a row-major RGBA-8888 buffer and returns one bit per dot,
//! most significant bit first, each row padded to a whole byte. A set bit is a
//! black dot. How a pixel ends up black or white is up to the implementation.

use std::sync::OnceLock;

use log::debug;

use crate::error::{Error, Result};

/// Strategy converting RGBA pixels into a packed monochrome buffer.
pub trait BitPacker: Send + Sync {
    /// Pack `width` x `height` RGBA pixels.
    ///
    /// Fails with [`Error::PixelBufferSize`] when `rgba` does not hold
    /// exactly `width * height * 4` bytes.
    fn pack(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>>;
}

/// Packer used by [`crate::convert`].
///
/// Built once on first use and shared by every caller afterwards.
pub fn default_packer() -> &'static dyn BitPacker {
    static DEFAULT: OnceLock<FloydSteinberg> = OnceLock::new();
    DEFAULT.get_or_init(FloydSteinberg::new)
}

/// Serpentine Floyd-Steinberg error diffusion.
///
/// Even rows are scanned left to right and odd rows right to left, which
/// avoids the diagonal artifacts of plain raster order on photos. The error
/// of each pixel is spread over its neighbours:
///
/// ```text
///        *   7/16
/// 3/16 5/16  1/16
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FloydSteinberg {
    threshold: u8,
}

impl FloydSteinberg {
    pub const fn new() -> Self {
        FloydSteinberg { threshold: 127 }
    }

    /// Gray levels strictly above `threshold` quantize to white.
    pub const fn with_threshold(threshold: u8) -> Self {
        FloydSteinberg { threshold }
    }
}

impl Default for FloydSteinberg {
    fn default() -> Self {
        Self::new()
    }
}

impl BitPacker for FloydSteinberg {
    fn pack(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        check_len(rgba, width, height)?;
        debug!("Dithering {}x{} pixels", width, height);

        let w = width as usize;
        let h = height as usize;
        // Accumulated error may push a level outside 0..=255.
        let mut gray: Vec<i32> = rgba.chunks_exact(4).map(|px| luma(px) as i32).collect();
        let mut black = vec![false; w * h];

        for y in 0..h {
            let forward = y % 2 == 0;
            for i in 0..w {
                let x = if forward { i } else { w - 1 - i };
                let old = gray[y * w + x];
                let new = if old > self.threshold as i32 { 255 } else { 0 };
                black[y * w + x] = new == 0;
                let err = old - new;

                // Neighbours mirror with the scan direction.
                let ahead = if forward { x as isize + 1 } else { x as isize - 1 };
                let behind = if forward { x as isize - 1 } else { x as isize + 1 };
                diffuse(&mut gray, w, h, ahead, y, err * 7 / 16);
                diffuse(&mut gray, w, h, behind, y + 1, err * 3 / 16);
                diffuse(&mut gray, w, h, x as isize, y + 1, err * 5 / 16);
                diffuse(&mut gray, w, h, ahead, y + 1, err / 16);
            }
        }

        Ok(pack_rows(w, h, |x, y| black[y * w + x]))
    }
}

fn diffuse(gray: &mut [i32], w: usize, h: usize, x: isize, y: usize, amount: i32) {
    if x >= 0 && (x as usize) < w && y < h {
        gray[y * w + x as usize] += amount;
    }
}

/// Plain threshold without error diffusion.
///
/// A pixel whose gray level is less than or equal to the threshold becomes a
/// black dot. Suited to line art and synthetic images.
#[derive(Debug, Clone, Copy)]
pub struct Threshold(pub u8);

impl BitPacker for Threshold {
    fn pack(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        check_len(rgba, width, height)?;
        let w = width as usize;
        Ok(pack_rows(w, height as usize, |x, y| {
            let offset = (y * w + x) * 4;
            luma(&rgba[offset..offset + 4]) <= self.0
        }))
    }
}

fn check_len(rgba: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(Error::PixelBufferSize {
            expected,
            actual: rgba.len(),
        });
    }
    Ok(())
}

/// Gray level of an RGBA pixel using BT.601 weights in 14 bit fixed point.
///
/// Alpha is ignored.
fn luma(px: &[u8]) -> u8 {
    let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
    ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
}

fn pack_rows(width: usize, height: usize, is_black: impl Fn(usize, usize) -> bool) -> Vec<u8> {
    let bytes_per_row = (width + 7) / 8;
    let mut buf = vec![0u8; bytes_per_row * height];

    for y in 0..height {
        let row = &mut buf[y * bytes_per_row..(y + 1) * bytes_per_row];
        for x in 0..width {
            if is_black(x, y) {
                row[x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    buf
}
