//! Interleaved 8-bit RGBA images

use crate::color::{ColorError, Rgb};

/// Row-major RGBA pixel buffer, 4 bytes per pixel, straight alpha
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RgbaImage {
    /// Fully transparent image
    pub fn transparent(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA at (row, col)
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 4]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let i = (row * self.width + col) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub(crate) fn put(&mut self, index: usize, color: Rgb, alpha: u8) {
        let i = index * 4;
        self.pixels[i] = color.r;
        self.pixels[i + 1] = color.g;
        self.pixels[i + 2] = color.b;
        self.pixels[i + 3] = alpha;
    }

    /// Composite `top` over this image ("over" operator, straight alpha)
    pub fn blend_over(&mut self, top: &RgbaImage) -> Result<(), ColorError> {
        if (top.width, top.height) != (self.width, self.height) {
            return Err(ColorError::SizeMismatch {
                expected: (self.width, self.height),
                actual: (top.width, top.height),
            });
        }

        for (dst, src) in self.pixels.chunks_exact_mut(4).zip(top.pixels.chunks_exact(4)) {
            let sa = src[3] as f64 / 255.0;
            if sa == 0.0 {
                continue;
            }
            let da = dst[3] as f64 / 255.0;
            let out_a = sa + da * (1.0 - sa);
            for c in 0..3 {
                let blended =
                    (src[c] as f64 * sa + dst[c] as f64 * da * (1.0 - sa)) / out_a;
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}
