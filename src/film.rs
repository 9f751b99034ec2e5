//! The accumulation buffer: per-pixel HDR radiance, tonemapped and gamma
//! corrected on write.

use std::path::Path;

use image::{ImageBuffer, Rgb};

use crate::error::MuonError;
use crate::math::Color;

/// HDR accumulation buffer. Tiles are handed out as disjoint mutable slices
/// (see `TileAccumulator`), so no lock is needed for pixel writes: a pixel
/// belongs to exactly one tile, and tiles partition the image.
pub struct Film {
    width: u32,
    height: u32,
    pixel_samples: u32,
    pixels: Vec<Color>,
}

impl Film {
    pub fn new(width: u32, height: u32, pixel_samples: u32) -> Self {
        Self {
            width,
            height,
            pixel_samples,
            pixels: vec![Color::zero(); (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Splits the buffer into one disjoint mutable slice per row-range, in
    /// the order of `row_ranges` (each `(start_row, row_count)`). Panics if
    /// the ranges overlap or exceed the buffer — a driver bug, not a
    /// recoverable condition.
    pub fn split_rows(&mut self, row_ranges: &[(u32, u32)]) -> Vec<TileAccumulator<'_>> {
        let width = self.width;
        let mut rest = self.pixels.as_mut_slice();
        let mut out = Vec::with_capacity(row_ranges.len());
        let mut cursor = 0u32;
        for &(start, count) in row_ranges {
            assert_eq!(start, cursor, "row ranges must be contiguous and ordered");
            let (mine, remainder) = rest.split_at_mut((count * width) as usize);
            rest = remainder;
            out.push(TileAccumulator {
                base_y: start,
                width,
                pixels: mine,
            });
            cursor += count;
        }
        out
    }

    /// Divides by sample count, applies gamma, clamps to `[0,1]`, scales to
    /// 8-bit, and writes a PNG.
    pub fn write(&self, path: &Path, gamma: f32) -> Result<(), MuonError> {
        let mut buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(self.width, self.height);
        for (i, pixel) in self.pixels.iter().enumerate() {
            let averaged = *pixel / self.pixel_samples as f32;
            let corrected = averaged.gamma_correct(gamma).saturate();
            let x = (i as u32) % self.width;
            let y = (i as u32) / self.width;
            buffer.put_pixel(
                x,
                y,
                Rgb([
                    (corrected.x * 255.0).round() as u8,
                    (corrected.y * 255.0).round() as u8,
                    (corrected.z * 255.0).round() as u8,
                ]),
            );
        }
        buffer
            .save(path)
            .map_err(|e| MuonError::OutputWriteFailed(path.to_path_buf(), e))
    }
}

/// A contiguous horizontal strip of the film, handed to exactly one worker
/// thread for the duration of one tile.
pub struct TileAccumulator<'a> {
    base_y: u32,
    width: u32,
    pixels: &'a mut [Color],
}

impl<'a> TileAccumulator<'a> {
    /// Accumulates `color` into pixel `(x, y)` in absolute image
    /// coordinates. Debug-asserts on out-of-bounds per spec.md §7 (a
    /// sampler bug, not a recoverable error).
    pub fn add_sample(&mut self, x: u32, y: u32, color: Color) {
        debug_assert!(y >= self.base_y, "pixel y={y} below tile base {}", self.base_y);
        let row = y - self.base_y;
        let index = (row * self.width + x) as usize;
        debug_assert!(
            index < self.pixels.len(),
            "pixel ({x}, {y}) out of bounds for this tile"
        );
        self.pixels[index] += color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rows_covers_disjoint_ranges() {
        let mut film = Film::new(4, 6, 1);
        {
            let mut tiles = film.split_rows(&[(0, 2), (2, 4)]);
            tiles[0].add_sample(0, 0, Color::ones());
            tiles[1].add_sample(1, 3, Color::ones());
        }
        let idx_top = 0usize;
        let idx_bottom = (3 * 4 + 1) as usize;
        assert_eq!(film.pixels[idx_top], Color::ones());
        assert_eq!(film.pixels[idx_bottom], Color::ones());
    }
}
