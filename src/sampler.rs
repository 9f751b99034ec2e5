//! Tile partitioning and the sub-pixel sampler.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

/// A rectangular tile of the image in pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Tile {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Partitions the image into horizontal, full-width strips per spec.md
/// §4.6: `num_tiles = clamp(max(total_samples/50000, 3*parallelism), 1, height)`,
/// with leftover rows folded into the first tile.
pub fn partition_tiles(width: u32, height: u32, pixel_samples: u32, parallelism: usize) -> Vec<Tile> {
    let total_samples = width as u64 * height as u64 * pixel_samples as u64;
    let by_samples = total_samples / 50_000;
    let by_parallelism = 3 * parallelism as u64;
    let num_tiles = by_samples.max(by_parallelism).clamp(1, height as u64) as u32;

    let base_rows = height / num_tiles;
    let leftover = height % num_tiles;

    let mut tiles = Vec::with_capacity(num_tiles as usize);
    let mut y = 0u32;
    for i in 0..num_tiles {
        let rows = base_rows + if i == 0 { leftover } else { 0 };
        tiles.push(Tile {
            index: i as usize,
            x: 0,
            y,
            width,
            height: rows,
        });
        y += rows;
    }
    tiles
}

/// A thread-safe FIFO queue. Generic so the driver can queue a tile bundled
/// with its disjoint film accumulator (see `driver.rs`) while tests here
/// exercise it with bare `Tile`s.
pub struct TileQueue<T> {
    queue: Mutex<VecDeque<T>>,
}

impl<T> TileQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            queue: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Takes the next item, or `None` once the queue is drained.
    pub fn take(&self) -> Option<T> {
        self.queue.lock().unwrap().pop_front()
    }
}

/// Steps a value one ULP toward negative infinity, used to guard against a
/// sub-pixel sample rounding up onto the next integer pixel coordinate.
fn step_down(x: f32) -> f32 {
    if x.is_finite() {
        f32::from_bits(x.to_bits() - 1)
    } else {
        x
    }
}

/// Generates `count` sub-pixel sample positions for the pixel at `(x, y)`.
/// The first sample is always the pixel center (back-compat with
/// pre-multi-sample renders); the rest are uniform in `[x, x+1) x [y, y+1)`.
pub fn pixel_samples(x: u32, y: u32, count: u32, rng: &mut impl Rng) -> Vec<(f32, f32)> {
    let mut samples = Vec::with_capacity(count as usize);
    let (fx, fy) = (x as f32, y as f32);
    if count == 0 {
        return samples;
    }
    samples.push((fx + 0.5, fy + 0.5));
    for _ in 1..count {
        let mut sx = fx + rng.gen::<f32>();
        let mut sy = fy + rng.gen::<f32>();
        if sx >= fx + 1.0 {
            sx = step_down(sx);
        }
        if sy >= fy + 1.0 {
            sy = step_down(sy);
        }
        samples.push((sx, sy));
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_partition_every_pixel_exactly_once() {
        let tiles = partition_tiles(64, 37, 16, 4);
        let mut covered = vec![false; 37];
        let mut total_rows = 0;
        for t in &tiles {
            assert_eq!(t.width, 64);
            for row in t.y..t.y + t.height {
                assert!(!covered[row as usize], "row {row} covered twice");
                covered[row as usize] = true;
            }
            total_rows += t.height;
        }
        assert_eq!(total_rows, 37);
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn first_sample_is_pixel_center() {
        let mut rng = rand::thread_rng();
        let samples = pixel_samples(4, 9, 5, &mut rng);
        assert_eq!(samples[0], (4.5, 9.5));
        assert_eq!(samples.len(), 5);
        for (sx, sy) in &samples[1..] {
            assert!(*sx >= 4.0 && *sx < 5.0);
            assert!(*sy >= 9.0 && *sy < 10.0);
        }
    }
}
