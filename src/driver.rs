//! The render driver: tile-parallel dispatch across a fixed worker pool.
//!
//! Each tile is queued together with its disjoint film accumulator, so the
//! only cross-thread coordination is the single `Mutex`-guarded take
//! operation (spec.md §5); once a worker has its `(Tile, TileAccumulator)`
//! pair, its pixel writes need no lock.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::film::{Film, TileAccumulator};
use crate::integrator::Integrator;
use crate::sampler::{partition_tiles, pixel_samples, Tile, TileQueue};
use crate::scene::Scene;
use crate::stats::Stats;

/// Renders `scene` into a fresh `Film`, returning it alongside aggregated
/// trace statistics from every worker.
pub fn render(scene: &Scene) -> (Film, Stats) {
    let settings = &scene.settings;
    let tiles = partition_tiles(
        settings.width,
        settings.height,
        settings.pixel_samples,
        settings.parallelism,
    );
    let row_ranges: Vec<(u32, u32)> = tiles.iter().map(|t| (t.y, t.height)).collect();

    let mut film = Film::new(settings.width, settings.height, settings.pixel_samples);
    let accumulators = film.split_rows(&row_ranges);
    let work: Vec<(Tile, TileAccumulator)> = tiles.into_iter().zip(accumulators).collect();
    let queue = TileQueue::new(work);

    let stats = std::sync::Mutex::new(Stats::default());
    let parallelism = settings.parallelism.max(1);

    rayon::scope(|scope| {
        for worker_id in 0..parallelism {
            let queue = &queue;
            let stats = &stats;
            scope.spawn(move |_| {
                let seed = settings
                    .seed
                    .wrapping_add(worker_id as u64)
                    .wrapping_mul(0x9E3779B97F4A7C15);
                let rng = ChaCha8Rng::seed_from_u64(seed);
                let mut integrator = Integrator::new(scene, settings.integrator_kind, rng);
                let mut sample_rng = ChaCha8Rng::seed_from_u64(seed ^ 0xD1B5_4A32_D192_ED03);

                while let Some((tile, mut accumulator)) = queue.take() {
                    render_tile(&mut integrator, scene, &tile, &mut accumulator, &mut sample_rng);
                }

                let mut locked = stats.lock().unwrap();
                locked.merge(integrator.stats());
            });
        }
    });

    let stats = stats.into_inner().unwrap();
    (film, stats)
}

fn render_tile<R: rand::Rng, S: rand::Rng>(
    integrator: &mut Integrator<'_, R>,
    scene: &Scene,
    tile: &Tile,
    accumulator: &mut TileAccumulator<'_>,
    sample_rng: &mut S,
) {
    for y in tile.y..(tile.y + tile.height) {
        for x in tile.x..(tile.x + tile.width) {
            let samples = pixel_samples(x, y, scene.settings.pixel_samples, sample_rng);
            for (sx, sy) in samples {
                let ray = scene.camera.cast_ray(sx, sy);
                let radiance = integrator.trace(ray);
                accumulator.add_sample(x, y, radiance);
            }
        }
    }
}
