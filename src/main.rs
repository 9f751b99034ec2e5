//! Muon: an offline physically-based ray/path tracer. Renders a scene file
//! to a PNG using a BVH-accelerated Monte Carlo integrator.

mod bounds;
mod bvh;
mod camera;
mod cli;
mod driver;
mod error;
mod film;
mod integrator;
mod light;
mod material;
mod math;
mod parser;
mod primitive;
mod sampler;
mod scene;
mod stats;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use cli::{AccelerationArg, Cli};

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let use_bvh = cli.acceleration == AccelerationArg::Bvh;
    let mut scene = match parser::parse_scene_file(&cli.scene, use_bvh, cli.partition_strategy.into()) {
        Ok(scene) => scene,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(output) = &cli.output {
        scene.settings.output = output.clone();
    }
    scene.settings.parallelism = cli.parallelism.max(1);

    log::info!(
        "rendering {}x{} at {} spp -> {}",
        scene.settings.width,
        scene.settings.height,
        scene.settings.pixel_samples,
        scene.settings.output.display(),
    );

    let start = Instant::now();
    let (film, render_stats) = driver::render(&scene);
    let elapsed = start.elapsed();
    log::info!("render finished in {:.2}s", elapsed.as_secs_f64());

    if cli.stats {
        render_stats.log_summary();
    }

    if let Err(e) = film.write(&scene.settings.output, scene.settings.gamma) {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
