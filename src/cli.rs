//! Command-line interface, matching the original's `--scene`/`--stats` flags
//! plus the acceleration/partition/parallelism/output controls spec.md §6
//! adds on top.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::bvh::PartitionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AccelerationArg {
    Linear,
    Bvh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartitionStrategyArg {
    Uniform,
    Midpoint,
    Sah,
}

impl From<PartitionStrategyArg> for PartitionStrategy {
    fn from(arg: PartitionStrategyArg) -> Self {
        match arg {
            PartitionStrategyArg::Uniform => PartitionStrategy::Uniform,
            PartitionStrategyArg::Midpoint => PartitionStrategy::Midpoint,
            PartitionStrategyArg::Sah => PartitionStrategy::Sah,
        }
    }
}

/// Muon: an offline physically-based ray/path tracer.
#[derive(Debug, Parser)]
#[command(name = "muon", version, about)]
pub struct Cli {
    /// Path to the scene file to render.
    #[arg(long)]
    pub scene: PathBuf,

    /// Overrides the scene file's `output` command, if set.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Acceleration structure used for ray intersection.
    #[arg(long, value_enum, default_value_t = AccelerationArg::Bvh)]
    pub acceleration: AccelerationArg,

    /// BVH build partition strategy; ignored when `--acceleration linear`.
    #[arg(long, value_enum, default_value_t = PartitionStrategyArg::Midpoint)]
    pub partition_strategy: PartitionStrategyArg,

    /// Number of worker threads to render with.
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Logs aggregated trace statistics (ray counts, BVH node visits) after
    /// rendering.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}
