//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// voxmesh command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "voxmesh", about = "Voxel chunk meshing pipeline")]
pub struct CliArgs {
    /// Chunk edge length in voxels.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum number of outstanding meshing jobs.
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Maximum number of chunks waiting to be meshed.
    #[arg(long)]
    pub max_queue_size: Option<usize>,

    /// Attempts per chunk revision before giving up.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Worker threads (0 = one per spare core).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Radius in chunks of the region to mesh.
    #[arg(long)]
    pub radius: Option<u32>,

    /// Terrain seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.chunk_size {
            self.meshing.chunk_size = size;
        }
        if let Some(n) = args.max_in_flight {
            self.meshing.max_in_flight = n;
        }
        if let Some(n) = args.max_queue_size {
            self.meshing.max_queue_size = n;
        }
        if let Some(n) = args.max_retries {
            self.meshing.max_retries = n;
        }
        if let Some(n) = args.workers {
            self.meshing.worker_count = n;
        }
        if let Some(r) = args.radius {
            self.focus.view_radius = r;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
