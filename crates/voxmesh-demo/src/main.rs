//! Headless driver for the meshing pipeline.
//!
//! Meshes a cube of chunks around a moving focus point on the worker pool,
//! digs a tunnel through the terrain to exercise edit invalidation, then
//! prints a summary and (when enabled) the telemetry snapshot.

mod terrain;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use voxmesh_config::{CliArgs, Config};
use voxmesh_mesh::{
    ChunkCoord, MeshGeometry, MeshSuccess, ThreadPoolComputeUnit, dirty_chunks_for_voxel_edit,
};
use voxmesh_scheduler::{
    MeshingScheduler, MeshingTelemetry, ReprioritizeThrottle, SchedulerConfig, chunk_distance_sq,
    radial_offsets,
};

use terrain::{Edits, TerrainSource};

const DEFAULT_SEED: u32 = 42;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Default)]
struct MeshStats {
    chunks: usize,
    empty_chunks: usize,
    quads: usize,
    triangles: usize,
    vertices: usize,
    lod_vertices: usize,
    /// Position, normal and index bytes a renderer would upload.
    upload_bytes: usize,
}

fn upload_size(geometry: &MeshGeometry) -> usize {
    geometry.position_bytes().len()
        + geometry.normal_bytes().len()
        + geometry.indices.as_bytes().len()
}

impl MeshStats {
    fn record(&mut self, result: &MeshSuccess) {
        self.chunks += 1;
        if result.geometry.is_empty() {
            self.empty_chunks += 1;
        }
        self.quads += result.geometry.quad_count();
        self.triangles += result.geometry.triangle_count();
        self.vertices += result.geometry.vertex_count();
        self.upload_bytes += upload_size(&result.geometry);
        for lod in &result.lods {
            self.lod_vertices += lod.geometry.vertex_count();
            self.upload_bytes += upload_size(&lod.geometry);
        }
    }
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(|| {
        voxmesh_config::default_config_dir().unwrap_or_else(|| std::path::PathBuf::from(".voxmesh"))
    });
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    voxmesh_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(2);
    }

    let seed = args.seed.unwrap_or(DEFAULT_SEED);
    info!(
        seed,
        chunk_size = config.meshing.chunk_size,
        radius = config.focus.view_radius,
        "Starting voxmesh demo"
    );

    run(&config, seed);
}

fn run(config: &Config, seed: u32) {
    let unit = match config.meshing.worker_count {
        0 => ThreadPoolComputeUnit::with_defaults(),
        n => ThreadPoolComputeUnit::new(n),
    };
    info!("Compute unit ready with {} workers", unit.worker_count());

    let edits = Edits::default();
    let source = TerrainSource::new(seed, config.meshing.water_level, Rc::clone(&edits));

    let stats = Rc::new(RefCell::new(MeshStats::default()));
    let sink = Rc::clone(&stats);

    let focus = Rc::new(Cell::new(ChunkCoord::new(0, 0, 0)));
    let priority_focus = Rc::clone(&focus);
    let visible_focus = Rc::clone(&focus);

    let mut scheduler = MeshingScheduler::new(
        SchedulerConfig::from(config),
        unit,
        source,
        move |result: MeshSuccess| sink.borrow_mut().record(&result),
    )
    .with_priority(move |c| chunk_distance_sq(c, priority_focus.get()) as f64)
    .with_visibility(move |c| c.cz >= visible_focus.get().cz)
    .with_telemetry(MeshingTelemetry::from_config(&config.telemetry));

    let mut throttle = ReprioritizeThrottle::from_config(&config.focus);
    let radius = config.focus.view_radius;
    let start = Instant::now();

    // Walk the focus a few chunks along +x, marking the view cube each step.
    for step in 0..3 {
        let center = ChunkCoord::new(step, 0, 0);
        focus.set(center);
        throttle.request();
        scheduler.mark_dirty_many(
            radial_offsets(radius)
                .into_iter()
                .map(|(dx, dy, dz)| center.offset(dx, dy, dz)),
        );
        drive(&mut scheduler, &mut throttle, Duration::from_millis(20));
    }
    drive(&mut scheduler, &mut throttle, DRAIN_TIMEOUT);

    // Tunnel along x at y = 0 through the chunk seams.
    let size = config.meshing.chunk_size as i32;
    let mut edited = Vec::new();
    for x in -size..size {
        edits.borrow_mut().insert((x, 0, 0), 0);
        edited.extend(dirty_chunks_for_voxel_edit(x, 0, 0, size as usize));
    }
    edited.sort();
    edited.dedup();
    info!("Tunnel edit dirtied {} chunks", edited.len());
    scheduler.mark_dirty_many(edited);
    drive(&mut scheduler, &mut throttle, DRAIN_TIMEOUT);

    let elapsed = start.elapsed();
    {
        let stats = stats.borrow();
        info!(
            chunks = stats.chunks,
            empty = stats.empty_chunks,
            quads = stats.quads,
            triangles = stats.triangles,
            vertices = stats.vertices,
            upload_kib = stats.upload_bytes / 1024,
            lod_vertices = stats.lod_vertices,
            dropped = scheduler.dropped_tasks_count(),
            "Meshing finished in {:.1} ms",
            elapsed.as_secs_f64() * 1000.0
        );
    }

    if scheduler.telemetry().is_enabled() {
        match scheduler.telemetry().export_json() {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to export telemetry: {e}"),
        }
    }

    scheduler.dispose();
}

/// Feeds results back into the scheduler until it is idle or `budget` runs out.
fn drive(
    scheduler: &mut MeshingScheduler<ThreadPoolComputeUnit>,
    throttle: &mut ReprioritizeThrottle,
    budget: Duration,
) {
    let deadline = Instant::now() + budget;
    scheduler.pump();
    while scheduler.in_flight_count() > 0 || scheduler.dirty_count() > 0 {
        if throttle.poll(Instant::now()) {
            scheduler.reprioritize_dirty();
        }
        if let Some(result) = scheduler.compute_unit().wait_result(Duration::from_millis(10)) {
            scheduler.handle_result(result);
        }
        scheduler.poll();
        if Instant::now() >= deadline {
            if budget >= DRAIN_TIMEOUT {
                warn!(
                    dirty = scheduler.dirty_count(),
                    in_flight = scheduler.in_flight_count(),
                    "Timed out waiting for the scheduler to drain"
                );
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use voxmesh_mesh::{ChunkInfo, IndexBuffer, LodGeometry, LodLevel};

    use super::*;

    fn quad() -> MeshGeometry {
        MeshGeometry {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            normals: [0.0, 0.0, 1.0].repeat(4),
            indices: IndexBuffer::U16(vec![0, 1, 2, 0, 2, 3]),
            colors: None,
            bounding_sphere: None,
        }
    }

    #[test]
    fn test_stats_count_geometry_and_upload_bytes() {
        let result = MeshSuccess {
            job_id: 1,
            chunk: ChunkInfo::new(ChunkCoord::new(0, 0, 0), 16),
            revision: 1,
            geometry: quad(),
            lods: vec![LodGeometry {
                level: LodLevel::Low,
                geometry: quad(),
            }],
            meshing_time_ms: None,
        };
        let mut stats = MeshStats::default();
        stats.record(&result);

        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.quads, 1);
        assert_eq!(stats.triangles, 2);
        assert_eq!(stats.vertices, 4);
        assert_eq!(stats.lod_vertices, 4);
        // 12 position floats + 12 normal floats + 6 u16 indices, twice.
        assert_eq!(upload_size(&result.geometry), 12 * 4 + 12 * 4 + 6 * 2);
        assert_eq!(stats.upload_bytes, 2 * (12 * 4 + 12 * 4 + 6 * 2));
    }
}
