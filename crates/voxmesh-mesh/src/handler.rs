//! Executes one [`MeshJob`] to completion on the calling thread.

use std::time::Instant;

use crate::error::MeshError;
use crate::geometry::{BoundingSphere, MeshGeometry};
use crate::greedy::{GreedyMeshInput, greedy_mesh_chunk};
use crate::lod::downsample_materials;
use crate::protocol::{LodGeometry, LodLevel, MeshJob, MeshJobResult, MeshSuccess};

/// Water level used when a job does not specify one.
pub const DEFAULT_WATER_LEVEL: f32 = -12.0;

const fn rgb(r: u8, g: u8, b: u8) -> [f32; 3] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

const DEEP_WATER: [f32; 3] = rgb(0x1a, 0x4d, 0x8c);
const SHALLOW_WATER: [f32; 3] = rgb(0x2d, 0x73, 0xbf);
const SAND: [f32; 3] = rgb(0xe3, 0xdb, 0xa3);
const GRASS: [f32; 3] = rgb(0x59, 0xa8, 0x48);
const FOREST: [f32; 3] = rgb(0x3b, 0x70, 0x32);
const ROCK: [f32; 3] = rgb(0x6e, 0x6e, 0x6e);
const SNOW: [f32; 3] = [1.0, 1.0, 1.0];

/// Height-banded RGB color for a vertex at height `y`.
pub fn color_for_height(y: f32, water_level: f32) -> [f32; 3] {
    let bands = [
        (water_level - 2.0, DEEP_WATER),
        (water_level + 0.5, SHALLOW_WATER),
        (water_level + 2.5, SAND),
        (water_level + 6.0, GRASS),
        (water_level + 12.0, FOREST),
        (water_level + 20.0, ROCK),
    ];
    bands
        .iter()
        .find(|(limit, _)| y < *limit)
        .map_or(SNOW, |&(_, color)| color)
}

/// One RGB triple per vertex of `positions`.
pub fn vertex_colors(positions: &[f32], water_level: f32) -> Vec<f32> {
    positions
        .chunks_exact(3)
        .flat_map(|p| color_for_height(p[1], water_level))
        .collect()
}

fn decorate(mut geometry: MeshGeometry, water_level: f32) -> MeshGeometry {
    geometry.colors = Some(vertex_colors(&geometry.positions, water_level));
    geometry.bounding_sphere = Some(BoundingSphere::from_positions(&geometry.positions));
    geometry
}

fn low_detail(job: &MeshJob, factor: usize, water_level: f32) -> Result<LodGeometry, MeshError> {
    let coarse = downsample_materials(&job.materials, job.chunk.size, factor)?;
    let low = greedy_mesh_chunk(
        &GreedyMeshInput::new(coarse.size, job.origin, &coarse.materials)
            .with_voxel_size(coarse.voxel_size),
    )?;
    Ok(LodGeometry {
        level: LodLevel::Low,
        geometry: decorate(low, water_level),
    })
}

fn mesh_job(job: &MeshJob) -> Result<MeshSuccess, MeshError> {
    let started = Instant::now();
    let size = job.chunk.size;
    let water_level = job.water_level.unwrap_or(DEFAULT_WATER_LEVEL);

    let full = greedy_mesh_chunk(&GreedyMeshInput::new(size, job.origin, &job.materials))?;
    let geometry = decorate(full, water_level);

    let mut lods = Vec::new();
    if let Some(factor) = job.lod_factor
        && size >= 2
    {
        // A bad LOD request costs the LOD, never the full mesh.
        match low_detail(job, factor, water_level) {
            Ok(lod) => lods.push(lod),
            Err(e) => tracing::warn!(
                job_id = job.job_id,
                chunk = %job.chunk.coord(),
                factor,
                error = %e,
                "Skipping LOD geometry"
            ),
        }
    }

    Ok(MeshSuccess {
        job_id: job.job_id,
        chunk: job.chunk,
        revision: job.revision,
        geometry,
        lods,
        meshing_time_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
    })
}

/// Runs sampling output through the extractor, coloring, bounds and LOD.
///
/// Never panics on bad input. Extractor errors are contract violations and
/// become non-retryable failures carrying the error message.
pub fn handle_mesh_job(job: &MeshJob) -> MeshJobResult {
    match mesh_job(job) {
        Ok(success) => MeshJobResult::Success(success),
        Err(e) => {
            tracing::error!(job_id = job.job_id, chunk = %job.chunk.coord(), error = %e, "Meshing job rejected");
            MeshJobResult::fatal(job, e.to_string())
        }
    }
}
