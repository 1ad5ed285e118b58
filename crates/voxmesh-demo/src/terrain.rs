//! Procedural material source with an editable overlay.

use std::cell::RefCell;
use std::rc::Rc;

use noise::{NoiseFn, Simplex};
use rustc_hash::FxHashMap;
use voxmesh_mesh::MaterialSource;

pub const STONE: u32 = 1;
pub const DIRT: u32 = 2;
pub const GRASS: u32 = 3;
pub const SAND: u32 = 4;

/// Voxel overrides shared between the host and the scheduler's sampler.
pub type Edits = Rc<RefCell<FxHashMap<(i32, i32, i32), u32>>>;

/// Heightmap terrain: fBm simplex noise over the XZ plane.
pub struct TerrainSource {
    noise: Simplex,
    water_level: f32,
    edits: Edits,
}

impl TerrainSource {
    pub fn new(seed: u32, water_level: f32, edits: Edits) -> Self {
        Self {
            noise: Simplex::new(seed),
            water_level,
            edits,
        }
    }

    /// Surface height at world column `(x, z)`.
    pub fn height(&self, x: i32, z: i32) -> f64 {
        let mut total = 0.0;
        let mut frequency = 0.02;
        let mut amplitude = 12.0;
        for _ in 0..4 {
            total += self.noise.get([x as f64 * frequency, z as f64 * frequency]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        total
    }
}

impl MaterialSource for TerrainSource {
    fn material_at(&self, x: i32, y: i32, z: i32) -> u32 {
        if let Some(&m) = self.edits.borrow().get(&(x, y, z)) {
            return m;
        }
        let surface = self.height(x, z).floor() as i32;
        if y > surface {
            return 0;
        }
        let depth = surface - y;
        match depth {
            0 if (surface as f32) < self.water_level + 2.5 => SAND,
            0 => GRASS,
            1..=3 => DIRT,
            _ => STONE,
        }
    }
}
