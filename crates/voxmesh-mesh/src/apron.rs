//! Padded ("apron") material sampling.
//!
//! A chunk of edge `size` is meshed from a `(size + 2)^3` byte field that
//! includes a one-voxel shell copied from the neighboring chunks. Face
//! decisions on the chunk boundary then need no access to neighbor data.

use crate::coords::WorldOrigin;
use crate::error::MeshError;

/// Flat byte buffer, one material per padded cell, indexed with [`index_3d`].
pub type MaterialField = Vec<u8>;

/// World material lookup answered by the voxel world.
///
/// Only the low byte of the returned value is stored in a [`MaterialField`];
/// `0` means air.
pub trait MaterialSource {
    /// Material at world voxel `(x, y, z)`.
    fn material_at(&self, x: i32, y: i32, z: i32) -> u32;
}

impl<F> MaterialSource for F
where
    F: Fn(i32, i32, i32) -> u32,
{
    fn material_at(&self, x: i32, y: i32, z: i32) -> u32 {
        self(x, y, z)
    }
}

/// Edge length of the padded field for a chunk of edge `size`.
#[inline]
pub fn apron_dim(size: usize) -> usize {
    size + 2
}

/// Linear index of padded cell `(x, y, z)` in a field of edge `dim`.
#[inline]
pub fn index_3d(x: usize, y: usize, z: usize, dim: usize) -> usize {
    x + y * dim + z * dim * dim
}

/// Allocates a zeroed (all-air) padded field for a chunk of edge `size`.
pub fn create_apron_field(size: usize) -> MaterialField {
    let dim = apron_dim(size);
    vec![0; dim * dim * dim]
}

/// Fills `out` with the padded neighborhood of the chunk at `origin`.
///
/// Padded cell `(lx, ly, lz)` receives `material_at(origin + l - 1) & 0xFF`.
/// Cells are visited z-outer, y-middle, x-inner, each exactly once.
///
/// # Errors
///
/// [`MeshError::MalformedField`] if `out.len() != (size + 2)^3`; `out` is
/// left untouched in that case.
pub fn fill_apron_field(
    out: &mut [u8],
    size: usize,
    origin: WorldOrigin,
    source: &dyn MaterialSource,
) -> Result<(), MeshError> {
    let dim = apron_dim(size);
    let expected = dim * dim * dim;
    if out.len() != expected {
        return Err(MeshError::MalformedField {
            expected,
            actual: out.len(),
        });
    }

    write_apron(out, dim, origin, source);
    Ok(())
}

/// Fills `out`, which must hold `dim^3` cells, in x-fastest order.
fn write_apron(out: &mut [u8], dim: usize, origin: WorldOrigin, source: &dyn MaterialSource) {
    let mut idx = 0;
    for lz in 0..dim as i32 {
        let wz = origin.z + lz - 1;
        for ly in 0..dim as i32 {
            let wy = origin.y + ly - 1;
            for lx in 0..dim as i32 {
                let wx = origin.x + lx - 1;
                out[idx] = (source.material_at(wx, wy, wz) & 0xFF) as u8;
                idx += 1;
            }
        }
    }
}

/// Allocates and fills a padded field in one step.
pub fn sample_apron_field(
    size: usize,
    origin: WorldOrigin,
    source: &dyn MaterialSource,
) -> MaterialField {
    let mut field = create_apron_field(size);
    write_apron(&mut field, apron_dim(size), origin, source);
    field
}
