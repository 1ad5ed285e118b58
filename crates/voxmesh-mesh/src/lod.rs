//! Coarse material fields for reduced-resolution geometry.

use crate::apron::{apron_dim, create_apron_field, index_3d};
use crate::error::MeshError;
use crate::greedy::MATERIAL_AIR;

/// Default downsample factor for the `"low"` LOD.
pub const DEFAULT_LOD_FACTOR: usize = 2;

/// A padded material field at reduced resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct DownsampledField {
    /// Coarse edge length in cells, `ceil(size / factor)`.
    pub size: usize,
    /// World-space edge length of one coarse cell.
    pub voxel_size: f32,
    /// Padded coarse field of `(size + 2)^3` materials.
    pub materials: Vec<u8>,
}

/// Range of fine local coordinates (inclusive) covered by coarse cell `c`.
///
/// Apron cells map onto the fine apron on the same side.
fn fine_range(c: i32, coarse_size: i32, fine_size: i32, factor: i32) -> (i32, i32) {
    if c < 0 {
        (-1, -1)
    } else if c >= coarse_size {
        (fine_size, fine_size)
    } else {
        let start = c * factor;
        (start, (start + factor).min(fine_size) - 1)
    }
}

/// Reduces an `N x N x N` neighborhood of the padded fine field per coarse
/// cell.
///
/// A coarse cell is solid if any fine cell it covers is solid, taking the
/// most frequent solid material (ties go to the lowest id). The any-solid
/// rule keeps thin or sparse features visible at distance.
///
/// # Errors
///
/// * [`MeshError::InvalidLodFactor`] if `factor < 2`.
/// * [`MeshError::InvalidChunkSize`] if `size == 0`.
/// * [`MeshError::MalformedField`] if `field.len() != (size + 2)^3`.
pub fn downsample_materials(
    field: &[u8],
    size: usize,
    factor: usize,
) -> Result<DownsampledField, MeshError> {
    if factor < 2 {
        return Err(MeshError::InvalidLodFactor(factor));
    }
    if size == 0 {
        return Err(MeshError::InvalidChunkSize(size));
    }
    let dim = apron_dim(size);
    let expected = dim * dim * dim;
    if field.len() != expected {
        return Err(MeshError::MalformedField {
            expected,
            actual: field.len(),
        });
    }

    let coarse_size = size.div_ceil(factor);
    let coarse_dim = apron_dim(coarse_size);
    let mut materials = create_apron_field(coarse_size);
    let (cs, fs, f) = (coarse_size as i32, size as i32, factor as i32);
    let mut counts = [0u32; 256];

    for cz in -1..=cs {
        let (z0, z1) = fine_range(cz, cs, fs, f);
        for cy in -1..=cs {
            let (y0, y1) = fine_range(cy, cs, fs, f);
            for cx in -1..=cs {
                let (x0, x1) = fine_range(cx, cs, fs, f);

                counts.fill(0);
                for z in z0..=z1 {
                    for y in y0..=y1 {
                        for x in x0..=x1 {
                            let m = field[index_3d(
                                (x + 1) as usize,
                                (y + 1) as usize,
                                (z + 1) as usize,
                                dim,
                            )];
                            counts[m as usize] += 1;
                        }
                    }
                }

                materials[index_3d(
                    (cx + 1) as usize,
                    (cy + 1) as usize,
                    (cz + 1) as usize,
                    coarse_dim,
                )] = dominant_solid(&counts);
            }
        }
    }

    Ok(DownsampledField {
        size: coarse_size,
        voxel_size: factor as f32,
        materials,
    })
}

fn dominant_solid(counts: &[u32; 256]) -> u8 {
    let mut best = MATERIAL_AIR;
    let mut best_count = 0;
    for (material, &count) in counts.iter().enumerate().skip(1) {
        // Strictly greater keeps the lowest id on ties.
        if count > best_count {
            best = material as u8;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::WorldOrigin;
    use crate::greedy::{GreedyMeshInput, greedy_mesh_chunk};

    fn set(field: &mut [u8], size: usize, x: i32, y: i32, z: i32, m: u8) {
        let dim = apron_dim(size);
        field[index_3d((x + 1) as usize, (y + 1) as usize, (z + 1) as usize, dim)] = m;
    }

    fn get(field: &DownsampledField, x: i32, y: i32, z: i32) -> u8 {
        let dim = apron_dim(field.size);
        field.materials[index_3d((x + 1) as usize, (y + 1) as usize, (z + 1) as usize, dim)]
    }

    #[test]
    fn test_coarse_size_rounds_up() {
        let field = create_apron_field(5);
        let coarse = downsample_materials(&field, 5, 2).unwrap();
        assert_eq!(coarse.size, 3);
        assert_eq!(coarse.materials.len(), 5 * 5 * 5);
        assert_eq!(coarse.voxel_size, 2.0);
    }

    #[test]
    fn test_any_solid_keeps_sparse_voxels() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, 3, 3, 3, 9);
        let coarse = downsample_materials(&field, size, 2).unwrap();
        assert_eq!(get(&coarse, 1, 1, 1), 9);
        assert_eq!(get(&coarse, 0, 0, 0), MATERIAL_AIR);
    }

    #[test]
    fn test_most_frequent_material_wins_ties_lowest() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 0, 0, 0, 4);
        set(&mut field, size, 1, 0, 0, 4);
        set(&mut field, size, 0, 1, 0, 7);
        let coarse = downsample_materials(&field, size, 2).unwrap();
        assert_eq!(get(&coarse, 0, 0, 0), 4);

        set(&mut field, size, 1, 1, 0, 7);
        let coarse = downsample_materials(&field, size, 2).unwrap();
        assert_eq!(get(&coarse, 0, 0, 0), 4, "tie resolves to the lower id");
    }

    #[test]
    fn test_apron_reduced_from_same_side() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, -1, 0, 0, 3);
        set(&mut field, size, 1, size as i32, 2, 5);
        let coarse = downsample_materials(&field, size, 2).unwrap();
        assert_eq!(get(&coarse, -1, 0, 0), 3);
        assert_eq!(get(&coarse, 0, 2, 1), 5);
        assert_eq!(get(&coarse, 0, 0, 0), MATERIAL_AIR);
    }

    #[test]
    fn test_checker_pattern_coarse_geometry_is_smaller() {
        let size = 4;
        let mut field = create_apron_field(size);
        for z in 0..size as i32 {
            for y in 0..size as i32 {
                for x in 0..size as i32 {
                    if (x + y + z) % 2 == 0 {
                        set(&mut field, size, x, y, z, 1);
                    }
                }
            }
        }
        let full = greedy_mesh_chunk(&GreedyMeshInput::new(size, WorldOrigin::default(), &field))
            .unwrap();

        let coarse = downsample_materials(&field, size, 2).unwrap();
        let low = greedy_mesh_chunk(
            &GreedyMeshInput::new(coarse.size, WorldOrigin::default(), &coarse.materials)
                .with_voxel_size(coarse.voxel_size),
        )
        .unwrap();

        assert!(!low.is_empty());
        assert!(low.vertex_count() < full.vertex_count());
        assert!(low.indices.len() < full.indices.len());
    }

    #[test]
    fn test_invalid_factor_and_field() {
        let field = create_apron_field(4);
        assert_eq!(
            downsample_materials(&field, 4, 1),
            Err(MeshError::InvalidLodFactor(1))
        );
        assert!(matches!(
            downsample_materials(&field[..10], 4, 2),
            Err(MeshError::MalformedField { .. })
        ));
    }
}
