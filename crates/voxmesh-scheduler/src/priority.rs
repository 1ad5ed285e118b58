//! Distance helpers for ordering chunk work around a focus point.

use voxmesh_mesh::ChunkCoord;

/// Squared chunk-grid distance between `coord` and `focus`.
#[must_use]
pub fn chunk_distance_sq(coord: ChunkCoord, focus: ChunkCoord) -> i64 {
    let dx = (coord.cx - focus.cx) as i64;
    let dy = (coord.cy - focus.cy) as i64;
    let dz = (coord.cz - focus.cz) as i64;
    dx * dx + dy * dy + dz * dz
}

fn sort_nearest_first(offsets: &mut [(i32, i32, i32)]) {
    offsets.sort_by_key(|&(dx, dy, dz)| (dx * dx + dy * dy + dz * dz, dx, dy, dz));
}

/// Every offset in the cube `[-radius, radius]^3`, nearest first.
///
/// Offsets at equal distance are ordered by `dx`, then `dy`, then `dz`.
#[must_use]
pub fn radial_offsets(radius: u32) -> Vec<(i32, i32, i32)> {
    let r = radius as i32;
    let mut offsets = Vec::with_capacity((2 * radius as usize + 1).pow(3));
    for dx in -r..=r {
        for dy in -r..=r {
            for dz in -r..=r {
                offsets.push((dx, dy, dz));
            }
        }
    }
    sort_nearest_first(&mut offsets);
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_sq() {
        let a = ChunkCoord::new(1, 2, 3);
        let b = ChunkCoord::new(-1, 2, 0);
        assert_eq!(chunk_distance_sq(a, b), 4 + 9);
        assert_eq!(chunk_distance_sq(a, a), 0);
    }

    #[test]
    fn test_radial_offsets_nearest_first() {
        let offsets = radial_offsets(1);
        assert_eq!(offsets.len(), 27);
        assert_eq!(offsets[0], (0, 0, 0));
        assert_eq!(&offsets[1..7], &[
            (-1, 0, 0),
            (0, -1, 0),
            (0, 0, -1),
            (0, 0, 1),
            (0, 1, 0),
            (1, 0, 0),
        ]);
        assert_eq!(offsets[26], (1, 1, 1));
    }

    #[test]
    fn test_radial_offsets_zero_radius() {
        assert_eq!(radial_offsets(0), vec![(0, 0, 0)]);
    }
}
