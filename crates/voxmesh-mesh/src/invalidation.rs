//! Determines which chunks need remeshing after a voxel edit.

use crate::coords::ChunkCoord;
use crate::face_direction::FaceDirection;

fn neighbor(coord: ChunkCoord, direction: FaceDirection) -> ChunkCoord {
    let [dx, dy, dz] = direction.normal().map(|c| c as i32);
    coord.offset(dx, dy, dz)
}

/// Chunks whose geometry depends on world voxel `(x, y, z)`.
///
/// The owning chunk always comes first. A face neighbor is added when the
/// voxel lies on the shared boundary, because the voxel is part of that
/// neighbor's apron. Order is x-, x+, y-, y+, z-, z+.
///
/// Edge and corner neighbors are never included: the extractor only reads
/// apron cells that share a face with the interior.
pub fn dirty_chunks_for_voxel_edit(x: i32, y: i32, z: i32, chunk_size: usize) -> Vec<ChunkCoord> {
    let owner = ChunkCoord::containing(x, y, z, chunk_size);
    let origin = owner.origin(chunk_size);
    let last = chunk_size as i32 - 1;
    let local = [x - origin.x, y - origin.y, z - origin.z];

    let mut dirty = vec![owner];
    for axis in 0..3 {
        if local[axis] == 0 {
            dirty.push(neighbor(owner, FaceDirection::from_axis_sign(axis, false)));
        }
        if local[axis] == last {
            dirty.push(neighbor(owner, FaceDirection::from_axis_sign(axis, true)));
        }
    }
    dirty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_edit_dirties_only_owner() {
        assert_eq!(dirty_chunks_for_voxel_edit(5, 5, 5, 16), vec![ChunkCoord::new(0, 0, 0)]);
    }

    #[test]
    fn test_boundary_edit_dirties_face_neighbors() {
        let dirty = dirty_chunks_for_voxel_edit(16, 31, 7, 16);
        assert_eq!(
            dirty,
            vec![
                ChunkCoord::new(1, 1, 0),
                ChunkCoord::new(0, 1, 0),
                ChunkCoord::new(1, 2, 0),
            ]
        );
    }

    #[test]
    fn test_negative_coordinates() {
        let dirty = dirty_chunks_for_voxel_edit(-1, -16, 0, 16);
        assert_eq!(
            dirty,
            vec![
                ChunkCoord::new(-1, -1, 0),
                ChunkCoord::new(0, -1, 0),
                ChunkCoord::new(-1, -2, 0),
                ChunkCoord::new(-1, -1, -1),
            ]
        );
    }

    #[test]
    fn test_unit_chunks_have_no_duplicates() {
        let dirty = dirty_chunks_for_voxel_edit(0, 0, 0, 1);
        assert_eq!(dirty.len(), 7);
        let mut unique = dirty.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 7);
        assert_eq!(dirty[1], ChunkCoord::new(-1, 0, 0));
        assert_eq!(dirty[2], ChunkCoord::new(1, 0, 0));
    }
}
