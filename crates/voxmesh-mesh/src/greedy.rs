//! Binary greedy meshing over a padded material field.
//!
//! For each principal axis `d` the slice boundary between layers `s` and
//! `s + 1` is swept for `s` in `-1..size`. A signed mask records which side
//! owns each visible face (`+material` for the near voxel, `-material` for
//! the far one), then same-valued cells are merged into maximal rectangles.
//! Faces whose owning voxel lies in the apron are never emitted, so two
//! neighboring chunks never both produce the shared boundary face.

use crate::apron::{apron_dim, index_3d};
use crate::coords::WorldOrigin;
use crate::error::MeshError;
use crate::face_direction::FaceDirection;
use crate::geometry::{IndexBuffer, MeshGeometry};

/// Material id reserved for empty space.
pub const MATERIAL_AIR: u8 = 0;

/// Input to [`greedy_mesh_chunk`].
#[derive(Clone, Copy, Debug)]
pub struct GreedyMeshInput<'a> {
    /// Chunk edge length in cells (not counting the apron).
    pub size: usize,
    /// World position of the chunk's minimum corner.
    pub origin: WorldOrigin,
    /// Padded field of `(size + 2)^3` materials.
    pub materials: &'a [u8],
    /// World-space edge length of one cell.
    pub voxel_size: f32,
}

impl<'a> GreedyMeshInput<'a> {
    /// Full-resolution input (one world unit per cell).
    pub fn new(size: usize, origin: WorldOrigin, materials: &'a [u8]) -> Self {
        Self {
            size,
            origin,
            materials,
            voxel_size: 1.0,
        }
    }

    /// Sets the world-space cell size (used for coarse LOD fields).
    pub fn with_voxel_size(mut self, voxel_size: f32) -> Self {
        self.voxel_size = voxel_size;
        self
    }
}

/// Accumulates quads into flat vertex arrays.
struct QuadBuilder {
    origin: [f32; 3],
    voxel_size: f32,
    positions: Vec<f32>,
    normals: Vec<f32>,
    indices: Vec<u32>,
}

impl QuadBuilder {
    fn new(origin: WorldOrigin, voxel_size: f32) -> Self {
        Self {
            origin: [origin.x as f32, origin.y as f32, origin.z as f32],
            voxel_size,
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Emits a `w x h` quad on the plane `x[d] = plane`, starting at local
    /// `(u0, v0)` on the `u`/`v` axes.
    #[allow(clippy::too_many_arguments)]
    fn push_quad(
        &mut self,
        direction: FaceDirection,
        u_axis: usize,
        v_axis: usize,
        plane: i32,
        u0: usize,
        v0: usize,
        w: usize,
        h: usize,
    ) {
        let d = direction.axis();
        let mut base = [0i32; 3];
        base[d] = plane;
        base[u_axis] = u0 as i32;
        base[v_axis] = v0 as i32;

        let mut du = [0i32; 3];
        du[u_axis] = w as i32;
        let mut dv = [0i32; 3];
        dv[v_axis] = h as i32;

        let corner = |a: i32, b: i32| -> [i32; 3] {
            [
                base[0] + a * du[0] + b * dv[0],
                base[1] + a * du[1] + b * dv[1],
                base[2] + a * du[2] + b * dv[2],
            ]
        };
        let c0 = corner(0, 0);
        let c1 = corner(1, 0);
        let c2 = corner(1, 1);
        let c3 = corner(0, 1);

        // Counter-clockwise when viewed from the side the normal points to.
        let corners = if direction.is_positive() {
            [c0, c1, c2, c3]
        } else {
            [c0, c3, c2, c1]
        };

        let first = (self.positions.len() / 3) as u32;
        let normal = direction.normal();
        for c in corners {
            for axis in 0..3 {
                self.positions
                    .push(self.origin[axis] + c[axis] as f32 * self.voxel_size);
            }
            self.normals.extend_from_slice(&normal);
        }
        self.indices.extend_from_slice(&[
            first,
            first + 1,
            first + 2,
            first,
            first + 2,
            first + 3,
        ]);
    }

    fn finish(self) -> MeshGeometry {
        let vertex_count = self.positions.len() / 3;
        MeshGeometry {
            positions: self.positions,
            normals: self.normals,
            indices: IndexBuffer::for_vertex_count(self.indices, vertex_count),
            colors: None,
            bounding_sphere: None,
        }
    }
}

/// Extracts merged surface quads from a padded material field.
///
/// Returns an empty geometry (not an error) when nothing is solid.
///
/// # Errors
///
/// * [`MeshError::InvalidChunkSize`] if `size == 0`.
/// * [`MeshError::MalformedField`] if the field length is not `(size + 2)^3`.
pub fn greedy_mesh_chunk(input: &GreedyMeshInput<'_>) -> Result<MeshGeometry, MeshError> {
    let size = input.size;
    if size == 0 {
        return Err(MeshError::InvalidChunkSize(size));
    }
    let dim = apron_dim(size);
    let expected = dim * dim * dim;
    if input.materials.len() != expected {
        return Err(MeshError::MalformedField {
            expected,
            actual: input.materials.len(),
        });
    }

    let field = input.materials;
    // Local cell coordinates run from -1 (apron) to `size` (apron).
    let material = |p: [i32; 3]| -> i32 {
        field[index_3d(
            (p[0] + 1) as usize,
            (p[1] + 1) as usize,
            (p[2] + 1) as usize,
            dim,
        )] as i32
    };

    let mut builder = QuadBuilder::new(input.origin, input.voxel_size);
    let mut mask = vec![0i32; size * size];
    let last = size as i32 - 1;

    for d in 0..3 {
        let u_axis = (d + 1) % 3;
        let v_axis = (d + 2) % 3;

        for slice in -1..size as i32 {
            let mut any = false;
            for iv in 0..size {
                for iu in 0..size {
                    let mut near = [0i32; 3];
                    near[d] = slice;
                    near[u_axis] = iu as i32;
                    near[v_axis] = iv as i32;
                    let mut far = near;
                    far[d] = slice + 1;

                    let a = material(near);
                    let b = material(far);
                    let cell = if a != MATERIAL_AIR as i32 && b == MATERIAL_AIR as i32 {
                        if slice >= 0 { a } else { 0 }
                    } else if b != MATERIAL_AIR as i32 && a == MATERIAL_AIR as i32 {
                        if slice < last { -b } else { 0 }
                    } else {
                        0
                    };
                    any |= cell != 0;
                    mask[iu + iv * size] = cell;
                }
            }
            if !any {
                continue;
            }

            merge_mask(&mut mask, size, |u0, v0, w, h, value| {
                let direction = FaceDirection::from_axis_sign(d, value > 0);
                builder.push_quad(direction, u_axis, v_axis, slice + 1, u0, v0, w, h);
            });
        }
    }

    Ok(builder.finish())
}

/// Greedy rectangle merge over a `size x size` signed mask.
///
/// Calls `emit(u, v, w, h, value)` for each maximal rectangle found in
/// row-major order and zeroes the consumed cells.
fn merge_mask(mask: &mut [i32], size: usize, mut emit: impl FnMut(usize, usize, usize, usize, i32)) {
    for v in 0..size {
        let mut u = 0;
        while u < size {
            let value = mask[u + v * size];
            if value == 0 {
                u += 1;
                continue;
            }

            let mut w = 1;
            while u + w < size && mask[u + w + v * size] == value {
                w += 1;
            }

            let mut h = 1;
            'grow: while v + h < size {
                let row = (v + h) * size;
                for k in 0..w {
                    if mask[u + k + row] != value {
                        break 'grow;
                    }
                }
                h += 1;
            }

            emit(u, v, w, h, value);

            for dv in 0..h {
                let row = (v + dv) * size;
                mask[row + u..row + u + w].fill(0);
            }
            u += w;
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::apron::create_apron_field;

    fn set(field: &mut [u8], size: usize, x: i32, y: i32, z: i32, m: u8) {
        let dim = apron_dim(size);
        field[index_3d((x + 1) as usize, (y + 1) as usize, (z + 1) as usize, dim)] = m;
    }

    fn mesh(field: &[u8], size: usize) -> MeshGeometry {
        greedy_mesh_chunk(&GreedyMeshInput::new(size, WorldOrigin::default(), field))
            .expect("valid field")
    }

    fn assert_winding_matches_normals(geometry: &MeshGeometry) {
        let indices: Vec<u32> = geometry.indices.iter().collect();
        for tri in indices.chunks_exact(3) {
            let a = geometry.position(tri[0] as usize);
            let b = geometry.position(tri[1] as usize);
            let c = geometry.position(tri[2] as usize);
            let face = (b - a).cross(c - a).normalize();
            let stored = geometry.normal(tri[0] as usize);
            assert!(
                face.dot(stored) > 0.9,
                "triangle normal {face:?} disagrees with vertex normal {stored:?}"
            );
        }
    }

    #[test]
    fn test_empty_field_yields_empty_geometry() {
        let field = create_apron_field(4);
        let geometry = mesh(&field, 4);
        assert!(geometry.positions.is_empty());
        assert!(geometry.normals.is_empty());
        assert!(geometry.indices.is_empty());
    }

    #[test]
    fn test_single_voxel_has_six_quads() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, 1, 2, 1, 3);

        let geometry = mesh(&field, size);
        assert_eq!(geometry.quad_count(), 6);
        assert_eq!(geometry.positions.len(), 24 * 3);
        assert_eq!(geometry.normals.len(), geometry.positions.len());
        assert_eq!(geometry.indices.len(), 36);
        assert_winding_matches_normals(&geometry);
    }

    #[test]
    fn test_each_direction_emitted_once_for_single_voxel() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 0, 0, 0, 1);
        let geometry = mesh(&field, size);

        for dir in FaceDirection::ALL {
            let n = Vec3::from(dir.normal());
            let count = (0..geometry.vertex_count())
                .filter(|&i| geometry.normal(i) == n)
                .count();
            assert_eq!(count, 4, "{dir:?}");
        }
    }

    #[test]
    fn test_adjacent_same_material_merges() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, 1, 1, 1, 5);
        set(&mut field, size, 2, 1, 1, 5);

        let geometry = mesh(&field, size);
        assert_eq!(geometry.quad_count(), 6, "internal seam must be merged away");
        assert_winding_matches_normals(&geometry);
    }

    #[test]
    fn test_adjacent_different_materials_do_not_merge() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, 1, 1, 1, 5);
        set(&mut field, size, 2, 1, 1, 6);

        let geometry = mesh(&field, size);
        // Two end caps plus four unmerged side pairs; no face between them.
        assert_eq!(geometry.quad_count(), 10);
    }

    #[test]
    fn test_apron_only_voxel_produces_nothing() {
        let size = 4;
        let mut field = create_apron_field(size);
        set(&mut field, size, -1, 1, 1, 7);
        set(&mut field, size, size as i32, 2, 2, 7);
        set(&mut field, size, 0, -1, 0, 7);
        set(&mut field, size, 3, 3, size as i32, 7);

        let geometry = mesh(&field, size);
        assert!(geometry.is_empty());
    }

    #[test]
    fn test_boundary_face_suppressed_by_solid_apron() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 0, 0, 0, 1);
        set(&mut field, size, -1, 0, 0, 1);

        let geometry = mesh(&field, size);
        assert_eq!(geometry.quad_count(), 5, "the -X face is hidden by the neighbor");
    }

    #[test]
    fn test_solid_chunk_with_empty_apron_is_six_quads() {
        let size = 4;
        let mut field = create_apron_field(size);
        for z in 0..size as i32 {
            for y in 0..size as i32 {
                for x in 0..size as i32 {
                    set(&mut field, size, x, y, z, 2);
                }
            }
        }
        let geometry = mesh(&field, size);
        assert_eq!(geometry.quad_count(), 6);
        assert_winding_matches_normals(&geometry);
    }

    #[test]
    fn test_positions_are_world_space() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 0, 0, 0, 1);
        let origin = WorldOrigin::new(32, -16, 8);

        let geometry =
            greedy_mesh_chunk(&GreedyMeshInput::new(size, origin, &field)).expect("valid field");
        for i in 0..geometry.vertex_count() {
            let p = geometry.position(i);
            assert!(p.x == 32.0 || p.x == 33.0);
            assert!(p.y == -16.0 || p.y == -15.0);
            assert!(p.z == 8.0 || p.z == 9.0);
        }
    }

    #[test]
    fn test_voxel_size_scales_positions() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 1, 1, 1, 1);

        let geometry = greedy_mesh_chunk(
            &GreedyMeshInput::new(size, WorldOrigin::default(), &field).with_voxel_size(2.0),
        )
        .expect("valid field");
        let max = geometry.positions.iter().copied().fold(f32::MIN, f32::max);
        let min = geometry.positions.iter().copied().fold(f32::MAX, f32::min);
        assert_eq!(min, 2.0);
        assert_eq!(max, 4.0);
    }

    #[test]
    fn test_large_output_uses_u32_indices() {
        let size = 32;
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
        let geometry = mesh(&field, size);
        assert!(geometry.vertex_count() > u16::MAX as usize);
        assert!(geometry.indices.is_u32());
        assert_eq!(geometry.indices.len() % 6, 0);
    }

    #[test]
    fn test_small_output_uses_u16_indices() {
        let size = 2;
        let mut field = create_apron_field(size);
        set(&mut field, size, 0, 0, 0, 1);
        assert!(!mesh(&field, size).indices.is_u32());
    }

    #[test]
    fn test_malformed_field_is_rejected() {
        let field = vec![0u8; 10];
        let err = greedy_mesh_chunk(&GreedyMeshInput::new(4, WorldOrigin::default(), &field))
            .unwrap_err();
        assert_eq!(
            err,
            MeshError::MalformedField {
                expected: 216,
                actual: 10
            }
        );
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let field = vec![0u8; 8];
        let err = greedy_mesh_chunk(&GreedyMeshInput::new(0, WorldOrigin::default(), &field))
            .unwrap_err();
        assert_eq!(err, MeshError::InvalidChunkSize(0));
    }

    #[test]
    fn test_merge_mask_emits_maximal_rectangles() {
        let size = 3;
        #[rustfmt::skip]
        let mut mask = vec![
            1, 1, 0,
            1, 1, -1,
            0, 0, -1,
        ];
        let mut quads = Vec::new();
        merge_mask(&mut mask, size, |u, v, w, h, value| quads.push((u, v, w, h, value)));
        assert_eq!(quads, vec![(0, 0, 2, 2, 1), (2, 1, 1, 2, -1)]);
        assert!(mask.iter().all(|&m| m == 0));
    }
}
