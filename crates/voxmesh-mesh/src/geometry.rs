//! Renderable surface geometry produced by the extractor.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Largest vertex count addressable with 16-bit indices.
pub const MAX_U16_VERTICES: usize = u16::MAX as usize;

/// A point in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// X.
    pub x: f32,
    /// Y.
    pub y: f32,
    /// Z.
    pub z: f32,
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

/// Sphere enclosing every vertex of a geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    /// Center of the positions' axis-aligned bounds.
    pub center: Point3,
    /// Distance from `center` to the farthest vertex.
    pub radius: f32,
}

impl BoundingSphere {
    /// Computes the sphere for a flat `[x, y, z, x, y, z, ...]` position list.
    ///
    /// Empty input yields a zero-radius sphere at the origin.
    pub fn from_positions(positions: &[f32]) -> Self {
        if positions.len() < 3 {
            return Self::default();
        }

        let points = positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]));
        let (min, max) = points.clone().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(p), max.max(p)),
        );
        let center = (min + max) * 0.5;
        let radius_sq = points.map(|p| p.distance_squared(center)).fold(0.0, f32::max);

        Self {
            center: center.into(),
            radius: radius_sq.sqrt(),
        }
    }
}

/// Triangle index list in the narrowest width that addresses every vertex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexBuffer {
    /// 16-bit indices (vertex count ≤ 65535).
    U16(Vec<u16>),
    /// 32-bit indices.
    U32(Vec<u32>),
}

impl Default for IndexBuffer {
    fn default() -> Self {
        Self::U16(Vec::new())
    }
}

impl IndexBuffer {
    /// Picks the index width for `vertex_count` vertices.
    pub fn for_vertex_count(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count <= MAX_U16_VERTICES {
            Self::U16(indices.into_iter().map(|i| i as u16).collect())
        } else {
            Self::U32(indices)
        }
    }

    /// Re-packs the buffer into the width implied by `vertex_count`.
    pub fn normalized(self, vertex_count: usize) -> Self {
        if (vertex_count > MAX_U16_VERTICES) == self.is_u32() {
            return self;
        }
        Self::for_vertex_count(self.iter().collect(), vertex_count)
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no indices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer uses 32-bit indices.
    pub fn is_u32(&self) -> bool {
        matches!(self, Self::U32(_))
    }

    /// Iterates indices widened to `u32`.
    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Self::U16(v) => Box::new(v.iter().map(|&i| i as u32)),
            Self::U32(v) => Box::new(v.iter().copied()),
        }
    }

    /// Raw bytes for GPU upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Surface geometry for one chunk (or one LOD of a chunk).
///
/// Positions, normals and colors are flat `f32` triples, one per vertex.
/// Every quad contributes four vertices and six indices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshGeometry {
    /// Vertex positions in world space.
    pub positions: Vec<f32>,
    /// Axis-aligned unit normals, parallel to `positions`.
    pub normals: Vec<f32>,
    /// Triangle indices.
    pub indices: IndexBuffer,
    /// Optional RGB vertex colors, parallel to `positions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<f32>>,
    /// Optional bounding volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_sphere: Option<BoundingSphere>,
}

impl MeshGeometry {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of merged quads.
    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    /// Whether the geometry has no vertices.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of vertex `i`.
    pub fn position(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[i * 3..i * 3 + 3])
    }

    /// Normal of vertex `i`.
    pub fn normal(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.normals[i * 3..i * 3 + 3])
    }

    /// Raw position bytes for GPU upload.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Raw normal bytes for GPU upload.
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    /// Checks the structural invariants of a decoded geometry.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.positions.len() % 3 != 0 {
            return Err(ProtocolError::InconsistentGeometry(
                "positions length is not a multiple of 3",
            ));
        }
        if self.normals.len() != self.positions.len() {
            return Err(ProtocolError::InconsistentGeometry(
                "normals length differs from positions length",
            ));
        }
        if let Some(colors) = &self.colors
            && colors.len() != self.positions.len()
        {
            return Err(ProtocolError::InconsistentGeometry(
                "colors length differs from positions length",
            ));
        }
        if self.indices.len() % 6 != 0 {
            return Err(ProtocolError::InconsistentGeometry(
                "index count is not a multiple of 6",
            ));
        }
        let vertex_count = self.vertex_count() as u32;
        if self.indices.iter().any(|i| i >= vertex_count) {
            return Err(ProtocolError::InconsistentGeometry("index out of range"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_width_threshold() {
        let small = IndexBuffer::for_vertex_count(vec![0, 1, 2], MAX_U16_VERTICES);
        assert!(!small.is_u32());
        let large = IndexBuffer::for_vertex_count(vec![0, 1, 2], MAX_U16_VERTICES + 1);
        assert!(large.is_u32());
        assert_eq!(large.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_normalized_narrows_u32() {
        let buf = IndexBuffer::U32(vec![0, 1, 2, 0, 2, 3]).normalized(4);
        assert_eq!(buf, IndexBuffer::U16(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(buf.as_bytes().len(), 12);
    }

    #[test]
    fn test_bounding_sphere_empty_is_zero() {
        let sphere = BoundingSphere::from_positions(&[]);
        assert_eq!(sphere.radius, 0.0);
        assert_eq!(sphere.center, Point3::default());
    }

    #[test]
    fn test_bounding_sphere_of_unit_cube_corners() {
        let positions = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0];
        let sphere = BoundingSphere::from_positions(&positions);
        assert_eq!(
            sphere.center,
            Point3 {
                x: 0.5,
                y: 0.5,
                z: 0.5
            }
        );
        assert!((sphere.radius - 0.75f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_mismatched_normals() {
        let geometry = MeshGeometry {
            positions: vec![0.0; 12],
            normals: vec![0.0; 9],
            indices: IndexBuffer::U16(vec![0, 1, 2, 0, 2, 3]),
            ..MeshGeometry::default()
        };
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let geometry = MeshGeometry {
            positions: vec![0.0; 12],
            normals: vec![0.0; 12],
            indices: IndexBuffer::U16(vec![0, 1, 2, 0, 2, 4]),
            ..MeshGeometry::default()
        };
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_empty_geometry_is_valid() {
        let geometry = MeshGeometry::default();
        assert!(geometry.is_empty());
        assert_eq!(geometry.quad_count(), 0);
        assert!(geometry.validate().is_ok());
    }
}
