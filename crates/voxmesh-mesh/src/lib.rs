//! Chunk surface extraction: padded material sampling, binary greedy meshing,
//! coarse LOD geometry, the compute-unit message protocol, and compute units
//! that run meshing jobs off the scheduling thread.

pub mod apron;
pub mod compute;
pub mod coords;
pub mod error;
pub mod face_direction;
pub mod geometry;
pub mod greedy;
pub mod handler;
pub mod invalidation;
pub mod lod;
pub mod protocol;

pub use apron::{
    MaterialField, MaterialSource, apron_dim, create_apron_field, fill_apron_field, index_3d,
    sample_apron_field,
};
pub use compute::{ComputeUnit, InlineComputeUnit, ThreadPoolComputeUnit};
pub use coords::{ChunkCoord, ParseChunkCoordError, WorldOrigin};
pub use error::{ComputeError, MeshError, ProtocolError};
pub use face_direction::FaceDirection;
pub use geometry::{BoundingSphere, IndexBuffer, MAX_U16_VERTICES, MeshGeometry, Point3};
pub use greedy::{GreedyMeshInput, MATERIAL_AIR, greedy_mesh_chunk};
pub use handler::{DEFAULT_WATER_LEVEL, color_for_height, handle_mesh_job, vertex_colors};
pub use invalidation::dirty_chunks_for_voxel_edit;
pub use lod::{DEFAULT_LOD_FACTOR, DownsampledField, downsample_materials};
pub use protocol::{
    ChunkInfo, LodGeometry, LodLevel, MeshFailure, MeshJob, MeshJobResult, MeshSuccess,
    decode_job, decode_result, encode_job, encode_result,
};
