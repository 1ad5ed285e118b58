//! Messages exchanged between the scheduler and compute units.
//!
//! In-process units move these values through channels directly. Units
//! behind a process or network boundary use the JSON codec below, where
//! every message carries a `kind` tag (`MESH_CHUNK`, `MESH_RESULT`,
//! `MESH_ERROR`) and fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::coords::{ChunkCoord, WorldOrigin};
use crate::error::ProtocolError;
use crate::geometry::MeshGeometry;
use crate::lod::DEFAULT_LOD_FACTOR;

/// Chunk address plus edge length, as sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Chunk-grid X coordinate.
    pub cx: i32,
    /// Chunk-grid Y coordinate.
    pub cy: i32,
    /// Chunk-grid Z coordinate.
    pub cz: i32,
    /// Chunk edge length in voxels.
    pub size: usize,
}

impl ChunkInfo {
    /// Creates chunk info for `coord` with edge length `size`.
    pub fn new(coord: ChunkCoord, size: usize) -> Self {
        Self {
            cx: coord.cx,
            cy: coord.cy,
            cz: coord.cz,
            size,
        }
    }

    /// The chunk coordinate without the size.
    pub fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.cx, self.cy, self.cz)
    }
}

fn default_lod_factor() -> Option<usize> {
    Some(DEFAULT_LOD_FACTOR)
}

/// One chunk to mesh. Immutable once dispatched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshJob {
    /// Correlates the response with this job.
    pub job_id: u64,
    /// Chunk revision the materials were sampled at.
    pub revision: u64,
    /// Target chunk.
    pub chunk: ChunkInfo,
    /// World position of the chunk's minimum corner.
    pub origin: WorldOrigin,
    /// Padded material field, `(size + 2)^3` bytes.
    pub materials: Vec<u8>,
    /// Height used for vertex coloring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level: Option<f32>,
    /// Downsample factor for the low LOD; `None` disables LOD generation.
    #[serde(default = "default_lod_factor")]
    pub lod_factor: Option<usize>,
    /// Milliseconds since the scheduler started when the job was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at_ms: Option<u64>,
}

impl MeshJob {
    /// Creates a job with default water level and LOD settings.
    pub fn new(
        job_id: u64,
        coord: ChunkCoord,
        size: usize,
        revision: u64,
        materials: Vec<u8>,
    ) -> Self {
        Self {
            job_id,
            revision,
            chunk: ChunkInfo::new(coord, size),
            origin: coord.origin(size),
            materials,
            water_level: None,
            lod_factor: default_lod_factor(),
            queued_at_ms: None,
        }
    }

    /// Sets the water level used for coloring.
    pub fn with_water_level(mut self, water_level: f32) -> Self {
        self.water_level = Some(water_level);
        self
    }

    /// Sets the LOD factor (`None` disables LOD).
    pub fn with_lod_factor(mut self, factor: Option<usize>) -> Self {
        self.lod_factor = factor;
        self
    }

    /// Records when the job was queued.
    pub fn with_queued_at(mut self, queued_at_ms: u64) -> Self {
        self.queued_at_ms = Some(queued_at_ms);
        self
    }
}

/// Level tag of a coarse geometry variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LodLevel {
    /// Downsampled by the job's LOD factor.
    Low,
}

/// A coarse geometry variant attached to a successful result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodGeometry {
    /// Which level this geometry represents.
    pub level: LodLevel,
    /// The coarse geometry.
    pub geometry: MeshGeometry,
}

/// Geometry for a chunk at the revision it was sampled at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSuccess {
    /// Job this result answers.
    pub job_id: u64,
    /// Chunk the geometry belongs to.
    pub chunk: ChunkInfo,
    /// Revision of the input materials.
    pub revision: u64,
    /// Full-resolution geometry.
    pub geometry: MeshGeometry,
    /// Coarser variants, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lods: Vec<LodGeometry>,
    /// Wall time spent meshing on the compute unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meshing_time_ms: Option<f64>,
}

/// A job that could not be completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshFailure {
    /// Job this failure answers.
    pub job_id: u64,
    /// Chunk the job was for.
    pub chunk: ChunkInfo,
    /// Revision of the input materials.
    pub revision: u64,
    /// Human-readable reason.
    pub message: String,
    /// `false` for contract violations that will fail the same way again.
    #[serde(default = "default_retryable")]
    pub retryable: bool,
}

fn default_retryable() -> bool {
    true
}

/// Exactly one of these is produced per submitted job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MeshJobResult {
    /// The job produced geometry.
    #[serde(rename = "MESH_RESULT")]
    Success(MeshSuccess),
    /// The job failed.
    #[serde(rename = "MESH_ERROR")]
    Failure(MeshFailure),
}

impl MeshJobResult {
    fn failure_with(job: &MeshJob, message: String, retryable: bool) -> Self {
        Self::Failure(MeshFailure {
            job_id: job.job_id,
            chunk: job.chunk,
            revision: job.revision,
            message,
            retryable,
        })
    }

    /// Builds a retryable failure response for `job`.
    pub fn failure(job: &MeshJob, message: impl Into<String>) -> Self {
        Self::failure_with(job, message.into(), true)
    }

    /// Builds a failure response the scheduler must not retry.
    pub fn fatal(job: &MeshJob, message: impl Into<String>) -> Self {
        Self::failure_with(job, message.into(), false)
    }

    /// Id of the job this result answers.
    pub fn job_id(&self) -> u64 {
        match self {
            Self::Success(s) => s.job_id,
            Self::Failure(f) => f.job_id,
        }
    }

    /// Chunk of the job this result answers.
    pub fn chunk(&self) -> ChunkInfo {
        match self {
            Self::Success(s) => s.chunk,
            Self::Failure(f) => f.chunk,
        }
    }

    /// Revision the job was built at.
    pub fn revision(&self) -> u64 {
        match self {
            Self::Success(s) => s.revision,
            Self::Failure(f) => f.revision,
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// Encoding wraps a borrowed job, decoding an owned one.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind")]
enum JobMessage<J> {
    #[serde(rename = "MESH_CHUNK")]
    MeshChunk(J),
}

/// Encodes a job as a `MESH_CHUNK` message.
pub fn encode_job(job: &MeshJob) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&JobMessage::MeshChunk(job)).map_err(ProtocolError::Encode)
}

/// Decodes a `MESH_CHUNK` message.
pub fn decode_job(bytes: &[u8]) -> Result<MeshJob, ProtocolError> {
    let JobMessage::<MeshJob>::MeshChunk(job) =
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
    Ok(job)
}

/// Encodes a result as a `MESH_RESULT` or `MESH_ERROR` message.
pub fn encode_result(result: &MeshJobResult) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(result).map_err(ProtocolError::Encode)
}

/// Decodes a result message, re-packing index buffers to their narrowest
/// width and checking geometry invariants.
pub fn decode_result(bytes: &[u8]) -> Result<MeshJobResult, ProtocolError> {
    let mut result: MeshJobResult =
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
    if let MeshJobResult::Success(success) = &mut result {
        normalize_geometry(&mut success.geometry)?;
        for lod in &mut success.lods {
            normalize_geometry(&mut lod.geometry)?;
        }
    }
    Ok(result)
}

fn normalize_geometry(geometry: &mut MeshGeometry) -> Result<(), ProtocolError> {
    let vertex_count = geometry.vertex_count();
    geometry.indices = std::mem::take(&mut geometry.indices).normalized(vertex_count);
    geometry.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IndexBuffer;

    fn quad_geometry() -> MeshGeometry {
        MeshGeometry {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            normals: [0.0, 0.0, 1.0].repeat(4),
            indices: IndexBuffer::U16(vec![0, 1, 2, 0, 2, 3]),
            colors: None,
            bounding_sphere: None,
        }
    }

    #[test]
    fn test_job_wire_shape() {
        let job = MeshJob::new(7, ChunkCoord::new(1, -1, 0), 1, 3, vec![0; 27])
            .with_water_level(-12.0);
        let value: serde_json::Value =
            serde_json::from_slice(&encode_job(&job).unwrap()).unwrap();

        assert_eq!(value["kind"], "MESH_CHUNK");
        assert_eq!(value["jobId"], 7);
        assert_eq!(value["revision"], 3);
        assert_eq!(value["chunk"]["cy"], -1);
        assert_eq!(value["chunk"]["size"], 1);
        assert_eq!(value["origin"]["x"], 1);
        assert_eq!(value["materials"].as_array().unwrap().len(), 27);
        assert_eq!(value["waterLevel"], -12.0);
        assert!(value.get("queuedAtMs").is_none());

        assert_eq!(decode_job(&encode_job(&job).unwrap()).unwrap(), job);
    }

    #[test]
    fn test_missing_lod_factor_uses_default() {
        let json = br#"{"kind":"MESH_CHUNK","jobId":1,"revision":1,
            "chunk":{"cx":0,"cy":0,"cz":0,"size":1},"origin":{"x":0,"y":0,"z":0},
            "materials":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0]}"#;
        let job = decode_job(json).unwrap();
        assert_eq!(job.lod_factor, Some(DEFAULT_LOD_FACTOR));
        assert_eq!(job.water_level, None);
    }

    #[test]
    fn test_result_kinds() {
        let job = MeshJob::new(2, ChunkCoord::new(0, 0, 0), 1, 1, vec![0; 27]);
        let failure = MeshJobResult::failure(&job, "boom");
        let value: serde_json::Value =
            serde_json::from_slice(&encode_result(&failure).unwrap()).unwrap();
        assert_eq!(value["kind"], "MESH_ERROR");
        assert_eq!(value["message"], "boom");
        assert_eq!(value["retryable"], true);

        let success = MeshJobResult::Success(MeshSuccess {
            job_id: 2,
            chunk: job.chunk,
            revision: 1,
            geometry: quad_geometry(),
            lods: Vec::new(),
            meshing_time_ms: None,
        });
        let value: serde_json::Value =
            serde_json::from_slice(&encode_result(&success).unwrap()).unwrap();
        assert_eq!(value["kind"], "MESH_RESULT");
        assert_eq!(value["geometry"]["indices"].as_array().unwrap().len(), 6);
        assert!(value.get("lods").is_none());
    }

    #[test]
    fn test_failure_retryable_flag() {
        let job = MeshJob::new(3, ChunkCoord::new(0, 0, 0), 1, 1, vec![0; 27]);
        let MeshJobResult::Failure(fatal) = MeshJobResult::fatal(&job, "bad field") else {
            panic!("expected failure");
        };
        assert!(!fatal.retryable);
        assert_eq!(fatal.job_id, 3);

        // Peers that omit the flag are treated as transient failures.
        let json = br#"{"kind":"MESH_ERROR","jobId":3,"revision":1,
            "chunk":{"cx":0,"cy":0,"cz":0,"size":1},"message":"lost"}"#;
        let MeshJobResult::Failure(decoded) = decode_result(json).unwrap() else {
            panic!("expected failure");
        };
        assert!(decoded.retryable);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = decode_result(br#"{"kind":"MESH_TELEPORT","jobId":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(decode_job(b"not json").is_err());
    }

    #[test]
    fn test_decode_narrows_indices_and_validates() {
        let json = br#"{"kind":"MESH_RESULT","jobId":4,"revision":2,
            "chunk":{"cx":0,"cy":0,"cz":0,"size":2},
            "geometry":{"positions":[0,0,0,1,0,0,1,1,0,0,1,0],
                        "normals":[0,0,1,0,0,1,0,0,1,0,0,1],
                        "indices":[0,1,2,0,2,3],
                        "boundingSphere":{"center":{"x":0.5,"y":0.5,"z":0.0},"radius":0.7}},
            "lods":[{"level":"low","geometry":{"positions":[],"normals":[],"indices":[]}}]}"#;
        let MeshJobResult::Success(success) = decode_result(json).unwrap() else {
            panic!("expected success");
        };
        assert!(!success.geometry.indices.is_u32());
        assert_eq!(success.lods[0].level, LodLevel::Low);
        assert!(success.geometry.bounding_sphere.is_some());

        let broken = br#"{"kind":"MESH_RESULT","jobId":4,"revision":2,
            "chunk":{"cx":0,"cy":0,"cz":0,"size":2},
            "geometry":{"positions":[0,0,0],"normals":[],"indices":[]}}"#;
        assert!(matches!(
            decode_result(broken),
            Err(ProtocolError::InconsistentGeometry(_))
        ));
    }
}
