//! Error types for sampling, meshing, the wire protocol and compute units.

/// Contract violations in the sampler or extractor.
///
/// These indicate a caller bug (wrong buffer length, zero-sized chunk), not
/// a transient condition, and must never be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    /// The material buffer does not hold `(size + 2)^3` cells.
    #[error("malformed material field: expected {expected} cells, got {actual}")]
    MalformedField {
        /// Required buffer length.
        expected: usize,
        /// Supplied buffer length.
        actual: usize,
    },

    /// Chunk edge length must be at least one voxel.
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(usize),

    /// Downsampling factor must be at least two.
    #[error("invalid LOD downsample factor {0}")]
    InvalidLodFactor(usize),
}

/// Errors encoding or decoding protocol payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON for the expected message shape.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A geometry array has a length inconsistent with its vertex count.
    #[error("inconsistent geometry: {0}")]
    InconsistentGeometry(&'static str),
}

/// Errors raised by a compute unit when accepting work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    /// The unit has been shut down and accepts no more jobs.
    #[error("compute unit is shut down")]
    ShutDown,

    /// All worker threads exited; the submission channel is closed.
    #[error("compute unit channel closed while submitting job {job_id}")]
    Disconnected {
        /// Job that could not be delivered.
        job_id: u64,
    },
}
