//! Meshing job scheduling: dirty-chunk bookkeeping, revision-gated result
//! handling, bounded retries, and a bounded queue with priority eviction.

pub mod priority;
pub mod queue;
pub mod scheduler;
pub mod telemetry;
pub mod throttle;

pub use priority::{chunk_distance_sq, radial_offsets};
pub use queue::PriorityQueue;
pub use scheduler::{MeshingScheduler, SchedulerConfig};
pub use telemetry::{MeshingTelemetry, TelemetrySnapshot};
pub use throttle::ReprioritizeThrottle;
