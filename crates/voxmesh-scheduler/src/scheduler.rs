//! The meshing scheduler: decides which chunks get meshed, when, and whether
//! a finished result is still worth applying.
//!
//! All bookkeeping is single-writer. Hosts call [`MeshingScheduler::mark_dirty`],
//! [`pump`](MeshingScheduler::pump), [`poll`](MeshingScheduler::poll) and
//! [`reprioritize_dirty`](MeshingScheduler::reprioritize_dirty) from one
//! thread; only job execution runs elsewhere, inside the compute unit.
//!
//! Correctness against out-of-order completion rests on per-chunk
//! revisions: every `mark_dirty` bumps the chunk's revision, jobs carry the
//! revision they were sampled at, and a success whose revision is no longer
//! current is discarded.

use std::cmp::Ordering;
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};
use voxmesh_config::Config;
use voxmesh_mesh::{
    ChunkCoord, ComputeUnit, DEFAULT_WATER_LEVEL, MaterialSource, MeshJob, MeshJobResult,
    MeshSuccess, sample_apron_field,
};

use crate::queue::PriorityQueue;
use crate::telemetry::MeshingTelemetry;

/// Static limits and job parameters for a [`MeshingScheduler`].
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Chunk edge length in voxels.
    pub chunk_size: usize,
    /// Maximum outstanding jobs.
    pub max_in_flight: usize,
    /// Maximum dirty chunks waiting for dispatch.
    pub max_queue_size: usize,
    /// Attempts per chunk revision chain before giving up.
    pub max_retries: u32,
    /// Water level sent with each job for vertex coloring.
    pub water_level: f32,
    /// LOD downsample factor sent with each job; `None` disables LOD.
    pub lod_factor: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            max_in_flight: 4,
            max_queue_size: 512,
            max_retries: 3,
            water_level: DEFAULT_WATER_LEVEL,
            lod_factor: Some(voxmesh_mesh::DEFAULT_LOD_FACTOR),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.meshing.chunk_size,
            max_in_flight: config.meshing.max_in_flight,
            max_queue_size: config.meshing.max_queue_size,
            max_retries: config.meshing.max_retries,
            water_level: config.meshing.water_level,
            lod_factor: lod_factor(config),
        }
    }
}

fn lod_factor(config: &Config) -> Option<usize> {
    let factor = config.lod.downsample_factor;
    if !config.lod.enabled {
        return None;
    }
    if factor < 2 {
        warn!(factor, "LOD downsample factor below 2, disabling LOD");
        return None;
    }
    Some(factor)
}

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    coord: ChunkCoord,
    token: u64,
    priority: f64,
}

type EntryOrder = fn(&QueueEntry, &QueueEntry) -> Ordering;

fn by_priority(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    a.priority.total_cmp(&b.priority)
}

#[derive(Clone, Copy, Debug)]
struct InFlightJob {
    coord: ChunkCoord,
    revision: u64,
    dispatched_at: Instant,
    retry_count: u32,
}

type ApplyFn = Box<dyn FnMut(MeshSuccess)>;
type PriorityFn = Box<dyn Fn(ChunkCoord) -> f64>;
type VisibilityFn = Box<dyn Fn(ChunkCoord) -> bool>;

/// Dispatches chunk meshing jobs to a [`ComputeUnit`] and applies results.
///
/// Lower priority values are dispatched first. Chunks reported visible have
/// their priority halved.
pub struct MeshingScheduler<U: ComputeUnit> {
    config: SchedulerConfig,
    unit: U,
    source: Box<dyn MaterialSource>,
    on_apply: ApplyFn,
    priority_fn: Option<PriorityFn>,
    visibility_fn: Option<VisibilityFn>,

    /// Chunk -> current revision. Entries live until `clear_all`.
    revisions: FxHashMap<ChunkCoord, u64>,
    /// Dirty chunk -> token of its one valid queue entry.
    dirty: FxHashMap<ChunkCoord, u64>,
    /// Pending entries, including stale ones skipped at pop time.
    queue: PriorityQueue<QueueEntry, EntryOrder>,
    /// Job id -> dispatch record.
    in_flight: FxHashMap<u64, InFlightJob>,
    /// Chunk -> consecutive failures.
    retries: FxHashMap<ChunkCoord, u32>,

    dropped_tasks: u64,
    next_job_id: u64,
    next_token: u64,
    telemetry: MeshingTelemetry,
    epoch: Instant,
    disposed: bool,
}

impl<U: ComputeUnit> MeshingScheduler<U> {
    /// Creates a scheduler that samples materials from `source`, runs jobs on
    /// `unit`, and hands accepted geometry to `on_apply`.
    pub fn new(
        config: SchedulerConfig,
        unit: U,
        source: impl MaterialSource + 'static,
        on_apply: impl FnMut(MeshSuccess) + 'static,
    ) -> Self {
        Self {
            config,
            unit,
            source: Box::new(source),
            on_apply: Box::new(on_apply),
            priority_fn: None,
            visibility_fn: None,
            revisions: FxHashMap::default(),
            dirty: FxHashMap::default(),
            queue: PriorityQueue::new(by_priority as EntryOrder),
            in_flight: FxHashMap::default(),
            retries: FxHashMap::default(),
            dropped_tasks: 0,
            next_job_id: 1,
            next_token: 0,
            telemetry: MeshingTelemetry::default(),
            epoch: Instant::now(),
            disposed: false,
        }
    }

    /// Sets the priority function (lower is more urgent).
    pub fn with_priority(mut self, priority: impl Fn(ChunkCoord) -> f64 + 'static) -> Self {
        self.set_priority_fn(priority);
        self
    }

    /// Sets the visibility predicate used to boost visible chunks.
    pub fn with_visibility(mut self, visible: impl Fn(ChunkCoord) -> bool + 'static) -> Self {
        self.visibility_fn = Some(Box::new(visible));
        self
    }

    /// Replaces the telemetry collector.
    pub fn with_telemetry(mut self, telemetry: MeshingTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces the priority function. Existing queue entries keep their old
    /// priorities until [`reprioritize_dirty`](Self::reprioritize_dirty).
    pub fn set_priority_fn(&mut self, priority: impl Fn(ChunkCoord) -> f64 + 'static) {
        self.priority_fn = Some(Box::new(priority));
    }

    fn priority_of(&self, coord: ChunkCoord) -> f64 {
        let base = self.priority_fn.as_ref().map_or(0.0, |f| f(coord));
        if self.visibility_fn.as_ref().is_some_and(|v| v(coord)) {
            base * 0.5
        } else {
            base
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn is_valid(&self, entry: &QueueEntry) -> bool {
        self.dirty.get(&entry.coord) == Some(&entry.token)
    }

    fn record_drop(&mut self) {
        self.dropped_tasks += 1;
        self.telemetry.record_dropped();
    }

    /// Marks a chunk as needing a new mesh.
    ///
    /// Bumps the chunk's revision and clears its retry count. A chunk that
    /// is already queued gets a fresh queue entry at its new priority. When
    /// the dirty set is full, the newcomer either evicts the worst queued
    /// chunk (if strictly more urgent) or is dropped; both count as a
    /// dropped task.
    pub fn mark_dirty(&mut self, coord: ChunkCoord) {
        if self.disposed {
            return;
        }
        self.retries.remove(&coord);
        self.enqueue(coord);
    }

    /// Marks each chunk dirty in iteration order.
    pub fn mark_dirty_many(&mut self, coords: impl IntoIterator<Item = ChunkCoord>) {
        for coord in coords {
            self.mark_dirty(coord);
        }
    }

    /// Bumps the revision and queues `coord`. Returns `false` if the chunk
    /// was dropped because the dirty set is full.
    fn enqueue(&mut self, coord: ChunkCoord) -> bool {
        let revision = self.revisions.entry(coord).or_insert(0);
        *revision += 1;
        let revision = *revision;
        let priority = self.priority_of(coord);

        if !self.dirty.contains_key(&coord) && self.dirty.len() >= self.config.max_queue_size {
            let worst = self.queue.find_max(|e| self.is_valid(e)).copied();
            match worst {
                Some(worst) if priority < worst.priority => {
                    self.dirty.remove(&worst.coord);
                    self.record_drop();
                    debug!(
                        evicted = %worst.coord,
                        chunk = %coord,
                        dropped = self.dropped_tasks,
                        "Queue full, evicted lower-priority chunk"
                    );
                }
                _ => {
                    self.record_drop();
                    debug!(
                        chunk = %coord,
                        revision,
                        dropped = self.dropped_tasks,
                        "Queue full, dropped chunk"
                    );
                    return false;
                }
            }
        }

        let token = self.issue_token();
        self.dirty.insert(coord, token);
        self.queue.push(QueueEntry {
            coord,
            token,
            priority,
        });
        self.compact_if_bloated();
        true
    }

    /// Rebuilds the queue from valid entries, in their original insertion
    /// order, optionally recomputing each priority.
    fn rebuild_queue(&mut self, recompute: bool) {
        let entries = self.queue.drain();
        for mut entry in entries {
            if !self.is_valid(&entry) {
                continue;
            }
            if recompute {
                entry.priority = self.priority_of(entry.coord);
            }
            self.queue.push(entry);
        }
    }

    fn compact_if_bloated(&mut self) {
        // Re-marking queued chunks leaves stale entries behind.
        if self.queue.len() > 2 * self.config.max_queue_size.max(self.dirty.len()) + 64 {
            self.rebuild_queue(false);
        }
    }

    /// Recomputes every queued chunk's priority with the current priority
    /// and visibility functions. Dirty-set membership is unchanged.
    pub fn reprioritize_dirty(&mut self) {
        if self.disposed {
            return;
        }
        self.rebuild_queue(true);
        debug!(dirty = self.dirty.len(), "Reprioritized dirty chunks");
    }

    /// Dispatches queued chunks until `max_in_flight` jobs are outstanding or
    /// nothing is dirty. Never blocks. Returns the number of jobs dispatched.
    pub fn pump(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let mut dispatched = 0;
        while self.in_flight.len() < self.config.max_in_flight && !self.dirty.is_empty() {
            let Some(entry) = self.queue.pop() else {
                break;
            };
            if !self.is_valid(&entry) {
                continue;
            }
            self.dirty.remove(&entry.coord);
            self.dispatch(entry.coord);
            dispatched += 1;
        }
        self.telemetry
            .record_queue(self.dirty.len(), self.in_flight.len());
        dispatched
    }

    fn dispatch(&mut self, coord: ChunkCoord) {
        let size = self.config.chunk_size;
        let revision = self.revisions.get(&coord).copied().unwrap_or(0);
        let retry_count = self.retries.get(&coord).copied().unwrap_or(0);
        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let materials = sample_apron_field(size, coord.origin(size), self.source.as_ref());
        let job = MeshJob::new(job_id, coord, size, revision, materials)
            .with_water_level(self.config.water_level)
            .with_lod_factor(self.config.lod_factor)
            .with_queued_at(self.epoch.elapsed().as_millis() as u64);

        let record = InFlightJob {
            coord,
            revision,
            dispatched_at: Instant::now(),
            retry_count,
        };
        self.in_flight.insert(job_id, record);
        self.telemetry.record_dispatch();
        debug!(job_id, chunk = %coord, revision, retry = retry_count, "Dispatching meshing job");

        if let Err(e) = self.unit.submit(job) {
            // No response will ever arrive for this job; fail it here.
            self.in_flight.remove(&job_id);
            self.handle_failure(record, revision, &e.to_string(), true);
        }
    }

    /// Delivers one result from the compute unit, then pumps.
    ///
    /// Results for unknown job ids (already handled, or from before
    /// `clear_all`) are ignored.
    pub fn handle_result(&mut self, result: MeshJobResult) {
        if self.disposed {
            return;
        }
        self.process(result);
        self.pump();
    }

    fn process(&mut self, result: MeshJobResult) {
        let job_id = result.job_id();
        let Some(record) = self.in_flight.remove(&job_id) else {
            debug!(job_id, "Ignoring result for unknown job");
            return;
        };

        match result {
            MeshJobResult::Success(success) => {
                let current = self.chunk_revision(record.coord);
                if success.revision != current {
                    self.telemetry.record_stale();
                    debug!(
                        job_id,
                        chunk = %record.coord,
                        revision = success.revision,
                        current,
                        "Discarding stale meshing result"
                    );
                    return;
                }

                self.retries.remove(&record.coord);
                let wait_ms = record.dispatched_at.elapsed().as_secs_f64() * 1000.0;
                self.telemetry
                    .record_applied(success.meshing_time_ms, wait_ms);
                debug!(job_id, chunk = %record.coord, revision = current, "Applying meshing result");
                (self.on_apply)(success);
            }
            MeshJobResult::Failure(failure) => {
                self.handle_failure(record, failure.revision, &failure.message, failure.retryable);
            }
        }
    }

    fn handle_failure(&mut self, record: InFlightJob, revision: u64, message: &str, retryable: bool) {
        let coord = record.coord;
        let current = self.chunk_revision(coord);
        if revision != current {
            // The chunk was dirtied again after dispatch; the newer revision
            // is already queued or in flight.
            self.telemetry.record_stale();
            debug!(chunk = %coord, revision, current, error = message, "Ignoring failure for stale revision");
            return;
        }

        let attempts = record.retry_count + 1;
        let retry = retryable && attempts < self.config.max_retries;
        if retry && self.enqueue(coord) {
            self.retries.insert(coord, attempts);
            self.telemetry.record_error(true);
            warn!(
                chunk = %coord,
                revision,
                retry = attempts,
                max_retries = self.config.max_retries,
                error = message,
                "Meshing job failed, retrying"
            );
            return;
        }

        self.retries.remove(&coord);
        self.telemetry.record_error(false);
        error!(
            chunk = %coord,
            revision,
            attempts,
            retryable,
            queue_full = retry,
            error = message,
            "Meshing job failed, giving up on chunk"
        );
    }

    /// Drains finished results from the compute unit and handles each.
    /// Returns how many results were processed.
    pub fn poll(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let results = self.unit.poll_results();
        let count = results.len();
        for result in results {
            self.handle_result(result);
        }
        count
    }

    /// Empties every table and the queue, and resets the dropped counter.
    ///
    /// Jobs already running complete on the compute unit; their results are
    /// ignored as unknown.
    pub fn clear_all(&mut self) {
        self.revisions.clear();
        self.dirty.clear();
        self.queue.clear();
        self.in_flight.clear();
        self.retries.clear();
        self.dropped_tasks = 0;
        self.telemetry.record_queue(0, 0);
    }

    /// Clears all state and shuts down the compute unit. Idempotent; later
    /// calls to any mutating operation are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear_all();
        self.unit.shutdown();
        self.disposed = true;
        info!("Meshing scheduler disposed");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Chunks waiting for dispatch, sorted.
    pub fn dirty_keys(&self) -> Vec<ChunkCoord> {
        let mut keys: Vec<_> = self.dirty.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of chunks waiting for dispatch.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Raw queue length, including stale entries not yet skipped.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of outstanding jobs.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Tasks dropped or evicted on overflow since the last `clear_all`.
    pub fn dropped_tasks_count(&self) -> u64 {
        self.dropped_tasks
    }

    /// Current revision of `coord` (0 if never dirtied).
    pub fn chunk_revision(&self, coord: ChunkCoord) -> u64 {
        self.revisions.get(&coord).copied().unwrap_or(0)
    }

    /// Consecutive failures recorded for `coord`.
    pub fn retry_count(&self, coord: ChunkCoord) -> u32 {
        self.retries.get(&coord).copied().unwrap_or(0)
    }

    /// Chunk edge length.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Telemetry collector.
    pub fn telemetry(&self) -> &MeshingTelemetry {
        &self.telemetry
    }

    /// Mutable telemetry collector (enable, disable, reset).
    pub fn telemetry_mut(&mut self) -> &mut MeshingTelemetry {
        &mut self.telemetry
    }

    /// The compute unit.
    pub fn compute_unit(&self) -> &U {
        &self.unit
    }

    /// Mutable compute unit.
    pub fn compute_unit_mut(&mut self) -> &mut U {
        &mut self.unit
    }
}
