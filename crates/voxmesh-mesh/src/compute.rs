//! Compute units: the execution side of the dispatch boundary.
//!
//! A unit accepts [`MeshJob`]s and eventually yields exactly one
//! [`MeshJobResult`] per job, tagged with the job's id. Results of different
//! jobs may come back in any order.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::ComputeError;
use crate::handler::handle_mesh_job;
use crate::protocol::{MeshJob, MeshJobResult};

/// Executes meshing jobs and reports their outcomes.
pub trait ComputeUnit {
    /// Hands a job to the unit. Must not block on the job's execution.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] if the unit can no longer accept work; no
    /// result will be produced for the job in that case.
    fn submit(&mut self, job: MeshJob) -> Result<(), ComputeError>;

    /// Returns every result that has completed since the last call.
    fn poll_results(&mut self) -> Vec<MeshJobResult>;

    /// Stops accepting jobs and releases the unit's resources.
    fn shutdown(&mut self);
}

/// Runs a job, converting a panic inside the extractor into a failure so
/// the job still gets its single response.
fn run_job(job: &MeshJob) -> MeshJobResult {
    match catch_unwind(AssertUnwindSafe(|| handle_mesh_job(job))) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(job_id = job.job_id, chunk = %job.chunk.coord(), "Meshing job panicked");
            MeshJobResult::failure(job, "meshing job panicked")
        }
    }
}

/// Compute unit backed by a pool of named worker threads.
///
/// Jobs go out over one shared channel; each worker meshes a job and sends
/// the result back on a second channel that [`poll_results`] drains without
/// blocking.
///
/// [`poll_results`]: ComputeUnit::poll_results
pub struct ThreadPoolComputeUnit {
    job_sender: Option<crossbeam_channel::Sender<MeshJob>>,
    result_receiver: crossbeam_channel::Receiver<MeshJobResult>,
    worker_handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl ThreadPoolComputeUnit {
    /// Spawns `worker_count` worker threads (at least one).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<MeshJob>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            let flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name(format!("mesh-worker-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let result = run_job(&job);
                        flight.fetch_sub(1, Ordering::Relaxed);
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                })
                .expect("failed to spawn meshing worker thread");
            handles.push(handle);
        }

        tracing::debug!(workers = worker_count, "Started meshing thread pool");

        Self {
            job_sender: Some(job_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            in_flight,
        }
    }

    /// One worker per core, leaving one core for the scheduling thread.
    pub fn with_defaults() -> Self {
        Self::new(num_cpus::get().saturating_sub(1).max(1))
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Jobs submitted but not yet finished by a worker.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Blocks up to `timeout` for the next finished result.
    ///
    /// For hosts without their own event loop; returns `None` on timeout or
    /// once every worker has exited.
    pub fn wait_result(&self, timeout: Duration) -> Option<MeshJobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }
}

impl ComputeUnit for ThreadPoolComputeUnit {
    fn submit(&mut self, job: MeshJob) -> Result<(), ComputeError> {
        let Some(sender) = &self.job_sender else {
            return Err(ComputeError::ShutDown);
        };
        let job_id = job.job_id;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        if sender.send(job).is_err() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            return Err(ComputeError::Disconnected { job_id });
        }
        Ok(())
    }

    fn poll_results(&mut self) -> Vec<MeshJobResult> {
        self.result_receiver.try_iter().collect()
    }

    fn shutdown(&mut self) {
        // Closing the job channel lets each worker finish its current job and exit.
        if self.job_sender.take().is_none() {
            return;
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("Meshing thread pool stopped");
    }
}

impl Drop for ThreadPoolComputeUnit {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Compute unit that meshes each job synchronously inside `submit`.
///
/// Results are still only handed out through `poll_results`, so callers see
/// the same asynchronous contract as with a thread pool. Useful for tests
/// and single-threaded hosts.
#[derive(Debug, Default)]
pub struct InlineComputeUnit {
    completed: VecDeque<MeshJobResult>,
    shut_down: bool,
}

impl InlineComputeUnit {
    /// Creates an idle unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results waiting to be polled.
    pub fn pending(&self) -> usize {
        self.completed.len()
    }
}

impl ComputeUnit for InlineComputeUnit {
    fn submit(&mut self, job: MeshJob) -> Result<(), ComputeError> {
        if self.shut_down {
            return Err(ComputeError::ShutDown);
        }
        self.completed.push_back(run_job(&job));
        Ok(())
    }

    fn poll_results(&mut self) -> Vec<MeshJobResult> {
        self.completed.drain(..).collect()
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        self.completed.clear();
    }
}
