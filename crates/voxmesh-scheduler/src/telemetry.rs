//! Runtime counters and timing history for the meshing pipeline.
//!
//! Owned by the scheduler rather than shared globally. Nothing is recorded
//! while disabled, and disabling discards what was collected.

use std::collections::VecDeque;

use serde::Serialize;
use voxmesh_config::TelemetryConfig;

/// Default number of timing samples kept per series.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Point-in-time view of [`MeshingTelemetry`], serializable for export.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Jobs handed to the compute unit.
    pub dispatched: u64,
    /// Results passed to the apply callback.
    pub applied: u64,
    /// Successful results discarded as stale.
    pub stale_discarded: u64,
    /// Failure results received.
    pub errors: u64,
    /// Failures that were re-queued.
    pub retries: u64,
    /// Chunks given up on after exhausting retries.
    pub abandoned: u64,
    /// Tasks dropped or evicted on queue overflow.
    pub dropped_tasks: u64,
    /// Dirty chunks waiting at the last observation.
    pub queue_length: usize,
    /// Jobs outstanding at the last observation.
    pub in_flight: usize,
    /// Mean compute-unit meshing time over the retained history.
    pub avg_meshing_time_ms: f64,
    /// Longest meshing time in the retained history.
    pub max_meshing_time_ms: f64,
    /// Mean dispatch-to-result time over the retained history.
    pub avg_wait_time_ms: f64,
}

/// Collector for meshing counters and timings.
#[derive(Clone, Debug)]
pub struct MeshingTelemetry {
    enabled: bool,
    history_size: usize,
    meshing_times: VecDeque<f64>,
    wait_times: VecDeque<f64>,
    counters: TelemetrySnapshot,
}

impl Default for MeshingTelemetry {
    fn default() -> Self {
        Self::new(false, DEFAULT_HISTORY_SIZE)
    }
}

impl MeshingTelemetry {
    /// Creates a collector keeping up to `history_size` samples per series.
    pub fn new(enabled: bool, history_size: usize) -> Self {
        Self {
            enabled,
            history_size: history_size.max(1),
            meshing_times: VecDeque::new(),
            wait_times: VecDeque::new(),
            counters: TelemetrySnapshot::default(),
        }
    }

    /// Creates a collector from the telemetry config section.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.enabled, config.history_size)
    }

    /// Turns collection on or off. Turning it off resets all data.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    /// Whether data is being collected.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Discards all counters and samples.
    pub fn reset(&mut self) {
        self.meshing_times.clear();
        self.wait_times.clear();
        self.counters = TelemetrySnapshot::default();
    }

    fn push_sample(history: &mut VecDeque<f64>, limit: usize, value: f64) {
        history.push_back(value);
        while history.len() > limit {
            history.pop_front();
        }
    }

    pub(crate) fn record_dispatch(&mut self) {
        if self.enabled {
            self.counters.dispatched += 1;
        }
    }

    pub(crate) fn record_applied(&mut self, meshing_time_ms: Option<f64>, wait_time_ms: f64) {
        if !self.enabled {
            return;
        }
        self.counters.applied += 1;
        if let Some(ms) = meshing_time_ms {
            Self::push_sample(&mut self.meshing_times, self.history_size, ms);
        }
        Self::push_sample(&mut self.wait_times, self.history_size, wait_time_ms);
    }

    pub(crate) fn record_stale(&mut self) {
        if self.enabled {
            self.counters.stale_discarded += 1;
        }
    }

    pub(crate) fn record_error(&mut self, retried: bool) {
        if !self.enabled {
            return;
        }
        self.counters.errors += 1;
        if retried {
            self.counters.retries += 1;
        } else {
            self.counters.abandoned += 1;
        }
    }

    pub(crate) fn record_dropped(&mut self) {
        if self.enabled {
            self.counters.dropped_tasks += 1;
        }
    }

    pub(crate) fn record_queue(&mut self, queue_length: usize, in_flight: usize) {
        if self.enabled {
            self.counters.queue_length = queue_length;
            self.counters.in_flight = in_flight;
        }
    }

    /// Current counters plus averages over the retained history.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mean = |h: &VecDeque<f64>| {
            if h.is_empty() {
                0.0
            } else {
                h.iter().sum::<f64>() / h.len() as f64
            }
        };
        TelemetrySnapshot {
            avg_meshing_time_ms: mean(&self.meshing_times),
            max_meshing_time_ms: self.meshing_times.iter().copied().fold(0.0, f64::max),
            avg_wait_time_ms: mean(&self.wait_times),
            ..self.counters.clone()
        }
    }

    /// The snapshot as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}
