use serde::{Deserialize, Serialize};

/// Per-run cycle counters. Owned by the orchestrator, so no locking.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: MetricsSnapshot,
}

/// Copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub search_cycles: u64,
    pub locked_cycles: u64,
    pub emitted: u64,
    pub resyncs: u64,
    pub degenerate: u64,
    pub numerical_faults: u64,
    pub gain_adjustments: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_search(&mut self) {
        self.inner.search_cycles += 1;
    }

    pub fn record_locked(&mut self) {
        self.inner.locked_cycles += 1;
    }

    pub fn record_emitted(&mut self) {
        self.inner.emitted += 1;
    }

    pub fn record_resync(&mut self) {
        self.inner.resyncs += 1;
    }

    pub fn record_degenerate(&mut self) {
        self.inner.degenerate += 1;
    }

    pub fn record_numerical_fault(&mut self) {
        self.inner.numerical_faults += 1;
    }

    pub fn record_gain_adjustment(&mut self) {
        self.inner.gain_adjustments += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
    }
}
