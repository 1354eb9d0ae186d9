use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing engine activity since startup.
#[derive(Default)]
pub struct EngineMetrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    operators_executed: AtomicU64,
}

impl EngineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a run entered the `running` state.
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful run and the number of operators it executed.
    pub fn record_run_completed(&self, operators: u64) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.operators_executed
            .fetch_add(operators, Ordering::Relaxed);
    }

    /// Record a failed run and the operators that completed before failure.
    pub fn record_run_failed(&self, operators: u64) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.operators_executed
            .fetch_add(operators, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            operators_executed: self.operators_executed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of engine counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of runs that started since startup.
    pub runs_started: u64,
    /// Number of runs that completed every operator.
    pub runs_completed: u64,
    /// Number of runs that ended in failure.
    pub runs_failed: u64,
    /// Total operators executed to completion across all runs.
    pub operators_executed: u64,
}
