//! Per-job counters exposed for diagnostics.
//!
//! Counters are plain atomics; recording never fails and never blocks a job
//! run. One instance is created per registered job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters tracked for one background job.
#[derive(Debug, Default)]
pub struct JobMetrics {
    runs: AtomicU64,
    failures: AtomicU64,
    overlap_skips: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobMetricsSnapshot {
    pub runs: u64,
    pub failures: u64,
    pub overlap_skips: u64,
    pub last_duration_ms: u64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed successful run and its duration.
    pub fn record_run(&self, duration: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.last_duration_ms.store(millis, Ordering::Relaxed);
    }

    /// Record a run that ended in an error.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trigger skipped because the previous run was still going.
    pub fn record_overlap_skip(&self) {
        self.overlap_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            overlap_skips: self.overlap_skips.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}
