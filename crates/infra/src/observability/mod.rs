//! Lightweight runtime observability for background jobs.

pub mod metrics;

pub use metrics::{JobMetrics, JobMetricsSnapshot};
