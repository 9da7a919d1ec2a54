//! Background jobs and the runner that wraps them.
//!
//! Jobs implement [`BackgroundJob`]; [`JobRunner`] owns the overlap guard,
//! metrics and the top-level error handler. A failed run is logged and
//! swallowed so the cron trigger stays alive, and a trigger that fires while
//! the previous run is still going is skipped rather than queued.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fleetsync_core::{CommandDispatcher, DeviceReconciler, EdgeDeviceReconciler};
use fleetsync_domain::Result;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::observability::JobMetrics;

/// One schedulable unit of background work.
#[async_trait]
pub trait BackgroundJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<()>;
}

/// Periodic device twin reconciliation.
pub struct DeviceSyncJob {
    reconciler: Arc<DeviceReconciler>,
}

impl DeviceSyncJob {
    pub fn new(reconciler: Arc<DeviceReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl BackgroundJob for DeviceSyncJob {
    fn name(&self) -> &'static str {
        "device-sync"
    }

    async fn run(&self) -> Result<()> {
        let report = self.reconciler.sync_devices().await?;
        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            deleted = report.deleted,
            "device sync completed"
        );
        Ok(())
    }
}

/// Periodic edge device twin reconciliation.
pub struct EdgeDeviceSyncJob {
    reconciler: Arc<EdgeDeviceReconciler>,
}

impl EdgeDeviceSyncJob {
    pub fn new(reconciler: Arc<EdgeDeviceReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl BackgroundJob for EdgeDeviceSyncJob {
    fn name(&self) -> &'static str {
        "edge-device-sync"
    }

    async fn run(&self) -> Result<()> {
        let report = self.reconciler.sync_edge_devices().await?;
        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            deleted = report.deleted,
            "edge device sync completed"
        );
        Ok(())
    }
}

/// Periodic schedule evaluation and command dispatch.
pub struct CommandDispatchJob {
    dispatcher: Arc<CommandDispatcher>,
}

impl CommandDispatchJob {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl BackgroundJob for CommandDispatchJob {
    fn name(&self) -> &'static str {
        "command-dispatch"
    }

    async fn run(&self) -> Result<()> {
        let report = self.dispatcher.send_commands().await?;
        if report.commands_sent > 0 {
            info!(
                plannings_matched = report.plannings_matched,
                commands_sent = report.commands_sent,
                "command dispatch completed"
            );
        } else {
            debug!("command dispatch completed with nothing to send");
        }
        Ok(())
    }
}

/// Wraps a job with overlap exclusion, metrics and error swallowing.
pub struct JobRunner {
    job: Arc<dyn BackgroundJob>,
    guard: Mutex<()>,
    metrics: Arc<JobMetrics>,
}

impl JobRunner {
    pub fn new(job: Arc<dyn BackgroundJob>, metrics: Arc<JobMetrics>) -> Self {
        Self { job, guard: Mutex::new(()), metrics }
    }

    pub fn job_name(&self) -> &'static str {
        self.job.name()
    }

    /// Execute one triggered run.
    ///
    /// Never returns an error: a failed run is logged, counted and dropped
    /// so the next trigger fires normally.
    pub async fn execute(&self) {
        let Ok(_guard) = self.guard.try_lock() else {
            warn!(job = self.job.name(), "previous run still in progress; skipping trigger");
            self.metrics.record_overlap_skip();
            return;
        };

        debug!(job = self.job.name(), "job triggered");
        let started = Instant::now();

        match self.job.run().await {
            Ok(()) => {
                self.metrics.record_run(started.elapsed());
            }
            Err(err) => {
                error!(
                    job = self.job.name(),
                    error = %err,
                    "job run failed; will retry on next trigger"
                );
                self.metrics.record_failure();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use fleetsync_domain::FleetError;

    use super::*;

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingJob {
        fn new(fail: bool, delay: Duration) -> Self {
            Self { runs: AtomicUsize::new(0), fail, delay }
        }
    }

    #[async_trait]
    impl BackgroundJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(FleetError::Internal("boom".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_run_is_recorded() {
        let metrics = Arc::new(JobMetrics::new());
        let job = Arc::new(CountingJob::new(false, Duration::ZERO));
        let runner = JobRunner::new(job.clone(), metrics.clone());

        runner.execute().await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 1);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn failure_is_swallowed_and_counted() {
        let metrics = Arc::new(JobMetrics::new());
        let runner =
            JobRunner::new(Arc::new(CountingJob::new(true, Duration::ZERO)), metrics.clone());

        // Does not panic or propagate
        runner.execute().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 0);
        assert_eq!(snapshot.failures, 1);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let metrics = Arc::new(JobMetrics::new());
        let job = Arc::new(CountingJob::new(false, Duration::from_millis(200)));
        let runner = Arc::new(JobRunner::new(job.clone(), metrics.clone()));

        let first = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.execute().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Second trigger while the first run sleeps
        runner.execute().await;
        first.await.unwrap();

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 1);
        assert_eq!(snapshot.overlap_skips, 1);
    }
}
