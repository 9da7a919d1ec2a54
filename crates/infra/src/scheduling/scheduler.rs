//! Cron-based scheduler driving the background jobs.
//!
//! Wraps [`tokio_cron_scheduler::JobScheduler`] with explicit lifecycle
//! management: join handles are tracked, cancellation is explicit and every
//! asynchronous lifecycle operation is wrapped in a timeout. Job overlap and
//! failure handling live in [`JobRunner`](super::jobs::JobRunner), not here.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::jobs::JobRunner;

/// Lifecycle timeouts for the scheduler.
#[derive(Debug, Clone)]
pub struct FleetJobSchedulerConfig {
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for FleetJobSchedulerConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Scheduler owning the registered jobs and their cron expressions.
pub struct FleetJobScheduler {
    scheduler: Option<JobScheduler>,
    config: FleetJobSchedulerConfig,
    jobs: Vec<(String, Arc<JobRunner>)>,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl FleetJobScheduler {
    pub fn new() -> Self {
        Self::with_config(FleetJobSchedulerConfig::default())
    }

    pub fn with_config(config: FleetJobSchedulerConfig) -> Self {
        Self {
            scheduler: None,
            config,
            jobs: Vec::new(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Register a job to run on the given cron expression. Takes effect on
    /// the next `start`.
    pub fn register(&mut self, cron_expression: impl Into<String>, runner: Arc<JobRunner>) {
        self.jobs.push((cron_expression.into(), runner));
    }

    /// Start the scheduler, registering all jobs and spawning the monitor.
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|err| SchedulerError::StartFailed(err.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("scheduler monitor task exiting");
        });
        self.monitor_handle = Some(handle);

        info!(jobs = self.jobs.len(), "fleet job scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    ///
    /// A job run in flight is not interrupted; cancellation only prevents
    /// further triggers from firing.
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|err| SchedulerError::StopFailed(err.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::StopFailed(format!("monitor join failed: {err}")))?;
        }

        info!("fleet job scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|err| SchedulerError::CreationFailed(err.to_string()))?;

        for (cron_expression, runner) in &self.jobs {
            let name = runner.job_name();
            let runner = Arc::clone(runner);
            let job = Job::new_async(cron_expression.as_str(), move |_id, _lock| {
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    runner.execute().await;
                })
            })
            .map_err(|err| SchedulerError::JobRegistrationFailed {
                name: name.to_string(),
                message: err.to_string(),
            })?;

            scheduler.add(job).await.map_err(|err| SchedulerError::JobRegistrationFailed {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        }

        Ok(scheduler)
    }
}

impl Default for FleetJobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Ensure the scheduler is stopped when dropped.
impl Drop for FleetJobScheduler {
    fn drop(&mut self) {
        if !self.cancellation.is_cancelled() && self.scheduler.is_some() {
            warn!("FleetJobScheduler dropped while running; cancelling");
            self.cancellation.cancel();
        }
    }
}
