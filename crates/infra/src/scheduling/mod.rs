//! Cron-driven background job execution.

pub mod error;
pub mod jobs;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{BackgroundJob, CommandDispatchJob, DeviceSyncJob, EdgeDeviceSyncJob, JobRunner};
pub use scheduler::FleetJobScheduler;
