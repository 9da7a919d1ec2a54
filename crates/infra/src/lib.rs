//! Infrastructure adapters for the fleet engine.
//!
//! Implements the core crate's ports: SQLite repositories for the local
//! fleet mirror, the registry HTTP client, the cron scheduler that drives
//! the background jobs, and configuration loading.

pub mod config;
pub mod database;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod scheduling;

pub use database::{
    DbManager, SqliteDeviceModelRepository, SqliteDeviceRepository, SqliteEdgeDeviceRepository,
    SqliteLorawanDeviceRepository, SqlitePlanningSource, SqliteUnitOfWork,
};
pub use errors::InfraError;
pub use observability::{JobMetrics, JobMetricsSnapshot};
pub use registry::{RegistryClient, RegistryClientConfig};
pub use scheduling::{
    BackgroundJob, CommandDispatchJob, DeviceSyncJob, EdgeDeviceSyncJob, FleetJobScheduler,
    JobRunner, SchedulerError, SchedulerResult,
};
