//! Scheduler error types

use fleetsync_domain::FleetError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Failed to create scheduler
    #[error("Failed to create scheduler: {0}")]
    CreationFailed(String),

    /// Failed to start scheduler
    #[error("Failed to start scheduler: {0}")]
    StartFailed(String),

    /// Failed to stop scheduler
    #[error("Failed to stop scheduler: {0}")]
    StopFailed(String),

    /// Failed to register job
    #[error("Failed to register job '{name}': {message}")]
    JobRegistrationFailed { name: String, message: String },

    /// Operation timed out
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let fleet_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                FleetError::InvalidInput(err.to_string())
            }
            SchedulerError::JobRegistrationFailed { .. } => FleetError::Config(err.to_string()),
            _ => FleetError::Internal(err.to_string()),
        };
        InfraError(fleet_err)
    }
}

impl From<SchedulerError> for FleetError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
