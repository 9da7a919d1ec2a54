//! Port interfaces for scheduling data and command execution

use async_trait::async_trait;
use fleetsync_domain::{Device, Layer, Planning, Result, Schedule};

/// Scheduling data re-fetched at the start of every dispatch run.
///
/// None of it is persisted by the dispatch engine; `PlanningCommand`
/// structures are rebuilt from scratch each run and dropped afterwards.
#[async_trait]
pub trait PlanningSource: Send + Sync {
    /// Current device roster (paginated internally by the adapter).
    async fn get_devices(&self) -> Result<Vec<Device>>;

    async fn get_layers(&self) -> Result<Vec<Layer>>;

    async fn get_plannings(&self) -> Result<Vec<Planning>>;

    async fn get_schedules(&self) -> Result<Vec<Schedule>>;
}

/// Sends a command to a single device.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute_command(&self, device_id: &str, command_id: &str) -> Result<()>;
}
