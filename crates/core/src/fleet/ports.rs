//! Port interfaces for the relational fleet mirror

use async_trait::async_trait;
use fleetsync_domain::{Device, DeviceModel, DeviceTag, EdgeDevice, LorawanDevice, Result};

/// Repository for plain (non-LoRaWAN) devices.
///
/// `get_by_id` eager-loads tag children. `update` persists scalar columns
/// only; tag children are replaced wholesale via `replace_tags`, never
/// diffed row-by-row.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Device>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Device>>;

    async fn insert(&self, device: &Device) -> Result<()>;

    async fn update(&self, device: &Device) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Replace the owned tag set: all prior rows removed, new set inserted.
    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()>;
}

/// Repository for LoRaWAN devices. Same contract as [`DeviceRepository`].
#[async_trait]
pub trait LorawanDeviceRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<LorawanDevice>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<LorawanDevice>>;

    async fn insert(&self, device: &LorawanDevice) -> Result<()>;

    async fn update(&self, device: &LorawanDevice) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()>;
}

/// Repository for edge devices. Same contract as [`DeviceRepository`].
#[async_trait]
pub trait EdgeDeviceRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<EdgeDevice>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<EdgeDevice>>;

    async fn insert(&self, device: &EdgeDevice) -> Result<()>;

    async fn update(&self, device: &EdgeDevice) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()>;
}

/// Lookup of device models referenced by twin `modelId` tags.
#[async_trait]
pub trait DeviceModelRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<DeviceModel>>;
}

/// Unit-of-work boundary shared by the repositories within one run.
///
/// A reconciliation run brackets its writes with `begin`/`commit`;
/// `rollback` discards pending writes when a run fails mid-way so a
/// partial fetch can never half-apply.
#[async_trait]
pub trait FleetUnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
