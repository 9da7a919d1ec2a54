//! Port interface for the external twin registry

use async_trait::async_trait;
use fleetsync_domain::{Result, Twin, TwinPage};

/// Read-only access to the cloud device registry's twin snapshots.
///
/// Page size and gateway-model exclusion are adapter configuration; the
/// reconcilers only thread continuation tokens through the enumeration.
#[async_trait]
pub trait TwinRegistry: Send + Sync {
    /// Fetch one page of device twins, excluding gateway/concentrator
    /// twins. `continuation` is the token returned by the previous page.
    async fn get_device_twins(&self, continuation: Option<&str>) -> Result<TwinPage>;

    /// Fetch one page of edge-device twins.
    async fn get_edge_twins(&self, continuation: Option<&str>) -> Result<TwinPage>;

    /// Fetch the twin variant carrying the module list for one edge device.
    async fn get_twin_with_modules(&self, device_id: &str) -> Result<Twin>;

    /// Fetch the twin variant carrying the edge agent/hub runtime data for
    /// one edge device.
    async fn get_twin_with_edge_agent(&self, device_id: &str) -> Result<Twin>;
}
