//! Edge device entities mirrored from the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::DeviceTag;

/// Module deployed on an edge device, read from the twin-with-modules
/// variant during enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeModule {
    pub name: String,
    pub version: Option<String>,
    pub status: Option<String>,
}

/// Edge device mirrored from the registry.
///
/// Unlike [`super::LorawanDevice`], an accepted merge copies every mapped
/// field unconditionally; there is no property-presence gating on this
/// path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeDevice {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub version: i64,
    pub is_connected: bool,
    pub is_enabled: bool,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub layer_id: Option<String>,
    pub tags: Vec<DeviceTag>,

    /// Modules reported by the edge agent twin.
    pub modules: Vec<EdgeModule>,
    /// Count of downstream clients connected through the edge hub.
    pub connected_clients: i64,
    /// Runtime status reported by the edge agent (e.g. "running").
    pub runtime_status: Option<String>,
}
