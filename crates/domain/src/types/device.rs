//! Local fleet entities mirrored from twin snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owned tag-value child row of a device.
///
/// Tag children are replaced wholesale on every accepted twin merge; they
/// are never diffed field-by-field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTag {
    pub name: String,
    pub value: String,
}

/// Device model referenced by the `modelId` twin tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: String,
    pub name: String,
    /// Whether devices of this model carry the LoRaWAN field set.
    pub supports_lorawan: bool,
}

/// Plain (non-LoRaWAN) device mirrored from the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    /// Identifier; equals the twin device id.
    pub id: String,
    pub name: String,
    pub model_id: String,
    /// Twin version at the time of the last accepted merge. A twin is only
    /// merged when its version strictly exceeds this value.
    pub version: i64,
    pub is_connected: bool,
    pub is_enabled: bool,
    /// Last time the connectivity status changed.
    pub status_updated_at: Option<DateTime<Utc>>,
    /// Layer grouping key used by schedule resolution.
    pub layer_id: Option<String>,
    /// Owned, unordered tag children.
    pub tags: Vec<DeviceTag>,
}

/// LoRaWAN device mirrored from the registry.
///
/// The LoRa-specific fields are merged under preserve-if-absent semantics:
/// a twin update that lacks a given desired/reported key leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LorawanDevice {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub version: i64,
    pub is_connected: bool,
    pub is_enabled: bool,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub layer_id: Option<String>,
    pub tags: Vec<DeviceTag>,

    // OTAA key material
    pub app_key: Option<String>,
    pub app_eui: Option<String>,
    // ABP key material
    pub app_s_key: Option<String>,
    pub nwk_s_key: Option<String>,
    pub dev_addr: Option<String>,
    // Routing & radio parameters
    pub gateway_id: Option<String>,
    pub class_type: Option<String>,
    pub preferred_window: Option<i64>,
    pub downlink_enabled: Option<bool>,
    pub rx1_dr_offset: Option<i64>,
    pub rx2_data_rate: Option<i64>,
    pub rx_delay: Option<i64>,
    pub keep_alive_timeout: Option<i64>,
    pub sensor_decoder: Option<String>,
}
