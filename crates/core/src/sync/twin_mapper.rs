//! Twin-to-entity mapping.
//!
//! Maps registry twin snapshots into local fleet entities. The LoRaWAN
//! fields go through [`LorawanTwinDelta`], an explicit per-field optional
//! diff: a key absent from the twin payload yields `None` and must leave
//! the stored value untouched when the delta is applied. Keeping the
//! preserve-if-absent rule in one structure makes it auditable and testable
//! in isolation.

use chrono::Utc;
use fleetsync_domain::constants::{
    EDGE_AGENT_MODULE, EDGE_HUB_MODULE, TAG_DEVICE_NAME, TAG_LAYER_ID, TAG_MODEL_ID,
};
use fleetsync_domain::{Device, DeviceTag, EdgeDevice, EdgeModule, LorawanDevice, Twin};
use serde_json::Value;

/// Tag keys promoted to entity columns rather than stored as children.
const RESERVED_TAGS: [&str; 3] = [TAG_MODEL_ID, TAG_DEVICE_NAME, TAG_LAYER_ID];

/// Map a twin into a plain device entity.
pub fn device_from_twin(twin: &Twin, model_id: &str) -> Device {
    Device {
        id: twin.device_id.clone(),
        name: display_name(twin),
        model_id: model_id.to_string(),
        version: twin.version,
        is_connected: twin.is_connected,
        is_enabled: twin.is_enabled,
        status_updated_at: Some(Utc::now()),
        layer_id: layer_id(twin),
        tags: tag_children(twin),
    }
}

/// Map a twin into a LoRaWAN device entity.
///
/// On the insert path the delta is applied to a fresh entity, so only the
/// properties actually present in the twin are populated.
pub fn lorawan_from_twin(twin: &Twin, model_id: &str) -> LorawanDevice {
    let mut device = LorawanDevice {
        id: twin.device_id.clone(),
        name: display_name(twin),
        model_id: model_id.to_string(),
        version: twin.version,
        is_connected: twin.is_connected,
        is_enabled: twin.is_enabled,
        status_updated_at: Some(Utc::now()),
        layer_id: layer_id(twin),
        tags: tag_children(twin),
        ..LorawanDevice::default()
    };
    LorawanTwinDelta::from_twin(twin).apply_to(&mut device);
    device
}

/// Copy the unconditional (identity/connectivity/activity/layer/tag) fields
/// of an accepted LoRaWAN merge onto the stored entity, leaving the
/// property-gated fields for the delta.
pub fn merge_lorawan_base(local: &mut LorawanDevice, twin: &Twin, model_id: &str) {
    local.name = display_name(twin);
    local.model_id = model_id.to_string();
    local.version = twin.version;
    local.is_connected = twin.is_connected;
    local.is_enabled = twin.is_enabled;
    local.status_updated_at = Some(Utc::now());
    local.layer_id = layer_id(twin);
    local.tags = tag_children(twin);
}

/// Map the primary, module and agent twin variants into an edge device.
///
/// Edge merges copy every mapped field unconditionally; there is no
/// preserve-if-absent rule on this path.
pub fn edge_from_twins(twin: &Twin, modules_twin: &Twin, agent_twin: &Twin, model_id: &str) -> EdgeDevice {
    EdgeDevice {
        id: twin.device_id.clone(),
        name: display_name(twin),
        model_id: model_id.to_string(),
        version: twin.version,
        is_connected: twin.is_connected,
        is_enabled: twin.is_enabled,
        status_updated_at: Some(Utc::now()),
        layer_id: layer_id(twin),
        tags: tag_children(twin),
        modules: modules_from_twin(modules_twin),
        connected_clients: agent_twin.reported.get("connectedClients").and_then(Value::as_i64).unwrap_or(0),
        runtime_status: agent_twin.reported_str("runtimeStatus").map(str::to_string),
    }
}

/// Per-field optional diff of the LoRaWAN twin properties.
///
/// `None` means the key was absent from both property bags; applying the
/// delta then leaves the stored field unchanged instead of nulling it out.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LorawanTwinDelta {
    pub app_key: Option<String>,
    pub app_eui: Option<String>,
    pub app_s_key: Option<String>,
    pub nwk_s_key: Option<String>,
    pub dev_addr: Option<String>,
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

impl LorawanTwinDelta {
    /// Extract the LoRaWAN fields present in the twin payload. Desired
    /// properties take precedence; `DevAddr` and `GatewayID` fall back to
    /// the reported bag, where joined devices publish them.
    pub fn from_twin(twin: &Twin) -> Self {
        Self {
            app_key: prop(twin, "AppKey"),
            app_eui: prop(twin, "AppEUI"),
            app_s_key: prop(twin, "AppSKey"),
            nwk_s_key: prop(twin, "NwkSKey"),
            dev_addr: prop(twin, "DevAddr"),
            gateway_id: prop(twin, "GatewayID"),
            class_type: prop(twin, "ClassType"),
            preferred_window: twin.desired_i64("PreferredWindow"),
            downlink_enabled: twin.desired_bool("Downlink"),
            rx1_dr_offset: twin.desired_i64("RX1DROffset"),
            rx2_data_rate: twin.desired_i64("RX2DataRate"),
            rx_delay: twin.desired_i64("RXDelay"),
            keep_alive_timeout: twin.desired_i64("KeepAliveTimeout"),
            sensor_decoder: prop(twin, "SensorDecoder"),
        }
    }

    /// Apply the present fields onto the entity, preserving absent ones.
    pub fn apply_to(&self, device: &mut LorawanDevice) {
        apply(&mut device.app_key, &self.app_key);
        apply(&mut device.app_eui, &self.app_eui);
        apply(&mut device.app_s_key, &self.app_s_key);
        apply(&mut device.nwk_s_key, &self.nwk_s_key);
        apply(&mut device.dev_addr, &self.dev_addr);
        apply(&mut device.gateway_id, &self.gateway_id);
        apply(&mut device.class_type, &self.class_type);
        apply(&mut device.preferred_window, &self.preferred_window);
        apply(&mut device.downlink_enabled, &self.downlink_enabled);
        apply(&mut device.rx1_dr_offset, &self.rx1_dr_offset);
        apply(&mut device.rx2_data_rate, &self.rx2_data_rate);
        apply(&mut device.rx_delay, &self.rx_delay);
        apply(&mut device.keep_alive_timeout, &self.keep_alive_timeout);
        apply(&mut device.sensor_decoder, &self.sensor_decoder);
    }
}

fn apply<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}

fn prop(twin: &Twin, key: &str) -> Option<String> {
    twin.desired_str(key).or_else(|| twin.reported_str(key)).map(str::to_string)
}

fn display_name(twin: &Twin) -> String {
    twin.tag_str(TAG_DEVICE_NAME).unwrap_or(&twin.device_id).to_string()
}

fn layer_id(twin: &Twin) -> Option<String> {
    twin.tag_str(TAG_LAYER_ID).filter(|id| !id.is_empty()).map(str::to_string)
}

fn tag_children(twin: &Twin) -> Vec<DeviceTag> {
    twin.tags
        .iter()
        .filter(|(key, _)| !RESERVED_TAGS.contains(&key.as_str()))
        .map(|(key, value)| DeviceTag {
            name: key.clone(),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect()
}

fn modules_from_twin(twin: &Twin) -> Vec<EdgeModule> {
    let Some(Value::Object(modules)) = twin.reported.get("modules") else {
        return Vec::new();
    };

    modules
        .iter()
        // Runtime system modules are not deployments
        .filter(|(name, _)| name.as_str() != EDGE_AGENT_MODULE && name.as_str() != EDGE_HUB_MODULE)
        .map(|(name, body)| EdgeModule {
            name: name.clone(),
            version: body.get("version").and_then(Value::as_str).map(str::to_string),
            status: body.get("status").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
}
