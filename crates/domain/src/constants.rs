//! Domain constants shared by the reconciliation and dispatch paths.

/// Twin tag carrying the declared device model id.
pub const TAG_MODEL_ID: &str = "modelId";

/// Twin tag carrying the human-readable device name.
pub const TAG_DEVICE_NAME: &str = "deviceName";

/// Twin tag carrying the layer a device is grouped under.
pub const TAG_LAYER_ID: &str = "layerId";

/// Sentinel value a layer uses when no planning is assigned.
pub const NO_PLANNING: &str = "None";

/// Default page size for paginated twin enumeration.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Model type excluded from device enumeration (concentrators are not
/// reconciled as fleet devices).
pub const GATEWAY_MODEL_TYPE: &str = "LoRa Concentrator";

/// Identity of the edge hub system module fetched during edge enrichment.
pub const EDGE_HUB_MODULE: &str = "$edgeHub";

/// Identity of the edge agent system module fetched during edge enrichment.
pub const EDGE_AGENT_MODULE: &str = "$edgeAgent";
