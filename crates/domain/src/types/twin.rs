//! Twin snapshot types returned by the external device registry.
//!
//! A twin is the registry's authoritative view of a device: identity, tags,
//! desired/reported property bags and a monotonically increasing version.
//! Twins are read-only inputs to reconciliation; the engine never writes
//! them back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of a device twin fetched from the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Twin {
    /// Registry device identifier; also the local entity key.
    pub device_id: String,
    /// Free-form tag map. `modelId` classifies the device.
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
    /// Desired property bag (operator intent).
    #[serde(default)]
    pub desired: BTreeMap<String, Value>,
    /// Reported property bag (device state).
    #[serde(default)]
    pub reported: BTreeMap<String, Value>,
    /// Monotonically increasing twin version; merge gate for the mirror.
    pub version: i64,
    /// Whether the device is currently connected to the registry.
    #[serde(default)]
    pub is_connected: bool,
    /// Whether the device is enabled in the registry.
    #[serde(default)]
    pub is_enabled: bool,
}

impl Twin {
    /// Read a tag as a string, if present and string-valued.
    pub fn tag_str(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(Value::as_str)
    }

    /// Read a desired property as a string, if present.
    ///
    /// Non-string scalars are not coerced; reconciliation treats them as
    /// absent rather than guessing a rendering.
    pub fn desired_str(&self, key: &str) -> Option<&str> {
        self.desired.get(key).and_then(Value::as_str)
    }

    /// Read a reported property as a string, if present.
    pub fn reported_str(&self, key: &str) -> Option<&str> {
        self.reported.get(key).and_then(Value::as_str)
    }

    /// Read a desired property as a boolean, if present.
    pub fn desired_bool(&self, key: &str) -> Option<bool> {
        self.desired.get(key).and_then(Value::as_bool)
    }

    /// Read a desired property as an integer, if present.
    pub fn desired_i64(&self, key: &str) -> Option<i64> {
        self.desired.get(key).and_then(Value::as_i64)
    }
}

/// One page of a paginated twin enumeration.
///
/// The looping contract: keep fetching while the accumulated item count is
/// below `total_items`, threading `next_page` as the next continuation
/// token. An absent or non-advancing token terminates the loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwinPage {
    /// Twins in this page.
    pub items: Vec<Twin>,
    /// Total item count declared by the registry for the full enumeration.
    pub total_items: usize,
    /// Continuation token for the next page, if any.
    pub next_page: Option<String>,
}
