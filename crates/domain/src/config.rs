//! Configuration structures for the fleet engine.

use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub jobs: JobsConfig,
}

/// Local fleet mirror database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
}

/// Twin registry endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the twin registry API
    pub base_url: String,
    /// Optional API key sent with every request
    pub api_key: Option<String>,
    /// Page size used for paginated twin enumeration
    pub page_size: u32,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Background job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Cron expression for the device reconciliation job
    pub device_sync_cron: String,
    /// Cron expression for the edge-device reconciliation job
    pub edge_sync_cron: String,
    /// Cron expression for the schedule dispatch job
    pub dispatch_cron: String,
    /// Named timezone the dispatcher evaluates schedule windows in
    pub timezone: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            api_key: None,
            page_size: crate::constants::DEFAULT_PAGE_SIZE,
            timeout_seconds: 30,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            device_sync_cron: "0 */5 * * * *".to_string(),
            edge_sync_cron: "0 */5 * * * *".to_string(),
            dispatch_cron: "0 * * * * *".to_string(),
            timezone: "Europe/Paris".to_string(),
        }
    }
}
