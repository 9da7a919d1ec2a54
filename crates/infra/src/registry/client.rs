//! Twin registry HTTP client.
//!
//! Implements both registry-facing ports: paginated twin reads for the
//! reconcilers and command posts for the dispatcher. Responses use the
//! registry's camelCase wire format and are mapped into domain twins here.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use fleetsync_core::{CommandExecutor, TwinRegistry};
use fleetsync_domain::constants::{DEFAULT_PAGE_SIZE, GATEWAY_MODEL_TYPE};
use fleetsync_domain::{FleetError, RegistryConfig, Result, Twin, TwinPage};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::http_error;

const API_KEY_HEADER: &str = "x-api-key";

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Base URL of the registry API (e.g. "https://registry.local/api").
    pub base_url: String,
    /// Optional API key sent with every request.
    pub api_key: Option<String>,
    /// Page size requested for twin enumeration.
    pub page_size: u32,
    /// Model type excluded from device twin enumeration. Gateways carry
    /// their own twins but are not mirrored as fleet devices.
    pub exclude_model_type: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            exclude_model_type: GATEWAY_MODEL_TYPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RegistryConfig> for RegistryClientConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            timeout: Duration::from_secs(config.timeout_seconds),
            ..Self::default()
        }
    }
}

/// HTTP client for the twin registry.
pub struct RegistryClient {
    http: reqwest::Client,
    config: RegistryClientConfig,
}

/* Wire format ------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwinDto {
    device_id: String,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
    #[serde(default)]
    properties: TwinPropertiesDto,
    version: i64,
    #[serde(default)]
    connection_state: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct TwinPropertiesDto {
    #[serde(default)]
    desired: BTreeMap<String, Value>,
    #[serde(default)]
    reported: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwinPageDto {
    #[serde(default)]
    items: Vec<TwinDto>,
    #[serde(default)]
    total_items: usize,
    #[serde(default)]
    next_page: Option<String>,
}

impl From<TwinDto> for Twin {
    fn from(dto: TwinDto) -> Self {
        Twin {
            device_id: dto.device_id,
            tags: dto.tags,
            desired: dto.properties.desired,
            reported: dto.properties.reported,
            version: dto.version,
            is_connected: dto.connection_state == "Connected",
            is_enabled: dto.status == "enabled",
        }
    }
}

impl From<TwinPageDto> for TwinPage {
    fn from(dto: TwinPageDto) -> Self {
        TwinPage {
            items: dto.items.into_iter().map(Twin::from).collect(),
            total_items: dto.total_items,
            next_page: dto.next_page,
        }
    }
}

/* Client ------------------------------------------------------------------ */

impl RegistryClient {
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| FleetError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self.http.get(url).query(query);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, url, &body));
        }

        response.json::<T>().await.map_err(http_error)
    }

    async fn get_twin_page(
        &self,
        path: &str,
        continuation: Option<&str>,
        exclude_model_type: Option<&str>,
    ) -> Result<TwinPage> {
        let url = self.url(path);
        let mut query: Vec<(&str, String)> =
            vec![("pageSize", self.config.page_size.to_string())];
        if let Some(token) = continuation {
            query.push(("continuationToken", token.to_string()));
        }
        if let Some(model_type) = exclude_model_type {
            query.push(("excludeModelType", model_type.to_string()));
        }

        let page: TwinPageDto = self.get_json(&url, &query).await?;
        debug!(
            path,
            items = page.items.len(),
            total = page.total_items,
            has_next = page.next_page.is_some(),
            "twin page fetched"
        );
        Ok(page.into())
    }

    async fn get_single_twin(&self, url: &str) -> Result<Twin> {
        let dto: TwinDto = self.get_json(url, &[]).await?;
        Ok(dto.into())
    }
}

fn map_status_error(status: StatusCode, url: &str, body: &str) -> FleetError {
    match status {
        StatusCode::NOT_FOUND => FleetError::NotFound(format!("registry resource {url}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FleetError::Registry(format!("authentication rejected for {url}"))
        }
        _ => FleetError::Registry(format!("http status {status} from {url}: {body}")),
    }
}

#[async_trait]
impl TwinRegistry for RegistryClient {
    #[instrument(skip(self))]
    async fn get_device_twins(&self, continuation: Option<&str>) -> Result<TwinPage> {
        self.get_twin_page(
            "/devices/twins",
            continuation,
            Some(self.config.exclude_model_type.as_str()),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_edge_twins(&self, continuation: Option<&str>) -> Result<TwinPage> {
        self.get_twin_page("/edge-devices/twins", continuation, None).await
    }

    async fn get_twin_with_modules(&self, device_id: &str) -> Result<Twin> {
        let url = self.url(&format!("/devices/{device_id}/twin/modules"));
        self.get_single_twin(&url).await
    }

    async fn get_twin_with_edge_agent(&self, device_id: &str) -> Result<Twin> {
        let url = self.url(&format!("/devices/{device_id}/twin/edge-agent"));
        self.get_single_twin(&url).await
    }
}

#[async_trait]
impl CommandExecutor for RegistryClient {
    #[instrument(skip(self))]
    async fn execute_command(&self, device_id: &str, command_id: &str) -> Result<()> {
        let url = self.url(&format!("/devices/{device_id}/commands/{command_id}"));

        let mut request = self.http.post(&url);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FleetError::Dispatch(format!(
                "command {command_id} to device {device_id} failed with {status}: {body}"
            )));
        }

        debug!(device_id, command_id, "command accepted by registry");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn twin_dto_maps_connection_and_status() {
        let dto: TwinDto = serde_json::from_value(json!({
            "deviceId": "dev-1",
            "tags": {"modelId": "m1"},
            "properties": {"desired": {"AppKey": "abc"}, "reported": {}},
            "version": 7,
            "connectionState": "Connected",
            "status": "enabled"
        }))
        .unwrap();

        let twin = Twin::from(dto);
        assert_eq!(twin.device_id, "dev-1");
        assert_eq!(twin.version, 7);
        assert!(twin.is_connected);
        assert!(twin.is_enabled);
        assert_eq!(twin.desired_str("AppKey"), Some("abc"));
    }

    #[test]
    fn twin_dto_defaults_missing_bags() {
        let dto: TwinDto = serde_json::from_value(json!({
            "deviceId": "dev-2",
            "version": 1
        }))
        .unwrap();

        let twin = Twin::from(dto);
        assert!(!twin.is_connected);
        assert!(!twin.is_enabled);
        assert!(twin.tags.is_empty());
        assert!(twin.desired.is_empty());
    }

    #[test]
    fn page_dto_carries_continuation() {
        let dto: TwinPageDto = serde_json::from_value(json!({
            "items": [],
            "totalItems": 42,
            "nextPage": "token-2"
        }))
        .unwrap();

        let page = TwinPage::from(dto);
        assert_eq!(page.total_items, 42);
        assert_eq!(page.next_page.as_deref(), Some("token-2"));
    }
}
