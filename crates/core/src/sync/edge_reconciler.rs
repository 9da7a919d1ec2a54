//! Edge device reconciliation.
//!
//! Same shape as the plain device sync with two differences: building the
//! merge source needs two extra per-device twin fetches (module list and
//! edge agent runtime data), and an accepted merge copies every mapped
//! field unconditionally - the preserve-if-absent rule is specific to the
//! LoRaWAN path.

use std::collections::HashSet;
use std::sync::Arc;

use fleetsync_domain::constants::TAG_MODEL_ID;
use fleetsync_domain::{EdgeDevice, Result, Twin};
use tracing::{debug, error, info, instrument, warn};

use super::twin_mapper::edge_from_twins;
use super::SyncReport;
use crate::fleet::ports::{DeviceModelRepository, EdgeDeviceRepository, FleetUnitOfWork};
use crate::registry::ports::TwinRegistry;

/// Reconciles the local edge-device mirror against the registry.
pub struct EdgeDeviceReconciler {
    registry: Arc<dyn TwinRegistry>,
    edge_devices: Arc<dyn EdgeDeviceRepository>,
    models: Arc<dyn DeviceModelRepository>,
    uow: Arc<dyn FleetUnitOfWork>,
}

impl EdgeDeviceReconciler {
    pub fn new(
        registry: Arc<dyn TwinRegistry>,
        edge_devices: Arc<dyn EdgeDeviceRepository>,
        models: Arc<dyn DeviceModelRepository>,
        uow: Arc<dyn FleetUnitOfWork>,
    ) -> Self {
        Self { registry, edge_devices, models, uow }
    }

    /// Run one full edge reconciliation pass.
    #[instrument(skip(self))]
    pub async fn sync_edge_devices(&self) -> Result<SyncReport> {
        let twins = self.enumerate_twins().await?;
        info!(twin_count = twins.len(), "edge twin enumeration complete");

        self.uow.begin().await?;
        match self.apply_twins(&twins).await {
            Ok(report) => {
                self.uow.commit().await?;
                info!(
                    created = report.created,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    deleted = report.deleted,
                    "edge sync committed"
                );
                Ok(report)
            }
            Err(err) => {
                self.uow.rollback().await?;
                Err(err)
            }
        }
    }

    async fn enumerate_twins(&self) -> Result<Vec<Twin>> {
        let mut twins: Vec<Twin> = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self.registry.get_edge_twins(continuation.as_deref()).await?;
            let page_len = page.items.len();
            twins.extend(page.items);

            debug!(fetched = twins.len(), total = page.total_items, "edge twin page received");

            if twins.len() >= page.total_items || page_len == 0 {
                break;
            }

            match page.next_page {
                Some(token) if !token.is_empty() && Some(&token) != continuation.as_ref() => {
                    continuation = Some(token);
                }
                _ => {
                    warn!(
                        accumulated = twins.len(),
                        total = page.total_items,
                        "continuation token missing or not advancing; stopping enumeration early"
                    );
                    break;
                }
            }
        }

        Ok(twins)
    }

    async fn apply_twins(&self, twins: &[Twin]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(twins.len());

        for twin in twins {
            seen.insert(twin.device_id.as_str());

            let Some(model_id) = twin.tag_str(TAG_MODEL_ID) else {
                warn!(device_id = %twin.device_id, "edge twin has no model tag; skipping");
                report.skipped += 1;
                continue;
            };

            let Some(model) = self.models.get_by_id(model_id).await? else {
                warn!(
                    device_id = %twin.device_id,
                    model_id,
                    "edge twin references an unknown model; skipping"
                );
                report.skipped += 1;
                continue;
            };

            // Enrichment failures skip this device only; the primary
            // enumeration has already succeeded at this point.
            let mapped = match self.build_merge_source(twin, &model.id).await {
                Ok(mapped) => mapped,
                Err(err) => {
                    error!(
                        device_id = %twin.device_id,
                        error = %err,
                        "failed to fetch module twins for edge device; skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            self.merge(twin, mapped, &mut report).await?;
        }

        self.collect_garbage(&seen, &mut report).await?;

        Ok(report)
    }

    /// The primary twin lacks module and runtime data; fetch the
    /// twin-with-modules and twin-with-edge-agent variants to complete it.
    async fn build_merge_source(&self, twin: &Twin, model_id: &str) -> Result<EdgeDevice> {
        let modules_twin = self.registry.get_twin_with_modules(&twin.device_id).await?;
        let agent_twin = self.registry.get_twin_with_edge_agent(&twin.device_id).await?;
        Ok(edge_from_twins(twin, &modules_twin, &agent_twin, model_id))
    }

    async fn merge(&self, twin: &Twin, mapped: EdgeDevice, report: &mut SyncReport) -> Result<()> {
        match self.edge_devices.get_by_id(&twin.device_id).await? {
            None => {
                self.edge_devices.insert(&mapped).await?;
                report.created += 1;
            }
            Some(local) if local.version >= twin.version => {
                debug!(
                    device_id = %twin.device_id,
                    local_version = local.version,
                    twin_version = twin.version,
                    "edge twin version not newer; no-op"
                );
                report.unchanged += 1;
            }
            Some(_) => {
                // Every mapped field is copied; no property-presence gating
                // on the edge path.
                self.edge_devices.replace_tags(&twin.device_id, &mapped.tags).await?;
                self.edge_devices.update(&mapped).await?;
                report.updated += 1;
            }
        }
        Ok(())
    }

    async fn collect_garbage(&self, seen: &HashSet<&str>, report: &mut SyncReport) -> Result<()> {
        for device in self.edge_devices.get_all().await? {
            if !seen.contains(device.id.as_str()) {
                info!(device_id = %device.id, "deleting edge device absent from twin set");
                self.edge_devices.delete(&device.id).await?;
                report.deleted += 1;
            }
        }
        Ok(())
    }
}
