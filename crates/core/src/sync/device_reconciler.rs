//! Device reconciliation - full-population sync of plain and LoRaWAN devices.

use std::collections::HashSet;
use std::sync::Arc;

use fleetsync_domain::constants::TAG_MODEL_ID;
use fleetsync_domain::{Result, Twin};
use tracing::{debug, info, instrument, warn};

use super::twin_mapper::{
    device_from_twin, lorawan_from_twin, merge_lorawan_base, LorawanTwinDelta,
};
use super::SyncReport;
use crate::fleet::ports::{
    DeviceModelRepository, DeviceRepository, FleetUnitOfWork, LorawanDeviceRepository,
};
use crate::registry::ports::TwinRegistry;

/// Reconciles the local device mirror against the registry's twin set.
///
/// One run enumerates every device twin (paginated), merges each into the
/// plain or LoRaWAN store under the version gate, garbage-collects local
/// rows with no matching twin, and commits once. Classification failures
/// are per-twin skips; an enumeration failure aborts the run before any
/// write happens.
pub struct DeviceReconciler {
    registry: Arc<dyn TwinRegistry>,
    devices: Arc<dyn DeviceRepository>,
    lorawan_devices: Arc<dyn LorawanDeviceRepository>,
    models: Arc<dyn DeviceModelRepository>,
    uow: Arc<dyn FleetUnitOfWork>,
}

impl DeviceReconciler {
    pub fn new(
        registry: Arc<dyn TwinRegistry>,
        devices: Arc<dyn DeviceRepository>,
        lorawan_devices: Arc<dyn LorawanDeviceRepository>,
        models: Arc<dyn DeviceModelRepository>,
        uow: Arc<dyn FleetUnitOfWork>,
    ) -> Self {
        Self { registry, devices, lorawan_devices, models, uow }
    }

    /// Run one full reconciliation pass.
    ///
    /// Writes happen inside a single unit of work committed at the end; a
    /// failure mid-run rolls back so a partial pass never half-applies.
    #[instrument(skip(self))]
    pub async fn sync_devices(&self) -> Result<SyncReport> {
        let twins = self.enumerate_twins().await?;
        info!(twin_count = twins.len(), "device twin enumeration complete");

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
                    "device sync committed"
                );
                Ok(report)
            }
            Err(err) => {
                self.uow.rollback().await?;
                Err(err)
            }
        }
    }

    /// Enumerate all device twins, threading the continuation token until
    /// the registry's declared total is reached. An absent, empty or
    /// non-advancing token terminates the loop; so does an empty page.
    async fn enumerate_twins(&self) -> Result<Vec<Twin>> {
        let mut twins: Vec<Twin> = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self.registry.get_device_twins(continuation.as_deref()).await?;
            let page_len = page.items.len();
            twins.extend(page.items);

            debug!(fetched = twins.len(), total = page.total_items, "device twin page received");

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
                warn!(device_id = %twin.device_id, "twin has no model tag; skipping");
                report.skipped += 1;
                continue;
            };

            let Some(model) = self.models.get_by_id(model_id).await? else {
                warn!(
                    device_id = %twin.device_id,
                    model_id,
                    "twin references an unknown model; skipping"
                );
                report.skipped += 1;
                continue;
            };

            if model.supports_lorawan {
                self.merge_lorawan(twin, &model.id, &mut report).await?;
            } else {
                self.merge_plain(twin, &model.id, &mut report).await?;
            }
        }

        self.collect_garbage(&seen, &mut report).await?;

        Ok(report)
    }

    async fn merge_plain(&self, twin: &Twin, model_id: &str, report: &mut SyncReport) -> Result<()> {
        match self.devices.get_by_id(&twin.device_id).await? {
            None => {
                self.devices.insert(&device_from_twin(twin, model_id)).await?;
                report.created += 1;
            }
            Some(local) if local.version >= twin.version => {
                debug!(
                    device_id = %twin.device_id,
                    local_version = local.version,
                    twin_version = twin.version,
                    "twin version not newer; no-op"
                );
                report.unchanged += 1;
            }
            Some(_) => {
                let mapped = device_from_twin(twin, model_id);
                self.devices.replace_tags(&twin.device_id, &mapped.tags).await?;
                self.devices.update(&mapped).await?;
                report.updated += 1;
            }
        }
        Ok(())
    }

    async fn merge_lorawan(
        &self,
        twin: &Twin,
        model_id: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.lorawan_devices.get_by_id(&twin.device_id).await? {
            None => {
                self.lorawan_devices.insert(&lorawan_from_twin(twin, model_id)).await?;
                report.created += 1;
            }
            Some(local) if local.version >= twin.version => {
                report.unchanged += 1;
            }
            Some(mut local) => {
                merge_lorawan_base(&mut local, twin, model_id);
                // LoRa fields only where the twin payload carries the key;
                // absence must not clobber a stored value.
                LorawanTwinDelta::from_twin(twin).apply_to(&mut local);
                self.lorawan_devices.replace_tags(&twin.device_id, &local.tags).await?;
                self.lorawan_devices.update(&local).await?;
                report.updated += 1;
            }
        }
        Ok(())
    }

    /// Delete local devices absent from the twin set. Only valid after a
    /// completed enumeration; a partial fetch has already aborted the run
    /// by the time this is reached.
    async fn collect_garbage(&self, seen: &HashSet<&str>, report: &mut SyncReport) -> Result<()> {
        for device in self.devices.get_all().await? {
            if !seen.contains(device.id.as_str()) {
                info!(device_id = %device.id, "deleting device absent from twin set");
                self.devices.delete(&device.id).await?;
                report.deleted += 1;
            }
        }

        for device in self.lorawan_devices.get_all().await? {
            if !seen.contains(device.id.as_str()) {
                info!(device_id = %device.id, "deleting lorawan device absent from twin set");
                self.lorawan_devices.delete(&device.id).await?;
                report.deleted += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fleetsync_domain::{Device, DeviceModel, DeviceTag, FleetError, LorawanDevice, TwinPage};
    use serde_json::json;

    use super::*;

    // Mock registry serving a fixed sequence of pages
    struct MockRegistry {
        pages: Vec<TwinPage>,
        calls: AtomicUsize,
    }

    impl MockRegistry {
        fn new(pages: Vec<TwinPage>) -> Self {
            Self { pages, calls: AtomicUsize::new(0) }
        }

        fn single_page(twins: Vec<Twin>) -> Self {
            let total_items = twins.len();
            Self::new(vec![TwinPage { items: twins, total_items, next_page: None }])
        }
    }

    #[async_trait]
    impl TwinRegistry for MockRegistry {
        async fn get_device_twins(&self, _continuation: Option<&str>) -> Result<TwinPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(call)
                .cloned()
                .ok_or_else(|| FleetError::Registry("no more pages".into()))
        }

        async fn get_edge_twins(&self, _continuation: Option<&str>) -> Result<TwinPage> {
            Err(FleetError::Registry("not an edge registry".into()))
        }

        async fn get_twin_with_modules(&self, _device_id: &str) -> Result<Twin> {
            Err(FleetError::Registry("not an edge registry".into()))
        }

        async fn get_twin_with_edge_agent(&self, _device_id: &str) -> Result<Twin> {
            Err(FleetError::Registry("not an edge registry".into()))
        }
    }

    #[derive(Default)]
    struct MockDeviceRepo {
        rows: Mutex<HashMap<String, Device>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl DeviceRepository for MockDeviceRepo {
        async fn get_all(&self) -> Result<Vec<Device>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<Device>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn insert(&self, device: &Device) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.rows.lock().unwrap().insert(device.id.clone(), device.clone());
            Ok(())
        }

        async fn update(&self, device: &Device) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            let entry = rows
                .get_mut(&device.id)
                .ok_or_else(|| FleetError::NotFound(device.id.clone()))?;
            let tags = entry.tags.clone();
            *entry = device.clone();
            entry.tags = tags; // scalar update only; tags go through replace_tags
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.rows.lock().unwrap().remove(id);
            Ok(())
        }

        async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(entry) = self.rows.lock().unwrap().get_mut(device_id) {
                entry.tags = tags.to_vec();
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockLorawanRepo {
        rows: Mutex<HashMap<String, LorawanDevice>>,
    }

    #[async_trait]
    impl LorawanDeviceRepository for MockLorawanRepo {
        async fn get_all(&self) -> Result<Vec<LorawanDevice>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<LorawanDevice>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn insert(&self, device: &LorawanDevice) -> Result<()> {
            self.rows.lock().unwrap().insert(device.id.clone(), device.clone());
            Ok(())
        }

        async fn update(&self, device: &LorawanDevice) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let entry = rows
                .get_mut(&device.id)
                .ok_or_else(|| FleetError::NotFound(device.id.clone()))?;
            let tags = entry.tags.clone();
            *entry = device.clone();
            entry.tags = tags;
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.rows.lock().unwrap().remove(id);
            Ok(())
        }

        async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()> {
            if let Some(entry) = self.rows.lock().unwrap().get_mut(device_id) {
                entry.tags = tags.to_vec();
            }
            Ok(())
        }
    }

    struct MockModelRepo {
        models: HashMap<String, DeviceModel>,
    }

    impl MockModelRepo {
        fn with(models: Vec<DeviceModel>) -> Self {
            Self { models: models.into_iter().map(|m| (m.id.clone(), m)).collect() }
        }
    }

    #[async_trait]
    impl DeviceModelRepository for MockModelRepo {
        async fn get_by_id(&self, id: &str) -> Result<Option<DeviceModel>> {
            Ok(self.models.get(id).cloned())
        }
    }

    #[derive(Default)]
    struct MockUow {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    #[async_trait]
    impl FleetUnitOfWork for MockUow {
        async fn begin(&self) -> Result<()> {
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        registry: Arc<MockRegistry>,
        devices: Arc<MockDeviceRepo>,
        lorawan: Arc<MockLorawanRepo>,
        uow: Arc<MockUow>,
        reconciler: DeviceReconciler,
    }

    fn harness(registry: MockRegistry) -> Harness {
        let registry = Arc::new(registry);
        let devices = Arc::new(MockDeviceRepo::default());
        let lorawan = Arc::new(MockLorawanRepo::default());
        let uow = Arc::new(MockUow::default());
        let models = Arc::new(MockModelRepo::with(vec![
            DeviceModel { id: "m1".into(), name: "sensor".into(), supports_lorawan: false },
            DeviceModel { id: "m-lora".into(), name: "lora sensor".into(), supports_lorawan: true },
        ]));
        let reconciler = DeviceReconciler::new(
            registry.clone(),
            devices.clone(),
            lorawan.clone(),
            models,
            uow.clone(),
        );
        Harness { registry, devices, lorawan, uow, reconciler }
    }

    fn plain_twin(id: &str, version: i64) -> Twin {
        let mut twin = Twin { device_id: id.into(), version, is_enabled: true, ..Twin::default() };
        twin.tags.insert("modelId".into(), json!("m1"));
        twin.tags.insert("site".into(), json!("hall-a"));
        twin
    }

    fn lora_twin(id: &str, version: i64) -> Twin {
        let mut twin = Twin { device_id: id.into(), version, ..Twin::default() };
        twin.tags.insert("modelId".into(), json!("m-lora"));
        twin
    }

    #[tokio::test]
    async fn unknown_device_is_inserted_unconditionally() {
        let h = harness(MockRegistry::single_page(vec![plain_twin("dev-1", 9)]));

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.created, 1);
        let stored = h.devices.get_by_id("dev-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 9);
        assert_eq!(h.uow.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn equal_version_is_a_no_op() {
        let h = harness(MockRegistry::single_page(vec![plain_twin("dev-1", 7)]));
        h.devices.insert(&device_from_twin(&plain_twin("dev-1", 7), "m1")).await.unwrap();
        let writes_before = h.devices.writes.load(Ordering::SeqCst);

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(h.devices.writes.load(Ordering::SeqCst), writes_before);
    }

    #[tokio::test]
    async fn rerun_against_unchanged_twin_set_writes_nothing() {
        let pages = vec![plain_twin("dev-1", 3), plain_twin("dev-2", 5)];
        let h = harness(MockRegistry::new(vec![
            TwinPage { items: pages.clone(), total_items: 2, next_page: None },
            TwinPage { items: pages, total_items: 2, next_page: None },
        ]));

        h.reconciler.sync_devices().await.unwrap();
        let writes_after_first = h.devices.writes.load(Ordering::SeqCst);

        let second = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(second.unchanged, 2);
        assert_eq!(h.devices.writes.load(Ordering::SeqCst), writes_after_first);
    }

    #[tokio::test]
    async fn newer_twin_replaces_tags_wholesale() {
        let h = harness(MockRegistry::single_page(vec![{
            let mut t = plain_twin("dev-1", 4);
            t.tags.remove("site");
            t.tags.insert("zone".into(), json!("north"));
            t
        }]));
        let mut existing = device_from_twin(&plain_twin("dev-1", 2), "m1");
        existing.tags =
            vec![DeviceTag { name: "site".into(), value: "hall-a".into() }];
        h.devices.insert(&existing).await.unwrap();

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.updated, 1);
        let stored = h.devices.get_by_id("dev-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
        assert_eq!(stored.tags, vec![DeviceTag { name: "zone".into(), value: "north".into() }]);
    }

    #[tokio::test]
    async fn lorawan_merge_preserves_fields_absent_from_twin() {
        let mut updated_twin = lora_twin("lora-1", 6);
        updated_twin.desired.insert("RXDelay".into(), json!(1));

        let h = harness(MockRegistry::single_page(vec![updated_twin]));
        let mut existing = lorawan_from_twin(&lora_twin("lora-1", 2), "m-lora");
        existing.app_key = Some("8AFE71A145B253E49C3031AD068277A1".into());
        h.lorawan.insert(&existing).await.unwrap();

        h.reconciler.sync_devices().await.unwrap();

        let stored = h.lorawan.get_by_id("lora-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 6);
        assert_eq!(stored.rx_delay, Some(1));
        // AppKey key was absent from the twin; the stored value survives
        assert_eq!(stored.app_key.as_deref(), Some("8AFE71A145B253E49C3031AD068277A1"));
    }

    #[tokio::test]
    async fn devices_absent_from_enumeration_are_deleted() {
        let h = harness(MockRegistry::single_page(vec![plain_twin("dev-1", 1)]));
        h.devices.insert(&device_from_twin(&plain_twin("dev-stale", 1), "m1")).await.unwrap();
        h.lorawan.insert(&lorawan_from_twin(&lora_twin("lora-stale", 1), "m-lora")).await.unwrap();

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.deleted, 2);
        assert!(h.devices.get_by_id("dev-stale").await.unwrap().is_none());
        assert!(h.lorawan.get_by_id("lora-stale").await.unwrap().is_none());
        assert!(h.devices.get_by_id("dev-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unclassifiable_twins_are_skipped_not_fatal() {
        let mut no_tag = Twin { device_id: "dev-anon".into(), version: 1, ..Twin::default() };
        no_tag.tags.insert("site".into(), json!("hall-a"));
        let mut orphan = Twin { device_id: "dev-orphan".into(), version: 1, ..Twin::default() };
        orphan.tags.insert("modelId".into(), json!("m-unknown"));

        let h = harness(MockRegistry::single_page(vec![no_tag, orphan, plain_twin("dev-1", 1)]));

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.created, 1);
    }

    #[tokio::test]
    async fn enumeration_follows_continuation_until_total() {
        let h = harness(MockRegistry::new(vec![
            TwinPage {
                items: vec![plain_twin("dev-1", 1)],
                total_items: 2,
                next_page: Some("page-2".into()),
            },
            TwinPage { items: vec![plain_twin("dev-2", 1)], total_items: 2, next_page: None },
        ]));

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(h.registry.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_advancing_continuation_terminates_enumeration() {
        // Registry keeps claiming more items but returns the same token;
        // the loop must stop instead of spinning forever.
        let h = harness(MockRegistry::new(vec![
            TwinPage {
                items: vec![plain_twin("dev-1", 1)],
                total_items: 5,
                next_page: Some("stuck".into()),
            },
            TwinPage {
                items: vec![plain_twin("dev-2", 1)],
                total_items: 5,
                next_page: Some("stuck".into()),
            },
        ]));

        let report = h.reconciler.sync_devices().await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(h.registry.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_before_any_write() {
        let h = harness(MockRegistry::new(vec![TwinPage {
            items: vec![plain_twin("dev-1", 1)],
            total_items: 3,
            next_page: Some("page-2".into()),
        }]));
        h.devices.insert(&device_from_twin(&plain_twin("dev-stale", 1), "m1")).await.unwrap();

        let result = h.reconciler.sync_devices().await;

        assert!(result.is_err());
        // No GC ran: the stale device survives a partial fetch
        assert!(h.devices.get_by_id("dev-stale").await.unwrap().is_some());
        assert_eq!(h.uow.commits.load(Ordering::SeqCst), 0);
    }
}
