//! SQLite repositories for the mirrored fleet entities.
//!
//! Scalar columns are written by `insert`/`update`; tag children live in
//! separate owned tables and are replaced wholesale through `replace_tags`.
//! Every method runs on the blocking pool via [`DbManager::with_conn`].

use async_trait::async_trait;
use fleetsync_core::{
    DeviceModelRepository, DeviceRepository, EdgeDeviceRepository, LorawanDeviceRepository,
};
use fleetsync_domain::{
    Device, DeviceModel, DeviceTag, EdgeDevice, EdgeModule, FleetError, LorawanDevice, Result,
};
use rusqlite::{params, OptionalExtension, Row};

use super::{load_tags, timestamp_from_column, timestamp_to_column, write_tags, DbManager};
use crate::errors::sql_error;

/* -------------------------------------------------------------------------- */
/* Plain devices */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct SqliteDeviceRepository {
    db: DbManager,
}

impl SqliteDeviceRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        model_id: row.get(2)?,
        version: row.get(3)?,
        is_connected: row.get(4)?,
        is_enabled: row.get(5)?,
        status_updated_at: timestamp_from_column(row.get(6)?),
        layer_id: row.get(7)?,
        tags: Vec::new(),
    })
}

const DEVICE_COLUMNS: &str =
    "id, name, model_id, version, is_connected, is_enabled, status_updated_at, layer_id";

#[async_trait]
impl DeviceRepository for SqliteDeviceRepository {
    async fn get_all(&self) -> Result<Vec<Device>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices"))
                    .map_err(sql_error)?;
                let rows = stmt.query_map(params![], device_from_row).map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Device>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let device = conn
                    .query_row(
                        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                        params![id],
                        device_from_row,
                    )
                    .optional()
                    .map_err(sql_error)?;
                match device {
                    Some(mut device) => {
                        device.tags = load_tags(conn, "device_tags", &device.id)?;
                        Ok(Some(device))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    async fn insert(&self, device: &Device) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO devices (id, name, model_id, version, is_connected, is_enabled, status_updated_at, layer_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        device.id,
                        device.name,
                        device.model_id,
                        device.version,
                        device.is_connected,
                        device.is_enabled,
                        timestamp_to_column(device.status_updated_at),
                        device.layer_id,
                    ],
                )
                .map_err(sql_error)?;
                write_tags(conn, "device_tags", &device.id, &device.tags)
            })
            .await
    }

    async fn update(&self, device: &Device) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE devices SET name = ?2, model_id = ?3, version = ?4, is_connected = ?5,
                         is_enabled = ?6, status_updated_at = ?7, layer_id = ?8 WHERE id = ?1",
                        params![
                            device.id,
                            device.name,
                            device.model_id,
                            device.version,
                            device.is_connected,
                            device.is_enabled,
                            timestamp_to_column(device.status_updated_at),
                            device.layer_id,
                        ],
                    )
                    .map_err(sql_error)?;
                if changed == 0 {
                    return Err(FleetError::NotFound(format!("device {}", device.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM devices WHERE id = ?1", params![id]).map_err(sql_error)?;
                Ok(())
            })
            .await
    }

    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()> {
        let device_id = device_id.to_string();
        let tags = tags.to_vec();
        self.db
            .with_conn(move |conn| write_tags(conn, "device_tags", &device_id, &tags))
            .await
    }
}

/* -------------------------------------------------------------------------- */
/* LoRaWAN devices */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct SqliteLorawanDeviceRepository {
    db: DbManager,
}

impl SqliteLorawanDeviceRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

const LORAWAN_COLUMNS: &str = "id, name, model_id, version, is_connected, is_enabled, \
     status_updated_at, layer_id, app_key, app_eui, app_s_key, nwk_s_key, dev_addr, gateway_id, \
     class_type, preferred_window, downlink_enabled, rx1_dr_offset, rx2_data_rate, rx_delay, \
     keep_alive_timeout, sensor_decoder";

fn lorawan_from_row(row: &Row<'_>) -> rusqlite::Result<LorawanDevice> {
    Ok(LorawanDevice {
        id: row.get(0)?,
        name: row.get(1)?,
        model_id: row.get(2)?,
        version: row.get(3)?,
        is_connected: row.get(4)?,
        is_enabled: row.get(5)?,
        status_updated_at: timestamp_from_column(row.get(6)?),
        layer_id: row.get(7)?,
        tags: Vec::new(),
        app_key: row.get(8)?,
        app_eui: row.get(9)?,
        app_s_key: row.get(10)?,
        nwk_s_key: row.get(11)?,
        dev_addr: row.get(12)?,
        gateway_id: row.get(13)?,
        class_type: row.get(14)?,
        preferred_window: row.get(15)?,
        downlink_enabled: row.get(16)?,
        rx1_dr_offset: row.get(17)?,
        rx2_data_rate: row.get(18)?,
        rx_delay: row.get(19)?,
        keep_alive_timeout: row.get(20)?,
        sensor_decoder: row.get(21)?,
    })
}

#[async_trait]
impl LorawanDeviceRepository for SqliteLorawanDeviceRepository {
    async fn get_all(&self) -> Result<Vec<LorawanDevice>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {LORAWAN_COLUMNS} FROM lorawan_devices"))
                    .map_err(sql_error)?;
                let rows = stmt.query_map(params![], lorawan_from_row).map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<LorawanDevice>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let device = conn
                    .query_row(
                        &format!("SELECT {LORAWAN_COLUMNS} FROM lorawan_devices WHERE id = ?1"),
                        params![id],
                        lorawan_from_row,
                    )
                    .optional()
                    .map_err(sql_error)?;
                match device {
                    Some(mut device) => {
                        device.tags = load_tags(conn, "lorawan_device_tags", &device.id)?;
                        Ok(Some(device))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    async fn insert(&self, device: &LorawanDevice) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO lorawan_devices (id, name, model_id, version, is_connected, is_enabled,
                     status_updated_at, layer_id, app_key, app_eui, app_s_key, nwk_s_key, dev_addr,
                     gateway_id, class_type, preferred_window, downlink_enabled, rx1_dr_offset,
                     rx2_data_rate, rx_delay, keep_alive_timeout, sensor_decoder)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22)",
                    params![
                        device.id,
                        device.name,
                        device.model_id,
                        device.version,
                        device.is_connected,
                        device.is_enabled,
                        timestamp_to_column(device.status_updated_at),
                        device.layer_id,
                        device.app_key,
                        device.app_eui,
                        device.app_s_key,
                        device.nwk_s_key,
                        device.dev_addr,
                        device.gateway_id,
                        device.class_type,
                        device.preferred_window,
                        device.downlink_enabled,
                        device.rx1_dr_offset,
                        device.rx2_data_rate,
                        device.rx_delay,
                        device.keep_alive_timeout,
                        device.sensor_decoder,
                    ],
                )
                .map_err(sql_error)?;
                write_tags(conn, "lorawan_device_tags", &device.id, &device.tags)
            })
            .await
    }

    async fn update(&self, device: &LorawanDevice) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE lorawan_devices SET name = ?2, model_id = ?3, version = ?4,
                         is_connected = ?5, is_enabled = ?6, status_updated_at = ?7, layer_id = ?8,
                         app_key = ?9, app_eui = ?10, app_s_key = ?11, nwk_s_key = ?12,
                         dev_addr = ?13, gateway_id = ?14, class_type = ?15, preferred_window = ?16,
                         downlink_enabled = ?17, rx1_dr_offset = ?18, rx2_data_rate = ?19,
                         rx_delay = ?20, keep_alive_timeout = ?21, sensor_decoder = ?22
                         WHERE id = ?1",
                        params![
                            device.id,
                            device.name,
                            device.model_id,
                            device.version,
                            device.is_connected,
                            device.is_enabled,
                            timestamp_to_column(device.status_updated_at),
                            device.layer_id,
                            device.app_key,
                            device.app_eui,
                            device.app_s_key,
                            device.nwk_s_key,
                            device.dev_addr,
                            device.gateway_id,
                            device.class_type,
                            device.preferred_window,
                            device.downlink_enabled,
                            device.rx1_dr_offset,
                            device.rx2_data_rate,
                            device.rx_delay,
                            device.keep_alive_timeout,
                            device.sensor_decoder,
                        ],
                    )
                    .map_err(sql_error)?;
                if changed == 0 {
                    return Err(FleetError::NotFound(format!("lorawan device {}", device.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM lorawan_devices WHERE id = ?1", params![id])
                    .map_err(sql_error)?;
                Ok(())
            })
            .await
    }

    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()> {
        let device_id = device_id.to_string();
        let tags = tags.to_vec();
        self.db
            .with_conn(move |conn| write_tags(conn, "lorawan_device_tags", &device_id, &tags))
            .await
    }
}

/* -------------------------------------------------------------------------- */
/* Edge devices */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct SqliteEdgeDeviceRepository {
    db: DbManager,
}

impl SqliteEdgeDeviceRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

const EDGE_COLUMNS: &str = "id, name, model_id, version, is_connected, is_enabled, \
     status_updated_at, layer_id, modules, connected_clients, runtime_status";

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<EdgeDevice> {
    let modules_json: String = row.get(8)?;
    let modules: Vec<EdgeModule> = serde_json::from_str(&modules_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(EdgeDevice {
        id: row.get(0)?,
        name: row.get(1)?,
        model_id: row.get(2)?,
        version: row.get(3)?,
        is_connected: row.get(4)?,
        is_enabled: row.get(5)?,
        status_updated_at: timestamp_from_column(row.get(6)?),
        layer_id: row.get(7)?,
        tags: Vec::new(),
        modules,
        connected_clients: row.get(9)?,
        runtime_status: row.get(10)?,
    })
}

fn modules_to_json(modules: &[EdgeModule]) -> Result<String> {
    serde_json::to_string(modules)
        .map_err(|err| FleetError::Internal(format!("failed to serialize edge modules: {err}")))
}

#[async_trait]
impl EdgeDeviceRepository for SqliteEdgeDeviceRepository {
    async fn get_all(&self) -> Result<Vec<EdgeDevice>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {EDGE_COLUMNS} FROM edge_devices"))
                    .map_err(sql_error)?;
                let rows = stmt.query_map(params![], edge_from_row).map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<EdgeDevice>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let device = conn
                    .query_row(
                        &format!("SELECT {EDGE_COLUMNS} FROM edge_devices WHERE id = ?1"),
                        params![id],
                        edge_from_row,
                    )
                    .optional()
                    .map_err(sql_error)?;
                match device {
                    Some(mut device) => {
                        device.tags = load_tags(conn, "edge_device_tags", &device.id)?;
                        Ok(Some(device))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    async fn insert(&self, device: &EdgeDevice) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                let modules = modules_to_json(&device.modules)?;
                conn.execute(
                    "INSERT INTO edge_devices (id, name, model_id, version, is_connected, is_enabled,
                     status_updated_at, layer_id, modules, connected_clients, runtime_status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        device.id,
                        device.name,
                        device.model_id,
                        device.version,
                        device.is_connected,
                        device.is_enabled,
                        timestamp_to_column(device.status_updated_at),
                        device.layer_id,
                        modules,
                        device.connected_clients,
                        device.runtime_status,
                    ],
                )
                .map_err(sql_error)?;
                write_tags(conn, "edge_device_tags", &device.id, &device.tags)
            })
            .await
    }

    async fn update(&self, device: &EdgeDevice) -> Result<()> {
        let device = device.clone();
        self.db
            .with_conn(move |conn| {
                let modules = modules_to_json(&device.modules)?;
                let changed = conn
                    .execute(
                        "UPDATE edge_devices SET name = ?2, model_id = ?3, version = ?4,
                         is_connected = ?5, is_enabled = ?6, status_updated_at = ?7, layer_id = ?8,
                         modules = ?9, connected_clients = ?10, runtime_status = ?11 WHERE id = ?1",
                        params![
                            device.id,
                            device.name,
                            device.model_id,
                            device.version,
                            device.is_connected,
                            device.is_enabled,
                            timestamp_to_column(device.status_updated_at),
                            device.layer_id,
                            modules,
                            device.connected_clients,
                            device.runtime_status,
                        ],
                    )
                    .map_err(sql_error)?;
                if changed == 0 {
                    return Err(FleetError::NotFound(format!("edge device {}", device.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM edge_devices WHERE id = ?1", params![id])
                    .map_err(sql_error)?;
                Ok(())
            })
            .await
    }

    async fn replace_tags(&self, device_id: &str, tags: &[DeviceTag]) -> Result<()> {
        let device_id = device_id.to_string();
        let tags = tags.to_vec();
        self.db
            .with_conn(move |conn| write_tags(conn, "edge_device_tags", &device_id, &tags))
            .await
    }
}

/* -------------------------------------------------------------------------- */
/* Device models */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct SqliteDeviceModelRepository {
    db: DbManager,
}

impl SqliteDeviceModelRepository {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }

    /// Seed or refresh a model row. Models are reference data loaded outside
    /// the reconciliation transaction.
    pub async fn upsert(&self, model: &DeviceModel) -> Result<()> {
        let model = model.clone();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO device_models (id, name, supports_lorawan) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = ?2, supports_lorawan = ?3",
                    params![model.id, model.name, model.supports_lorawan],
                )
                .map_err(sql_error)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl DeviceModelRepository for SqliteDeviceModelRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<DeviceModel>> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, name, supports_lorawan FROM device_models WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(DeviceModel {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            supports_lorawan: row.get(2)?,
                        })
                    },
                )
                .optional()
                .map_err(sql_error)
            })
            .await
    }
}
