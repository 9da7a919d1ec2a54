//! SQLite adapters for the fleet mirror and scheduling data.

pub mod manager;
pub mod planning_source;
pub mod repositories;
pub mod unit_of_work;

pub use manager::DbManager;
pub use planning_source::SqlitePlanningSource;
pub use repositories::{
    SqliteDeviceModelRepository, SqliteDeviceRepository, SqliteEdgeDeviceRepository,
    SqliteLorawanDeviceRepository,
};
pub use unit_of_work::SqliteUnitOfWork;

use chrono::{DateTime, Utc};
use fleetsync_domain::{DeviceTag, Result};
use rusqlite::{params, Connection};

use crate::errors::sql_error;

/// Load the owned tag rows of a device from the given tag table.
pub(crate) fn load_tags(conn: &Connection, table: &str, device_id: &str) -> Result<Vec<DeviceTag>> {
    let mut stmt = conn
        .prepare(&format!("SELECT name, value FROM {table} WHERE device_id = ?1 ORDER BY name"))
        .map_err(sql_error)?;
    let rows = stmt
        .query_map(params![device_id], |row| {
            Ok(DeviceTag { name: row.get(0)?, value: row.get(1)? })
        })
        .map_err(sql_error)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
}

/// Replace the owned tag set of a device: delete all rows, insert the new set.
pub(crate) fn write_tags(
    conn: &Connection,
    table: &str,
    device_id: &str,
    tags: &[DeviceTag],
) -> Result<()> {
    conn.execute(&format!("DELETE FROM {table} WHERE device_id = ?1"), params![device_id])
        .map_err(sql_error)?;
    let mut stmt = conn
        .prepare(&format!("INSERT INTO {table} (id, device_id, name, value) VALUES (?1, ?2, ?3, ?4)"))
        .map_err(sql_error)?;
    for tag in tags {
        stmt.execute(params![uuid::Uuid::now_v7().to_string(), device_id, tag.name, tag.value])
            .map_err(sql_error)?;
    }
    Ok(())
}

/// Read an optional unix-seconds column as a UTC timestamp.
pub(crate) fn timestamp_from_column(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Store an optional UTC timestamp as unix seconds.
pub(crate) fn timestamp_to_column(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|t| t.timestamp())
}
