//! SQLite adapter for scheduling reference data.
//!
//! Layers, plannings and schedules are operator-managed tables the portal
//! writes; the dispatch engine only ever reads them, freshly on each run.
//! The source gets its own connection ([`DbManager::reopen`]) so its roster
//! reads are WAL snapshots and never observe another job's open
//! transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use fleetsync_core::PlanningSource;
use fleetsync_domain::{DayOffMask, Device, Layer, Planning, Result, Schedule};
use rusqlite::{params, Row};

use super::{timestamp_from_column, DbManager};
use crate::errors::sql_error;

#[derive(Clone)]
pub struct SqlitePlanningSource {
    db: DbManager,
}

impl SqlitePlanningSource {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

fn date_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|err: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

#[async_trait]
impl PlanningSource for SqlitePlanningSource {
    /// Full device roster across both device mirrors. Tag children are not
    /// loaded; resolution only needs ids and layer assignments.
    async fn get_devices(&self) -> Result<Vec<Device>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, name, model_id, version, is_connected, is_enabled,
                         status_updated_at, layer_id FROM devices
                         UNION ALL
                         SELECT id, name, model_id, version, is_connected, is_enabled,
                         status_updated_at, layer_id FROM lorawan_devices",
                    )
                    .map_err(sql_error)?;
                let rows = stmt
                    .query_map(params![], |row| {
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
                    })
                    .map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_layers(&self) -> Result<Vec<Layer>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id, name, planning_id FROM layers")
                    .map_err(sql_error)?;
                let rows = stmt
                    .query_map(params![], |row| {
                        Ok(Layer { id: row.get(0)?, name: row.get(1)?, planning_id: row.get(2)? })
                    })
                    .map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_plannings(&self) -> Result<Vec<Planning>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, name, start_day, end_day, day_off, command_id FROM plannings",
                    )
                    .map_err(sql_error)?;
                let rows = stmt
                    .query_map(params![], |row| {
                        Ok(Planning {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            start_day: date_from_column(row, 2)?,
                            end_day: date_from_column(row, 3)?,
                            day_off: DayOffMask::from_bits(row.get::<_, u8>(4)?),
                            command_id: row.get(5)?,
                        })
                    })
                    .map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }

    async fn get_schedules(&self) -> Result<Vec<Schedule>> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, planning_id, start_time, end_time, command_id FROM schedules",
                    )
                    .map_err(sql_error)?;
                let rows = stmt
                    .query_map(params![], |row| {
                        Ok(Schedule {
                            id: row.get(0)?,
                            planning_id: row.get(1)?,
                            start: row.get(2)?,
                            end: row.get(3)?,
                            command_id: row.get(4)?,
                        })
                    })
                    .map_err(sql_error)?;
                rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sql_error)
            })
            .await
    }
}
