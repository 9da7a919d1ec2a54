//! Database connection manager, one SQLite connection per manager.
//!
//! Reconciliation brackets its writes in one transaction spanning several
//! repository calls, which rules out a connection pool: every statement of a
//! run must land on the same connection. Clones of a manager share that
//! connection, so the repositories and unit of work of one job are built
//! from clones of the same manager. Jobs must NOT share transaction state
//! with each other: each concurrent job gets its own connection via
//! [`DbManager::reopen`], WAL gives it snapshot reads while another job
//! writes, and the busy timeout makes a second writer wait for the first
//! commit instead of failing. All rusqlite work is pushed onto the blocking
//! thread pool via [`DbManager::with_conn`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleetsync_domain::{FleetError, Result};
use rusqlite::{params, Connection};
use tracing::info;

use crate::errors::sql_error;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database manager owning one connection. Clones share it.
#[derive(Clone)]
pub struct DbManager {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl DbManager {
    /// Open (or create) the database at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        let conn = Connection::open(&path).map_err(sql_error)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(sql_error)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(sql_error)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(sql_error)?;

        info!(db_path = %path.display(), "sqlite connection opened");

        Ok(Self { conn: Arc::new(Mutex::new(conn)), path })
    }

    /// Open an additional, independent connection to the same database.
    ///
    /// Each concurrent job runs its repositories and unit of work on its own
    /// connection so another job's open transaction is neither visible to it
    /// nor able to fail its `begin`.
    pub fn reopen(&self) -> Result<Self> {
        Self::new(&self.path)
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| FleetError::Database("connection mutex poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|err| FleetError::Internal(format!("blocking task join failed: {err}")))?
    }

    /// Ensure the full schema exists on the current database.
    pub async fn run_migrations(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA_SQL).map_err(sql_error)?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
                params![SCHEMA_VERSION],
            )
            .map_err(sql_error)?;
            Ok(())
        })
        .await
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Perform a health check to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(sql_error)?;
            Ok(())
        })
        .await
    }
}
