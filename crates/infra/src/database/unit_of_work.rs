//! Transaction boundary over the shared connection.

use async_trait::async_trait;
use fleetsync_core::FleetUnitOfWork;
use fleetsync_domain::{FleetError, Result};
use tracing::warn;

use super::DbManager;
use crate::errors::sql_error;

/// Unit of work bracketing a reconciliation run in one SQLite transaction.
///
/// The run's repositories are built from clones of the same manager, so
/// statements issued between `begin` and `commit` land inside the same
/// transaction. Concurrent jobs use separate connections
/// ([`DbManager::reopen`]); a second writer's `begin` then waits on the
/// busy handler for the first commit instead of colliding.
#[derive(Clone)]
pub struct SqliteUnitOfWork {
    db: DbManager,
}

impl SqliteUnitOfWork {
    pub fn new(db: DbManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FleetUnitOfWork for SqliteUnitOfWork {
    async fn begin(&self) -> Result<()> {
        self.db
            .with_conn(|conn| {
                if !conn.is_autocommit() {
                    return Err(FleetError::Database("transaction already open".into()));
                }
                conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_error)
            })
            .await
    }

    async fn commit(&self) -> Result<()> {
        self.db
            .with_conn(|conn| {
                if conn.is_autocommit() {
                    return Err(FleetError::Database("commit without open transaction".into()));
                }
                conn.execute_batch("COMMIT").map_err(sql_error)
            })
            .await
    }

    async fn rollback(&self) -> Result<()> {
        self.db
            .with_conn(|conn| {
                // A failed statement may already have rolled the transaction
                // back; rolling back twice must stay harmless.
                if conn.is_autocommit() {
                    warn!("rollback requested with no open transaction");
                    return Ok(());
                }
                conn.execute_batch("ROLLBACK").map_err(sql_error)
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn manager() -> (TempDir, DbManager) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db = DbManager::new(temp_dir.path().join("uow.db")).expect("manager created");
        db.run_migrations().await.expect("migrations run");
        (temp_dir, db)
    }

    #[tokio::test]
    async fn begin_commit_cycle() {
        let (_guard, db) = manager().await;
        let uow = SqliteUnitOfWork::new(db);

        uow.begin().await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn double_begin_is_rejected() {
        let (_guard, db) = manager().await;
        let uow = SqliteUnitOfWork::new(db);

        uow.begin().await.unwrap();
        assert!(uow.begin().await.is_err());
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn commit_without_begin_is_rejected() {
        let (_guard, db) = manager().await;
        let uow = SqliteUnitOfWork::new(db);

        assert!(uow.commit().await.is_err());
    }

    #[tokio::test]
    async fn rollback_without_begin_is_harmless() {
        let (_guard, db) = manager().await;
        let uow = SqliteUnitOfWork::new(db);

        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn separate_connections_wait_instead_of_colliding() {
        let (_guard, db) = manager().await;
        let first = SqliteUnitOfWork::new(db.clone());
        let second = SqliteUnitOfWork::new(db.reopen().expect("second connection"));

        first.begin().await.unwrap();
        let commit = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            first.commit().await
        });

        // Blocks on the busy handler until the first run commits, then
        // proceeds; it must not fail with "transaction already open".
        second.begin().await.unwrap();
        second.rollback().await.unwrap();
        commit.await.unwrap().unwrap();
    }
}
