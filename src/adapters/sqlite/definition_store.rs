//! SQLite implementation of the DefinitionStore.
//!
//! The engine calls the store from plain OS threads, so the store owns a
//! small tokio runtime and drives sqlx through `block_on`. It must not be
//! called from inside another tokio runtime.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::adapters::sqlite::{create_memory_pool, create_pool, verify_connection, DatabaseError, Migrator};
use crate::adapters::sqlite::migrations::all_embedded_migrations;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{path, DatabaseConfig, EventKind, StoredDefinition};
use crate::domain::ports::DefinitionStore;

pub struct SqliteDefinitionStore {
    pool: SqlitePool,
    runtime: Runtime,
}

#[derive(Debug, sqlx::FromRow)]
struct DefinitionRow {
    path: String,
    kind: String,
    serial: i64,
    body: String,
    last_modified: String,
}

fn row_to_definition(row: DefinitionRow) -> DomainResult<StoredDefinition> {
    let kind: EventKind = row.kind.parse().map_err(DomainError::Storage)?;
    let serial = u64::try_from(row.serial)
        .map_err(|_| DomainError::Storage(format!("negative serial {} at {}", row.serial, row.path)))?;
    let last_modified = DateTime::parse_from_rfc3339(&row.last_modified)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Storage(e.to_string()))?;
    Ok(StoredDefinition {
        path: row.path,
        kind,
        serial,
        last_modified,
        body: row.body,
    })
}

impl SqliteDefinitionStore {
    /// Open (creating if needed) the database file and apply migrations.
    pub fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let runtime = store_runtime()?;
        let pool = runtime.block_on(async {
            let pool = create_pool(config).await?;
            verify_connection(&pool).await?;
            Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
            Ok::<_, DatabaseError>(pool)
        })?;
        tracing::debug!(path = %config.path, "definition store opened");
        Ok(Self { pool, runtime })
    }

    /// Private in-memory database, discarded on drop.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let runtime = store_runtime()?;
        let pool = runtime.block_on(async {
            let pool = create_memory_pool().await?;
            Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
            Ok::<_, DatabaseError>(pool)
        })?;
        Ok(Self { pool, runtime })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Highest serial handed out so far.
    pub fn current_serial(&self) -> DomainResult<u64> {
        self.block_on(async {
            let (value,): (i64,) = sqlx::query_as("SELECT value FROM store_serial WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, DomainError>(u64::try_from(value).unwrap_or(0))
        })
    }
}

fn store_runtime() -> Result<Runtime, DatabaseError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("definition-store")
        .enable_all()
        .build()
        .map_err(DatabaseError::Runtime)
}

impl DefinitionStore for SqliteDefinitionStore {
    fn read(&self, event_path: &str) -> DomainResult<StoredDefinition> {
        let row: Option<DefinitionRow> = self.block_on(
            sqlx::query_as(
                "SELECT path, kind, serial, body, last_modified FROM event_definitions WHERE path = ?",
            )
            .bind(event_path)
            .fetch_optional(&self.pool),
        )?;
        match row {
            Some(row) => row_to_definition(row),
            None => Err(DomainError::DefinitionNotFound(event_path.to_string())),
        }
    }

    fn write(&self, event_path: &str, kind: EventKind, body: &str) -> DomainResult<u64> {
        self.block_on(async {
            let mut tx = self.pool.begin().await?;
            let (serial,): (i64,) =
                sqlx::query_as("UPDATE store_serial SET value = value + 1 WHERE id = 1 RETURNING value")
                    .fetch_one(&mut *tx)
                    .await?;
            sqlx::query(
                "INSERT INTO event_definitions (path, kind, serial, body, last_modified)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(path) DO UPDATE SET
                    kind = excluded.kind,
                    serial = excluded.serial,
                    body = excluded.body,
                    last_modified = excluded.last_modified",
            )
            .bind(event_path)
            .bind(kind.as_str())
            .bind(serial)
            .bind(body)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            u64::try_from(serial).map_err(|_| DomainError::Storage(format!("negative serial {serial}")))
        })
    }

    fn delete(&self, event_path: &str) -> DomainResult<()> {
        self.block_on(
            sqlx::query("DELETE FROM event_definitions WHERE path = ?")
                .bind(event_path)
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn list_paths(&self, scope: &str, kind: EventKind) -> DomainResult<Vec<String>> {
        let scope = path::normalize(scope)?;
        let rows: Vec<(String,)> = self.block_on(
            sqlx::query_as("SELECT path FROM event_definitions WHERE kind = ? ORDER BY path")
                .bind(kind.as_str())
                .fetch_all(&self.pool),
        )?;
        Ok(rows
            .into_iter()
            .map(|(p,)| p)
            .filter(|p| path::is_within(p, &scope))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_and_serials() {
        let store = SqliteDefinitionStore::open_in_memory().unwrap();
        let first = store.write("/User/A", EventKind::Triggered, "{}").unwrap();
        let second = store.write("/User/A", EventKind::Triggered, "{\"x\":1}").unwrap();
        assert!(second > first);
        assert_eq!(store.current_serial().unwrap(), second);

        let stored = store.read("/User/A").unwrap();
        assert_eq!(stored.serial, second);
        assert_eq!(stored.body, "{\"x\":1}");
        assert_eq!(stored.kind, EventKind::Triggered);
    }

    #[test]
    fn test_missing_read_and_delete() {
        let store = SqliteDefinitionStore::open_in_memory().unwrap();
        assert!(store.read("/nope").unwrap_err().is_not_found());
        store.delete("/nope").unwrap();
    }

    #[test]
    fn test_list_paths_by_scope_and_kind() {
        let store = SqliteDefinitionStore::open_in_memory().unwrap();
        store.write("/User/Lights/On", EventKind::Scheduled, "{}").unwrap();
        store.write("/User/Lights/Off", EventKind::Scheduled, "{}").unwrap();
        store.write("/User/LightsExtra", EventKind::Scheduled, "{}").unwrap();
        store.write("/User/Lights/Motion", EventKind::Triggered, "{}").unwrap();

        assert_eq!(
            store.list_paths("/User/Lights", EventKind::Scheduled).unwrap(),
            vec!["/User/Lights/Off".to_string(), "/User/Lights/On".to_string()]
        );
        assert_eq!(store.list_paths("/", EventKind::Scheduled).unwrap().len(), 3);
        assert_eq!(store.list_paths("/", EventKind::Monitor).unwrap().len(), 0);
    }
}
