// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL log store backing the durable change log.
//!
//! Works against SQLite and MySQL through sqlx's `Any` driver. One
//! append-only table:
//!
//! ```sql
//! CREATE TABLE sync_log (
//!   id VARCHAR(36) PRIMARY KEY,
//!   user_id VARCHAR(255) NOT NULL,
//!   device_id VARCHAR(255) NOT NULL,
//!   entity_type VARCHAR(32) NOT NULL,
//!   entity_id VARCHAR(36) NOT NULL,
//!   operation VARCHAR(16) NOT NULL,
//!   payload LONGTEXT,            -- opaque client payload, never interpreted
//!   version BIGINT NOT NULL,
//!   applied_at BIGINT NOT NULL   -- epoch microseconds, the pull cursor
//! )
//! ```
//!
//! The unique index on `(user_id, entity_type, entity_id, version)` is the
//! optimistic-concurrency guard: two devices racing to claim the same next
//! version for an entity cannot both commit, and the loser's whole batch
//! rolls back with [`StorageError::VersionCollision`].
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver reads MySQL TEXT columns back as `Vec<u8>` while SQLite
//! yields `String`, so every text read goes through a helper that tries both.

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{any::AnyPoolOptions, any::AnyRow, AnyPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;

use super::traits::{LogStore, PullQuery, StorageError};
use crate::config::SyncConfig;
use crate::operation::{EntityKey, EntityType, OperationKind, SyncLogEntry};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const ENTRY_COLUMNS: &str =
    "id, user_id, device_id, entity_type, entity_id, operation, payload, version, applied_at";

pub struct SqlLogStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlLogStore {
    /// Connect and initialize the schema, with startup-mode retry (fails
    /// fast if the connection string is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_config(connection_string, &SyncConfig::default()).await
    }

    /// Connect using pool settings from `config`.
    pub async fn with_config(
        connection_string: &str,
        config: &SyncConfig,
    ) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");
        let max_connections = config.sql_max_connections;
        let acquire_timeout = Duration::from_secs(config.sql_acquire_timeout_secs);

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        // WAL mode lets pulls proceed while a push transaction is open.
        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool (health probes, host integration).
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        // applied_at is stored as epoch microseconds so cursor comparisons
        // are plain integer comparisons on both backends.
        let statements: Vec<&str> = if self.is_sqlite {
            vec![
                r#"
                CREATE TABLE IF NOT EXISTS sync_log (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    payload TEXT,
                    version INTEGER NOT NULL,
                    applied_at INTEGER NOT NULL
                )
                "#,
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_log_entity_version
                 ON sync_log (user_id, entity_type, entity_id, version)",
                "CREATE INDEX IF NOT EXISTS idx_sync_log_user_applied
                 ON sync_log (user_id, applied_at)",
            ]
        } else {
            // MySQL - LONGTEXT for payload (sqlx Any driver doesn't support
            // native JSON), indexes declared inline.
            vec![
                r#"
                CREATE TABLE IF NOT EXISTS sync_log (
                    id VARCHAR(36) PRIMARY KEY,
                    user_id VARCHAR(255) NOT NULL,
                    device_id VARCHAR(255) NOT NULL,
                    entity_type VARCHAR(32) NOT NULL,
                    entity_id VARCHAR(36) NOT NULL,
                    operation VARCHAR(16) NOT NULL,
                    payload LONGTEXT,
                    version BIGINT NOT NULL,
                    applied_at BIGINT NOT NULL,
                    UNIQUE KEY idx_sync_log_entity_version (user_id, entity_type, entity_id, version),
                    INDEX idx_sync_log_user_applied (user_id, applied_at)
                )
                "#,
            ]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    /// Read a text column under the Any driver: SQLite yields `String`,
    /// MySQL yields bytes.
    fn text_column(row: &AnyRow, name: &str) -> Option<String> {
        row.try_get::<String, _>(name).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(name)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    fn decode_row(row: &AnyRow) -> Result<SyncLogEntry, StorageError> {
        let id_text = Self::text_column(row, "id")
            .ok_or_else(|| StorageError::Backend("missing id column".to_string()))?;
        let entity_id_text = Self::text_column(row, "entity_id")
            .ok_or_else(|| StorageError::Backend("missing entity_id column".to_string()))?;
        let entity_type_text = Self::text_column(row, "entity_type")
            .ok_or_else(|| StorageError::Backend("missing entity_type column".to_string()))?;
        let operation_text = Self::text_column(row, "operation")
            .ok_or_else(|| StorageError::Backend("missing operation column".to_string()))?;

        let id = Uuid::parse_str(&id_text)
            .map_err(|e| StorageError::Backend(format!("bad entry id '{id_text}': {e}")))?;
        let entity_id = Uuid::parse_str(&entity_id_text)
            .map_err(|e| StorageError::Backend(format!("bad entity id '{entity_id_text}': {e}")))?;
        let entity_type = EntityType::from_str(&entity_type_text).map_err(StorageError::Backend)?;
        let operation = OperationKind::from_str(&operation_text).map_err(StorageError::Backend)?;

        let version: i64 = row
            .try_get("version")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let applied_at_micros: i64 = row
            .try_get("applied_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let applied_at = DateTime::from_timestamp_micros(applied_at_micros).ok_or_else(|| {
            StorageError::Backend(format!("applied_at out of range: {applied_at_micros}"))
        })?;

        Ok(SyncLogEntry {
            id,
            user_id: Self::text_column(row, "user_id")
                .ok_or_else(|| StorageError::Backend("missing user_id column".to_string()))?,
            device_id: Self::text_column(row, "device_id")
                .ok_or_else(|| StorageError::Backend("missing device_id column".to_string()))?,
            entity_type,
            entity_id,
            operation,
            payload: Self::text_column(row, "payload"),
            version,
            applied_at,
        })
    }

    /// Map an insert failure to `VersionCollision` when the per-entity
    /// uniqueness guard fired. Error text matching is the only option under
    /// the Any driver; SQLite reports "UNIQUE constraint failed", MySQL
    /// "Duplicate entry".
    fn map_insert_error(err: sqlx::Error, entry: &SyncLogEntry) -> StorageError {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") || message.contains("Duplicate entry") {
            StorageError::VersionCollision {
                entity_type: entry.entity_type.to_string(),
                entity_id: entry.entity_id.to_string(),
                version: entry.version,
            }
        } else {
            StorageError::Backend(message)
        }
    }
}

#[async_trait]
impl LogStore for SqlLogStore {
    async fn latest_for_entities(
        &self,
        user_id: &str,
        keys: &[EntityKey],
    ) -> Result<HashMap<EntityKey, SyncLogEntry>, StorageError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM sync_log
             WHERE user_id = ? AND entity_type = ? AND entity_id = ?
             ORDER BY version DESC LIMIT 1"
        );

        let mut latest = HashMap::with_capacity(keys.len());
        for key in keys {
            let entity_id = key.entity_id.to_string();
            let row = retry("sql_latest_entry", &RetryConfig::query(), || async {
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(key.entity_type.as_str())
                    .bind(&entity_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;

            if let Some(row) = row {
                latest.insert(*key, Self::decode_row(&row)?);
            }
        }
        Ok(latest)
    }

    async fn append_batch(&self, entries: &[SyncLogEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }

        // Single transaction: the whole batch commits or none of it does.
        // No retry wrapper — a collision must propagate so the engine can
        // re-snapshot, and a cancelled caller drops the transaction, which
        // rolls back cleanly.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        for entry in entries {
            let result = sqlx::query(
                "INSERT INTO sync_log
                 (id, user_id, device_id, entity_type, entity_id, operation, payload, version, applied_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id.to_string())
            .bind(&entry.user_id)
            .bind(&entry.device_id)
            .bind(entry.entity_type.as_str())
            .bind(entry.entity_id.to_string())
            .bind(entry.operation.as_str())
            .bind(&entry.payload)
            .bind(entry.version)
            .bind(entry.applied_at.timestamp_micros())
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                tx.rollback()
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                return Err(Self::map_insert_error(err, entry));
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn scan_since(
        &self,
        user_id: &str,
        query: &PullQuery,
    ) -> Result<Vec<SyncLogEntry>, StorageError> {
        let type_filter: Option<Vec<&'static str>> = query
            .entity_types
            .as_ref()
            .map(|types| types.iter().map(EntityType::as_str).collect());

        // An explicitly empty filter matches nothing.
        if type_filter.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM sync_log
             WHERE user_id = ? AND device_id <> ? AND applied_at > ?"
        );
        if let Some(ref types) = type_filter {
            let placeholders = vec!["?"; types.len()].join(", ");
            sql.push_str(&format!(" AND entity_type IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY applied_at ASC, id ASC LIMIT ?");

        let since_micros = query.since.timestamp_micros();
        let rows = retry("sql_scan_since", &RetryConfig::query(), || async {
            let mut q = sqlx::query(&sql)
                .bind(user_id)
                .bind(&query.exclude_device_id)
                .bind(since_micros);
            if let Some(ref types) = type_filter {
                for t in types {
                    q = q.bind(*t);
                }
            }
            q.bind(query.limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        rows.iter().map(Self::decode_row).collect()
    }
}
