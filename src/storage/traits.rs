use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::operation::{EntityKey, EntityType, SyncLogEntry};

#[derive(Error, Debug)]
pub enum StorageError {
    /// A concurrent writer claimed one of the versions this batch tried to
    /// append. The whole batch was rolled back; the caller should re-read the
    /// snapshot, re-evaluate, and retry.
    #[error("version collision on {entity_type} {entity_id} at version {version}")]
    VersionCollision {
        entity_type: String,
        entity_id: String,
        version: i64,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Parameters for a pull range scan.
///
/// The scan is always scoped to one user; the user id travels as a separate
/// argument so no query can accidentally span users.
#[derive(Debug, Clone)]
pub struct PullQuery {
    /// Requesting device — its own writes are suppressed from the result.
    pub exclude_device_id: String,
    /// Exclusive lower bound on `applied_at` (the client's cursor).
    ///
    /// The cursor is `applied_at` alone, so two entries from separate
    /// pushes committed in the very same microsecond could straddle a page
    /// boundary and the later one be skipped. Batch appends stagger
    /// `applied_at` per entry, which confines the race to distinct pushes
    /// landing in one microsecond.
    pub since: DateTime<Utc>,
    /// Optional entity-type filter; `None` means all types.
    pub entity_types: Option<Vec<EntityType>>,
    /// Page cap. The caller derives `has_more` from hitting it.
    pub limit: usize,
}

/// The durable, user-partitioned, append-only change log.
///
/// Implementations must guarantee:
/// - entries are immutable once appended — no update or delete path exists;
/// - [`append_batch`](LogStore::append_batch) is atomic: either every entry
///   in the batch is durable or none is;
/// - `(user_id, entity_type, entity_id, version)` is unique, and a violated
///   append fails whole with [`StorageError::VersionCollision`] — this is the
///   serialization point for concurrent pushes to the same entity;
/// - [`scan_since`](LogStore::scan_since) orders ascending by
///   `(applied_at, id)` so pagination has a deterministic tie-break.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Latest entry per requested entity, for one user. Entities with no log
    /// history are simply absent from the result map.
    async fn latest_for_entities(
        &self,
        user_id: &str,
        keys: &[EntityKey],
    ) -> Result<HashMap<EntityKey, SyncLogEntry>, StorageError>;

    /// Append a batch of entries atomically (all-or-nothing).
    async fn append_batch(&self, entries: &[SyncLogEntry]) -> Result<(), StorageError>;

    /// Range scan for pull: entries for `user_id` newer than the cursor,
    /// excluding the requesting device's own writes.
    async fn scan_since(
        &self,
        user_id: &str,
        query: &PullQuery,
    ) -> Result<Vec<SyncLogEntry>, StorageError>;
}
