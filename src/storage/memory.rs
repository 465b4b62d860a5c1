//! In-memory log store.
//!
//! Backs unit tests and embedded use. One ordered list of entries per user
//! behind a single lock: appends are trivially atomic and the same
//! `(entity_type, entity_id, version)` uniqueness rule as the SQL schema is
//! enforced by hand, so engine behavior matches across backends.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::traits::{LogStore, PullQuery, StorageError};
use crate::operation::{EntityKey, SyncLogEntry};

#[derive(Default)]
pub struct InMemoryLogStore {
    entries: RwLock<HashMap<String, Vec<SyncLogEntry>>>,
}

impl InMemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entry count across all users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry count for one user.
    #[must_use]
    pub fn len_for_user(&self, user_id: &str) -> usize {
        self.entries.read().get(user_id).map_or(0, Vec::len)
    }

    /// Drop everything (tests only need this between cases).
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn latest_for_entities(
        &self,
        user_id: &str,
        keys: &[EntityKey],
    ) -> Result<HashMap<EntityKey, SyncLogEntry>, StorageError> {
        let entries = self.entries.read();
        let Some(log) = entries.get(user_id) else {
            return Ok(HashMap::new());
        };

        let mut latest: HashMap<EntityKey, SyncLogEntry> = HashMap::new();
        for entry in log {
            let key = entry.entity_key();
            if !keys.contains(&key) {
                continue;
            }
            match latest.get(&key) {
                Some(current) if current.version >= entry.version => {}
                _ => {
                    latest.insert(key, entry.clone());
                }
            }
        }
        Ok(latest)
    }

    async fn append_batch(&self, entries: &[SyncLogEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut map = self.entries.write();

        // Validate the whole batch before touching anything, so a collision
        // leaves the store exactly as it was (all-or-nothing).
        for (idx, entry) in entries.iter().enumerate() {
            let taken = map
                .get(&entry.user_id)
                .is_some_and(|log| {
                    log.iter().any(|e| {
                        e.entity_key() == entry.entity_key() && e.version == entry.version
                    })
                })
                || entries[..idx].iter().any(|e| {
                    e.user_id == entry.user_id
                        && e.entity_key() == entry.entity_key()
                        && e.version == entry.version
                });

            if taken {
                return Err(StorageError::VersionCollision {
                    entity_type: entry.entity_type.to_string(),
                    entity_id: entry.entity_id.to_string(),
                    version: entry.version,
                });
            }
        }

        for entry in entries {
            map.entry(entry.user_id.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(())
    }

    async fn scan_since(
        &self,
        user_id: &str,
        query: &PullQuery,
    ) -> Result<Vec<SyncLogEntry>, StorageError> {
        let entries = self.entries.read();
        let Some(log) = entries.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut page: Vec<SyncLogEntry> = log
            .iter()
            .filter(|e| e.device_id != query.exclude_device_id)
            .filter(|e| e.applied_at > query.since)
            .filter(|e| {
                query
                    .entity_types
                    .as_ref()
                    .is_none_or(|types| types.contains(&e.entity_type))
            })
            .cloned()
            .collect();

        // (applied_at, id) ascending — the deterministic pagination order.
        page.sort_by(|a, b| {
            a.applied_at
                .cmp(&b.applied_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        page.truncate(query.limit);
        Ok(page)
    }
}
