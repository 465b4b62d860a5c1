// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine orchestration.
//!
//! The [`SyncEngine`] ties the pieces together: it ingests a device's batch
//! of pending operations (push), decides each one through the
//! [`ConflictDetector`], appends the accepted ones to the injected
//! [`LogStore`] in a single atomic batch, and serves other devices the
//! changes they have missed (pull).
//!
//! ```text
//! device ──push(batch)──▶ SyncEngine ──evaluate──▶ ConflictDetector
//!                             │                         (per op)
//!                             └──append accepted──▶ LogStore
//!
//! device ──pull(cursor)─▶ SyncEngine ──range scan──▶ LogStore
//! ```
//!
//! Requests for different users are fully independent. Concurrent pushes
//! from different devices to the same entity serialize on the store's
//! per-entity version uniqueness guard: the losing push re-reads its
//! snapshot and re-evaluates, so version assignment has no gaps or
//! duplicates.

mod types;

pub use types::{ChangeRecord, PullRequest, PullResponse, PushRequest, PushResponse};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::conflict::ConflictDetector;
use crate::operation::{EntityKey, SyncLogEntry, SyncOperation};
use crate::storage::traits::{LogStore, PullQuery, StorageError};

#[derive(Error, Debug)]
pub enum SyncError {
    /// The batch exceeded the configured maximum and was rejected whole; no
    /// operation in it was processed.
    #[error("batch of {submitted} operations exceeds the maximum of {max}")]
    BatchTooLarge { submitted: usize, max: usize },

    /// A request or operation is missing a required identifier. Rejected
    /// before any log mutation.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// The store failed to commit. The batch is all-or-nothing, so nothing
    /// landed and the client can safely retry the whole push.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Push/pull orchestrator over an injected log store.
///
/// Cheap to clone-share behind an `Arc`; all methods take `&self`. The
/// engine holds no per-user state — the log store is the only shared
/// mutable resource.
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn LogStore>,
    detector: ConflictDetector,
}

impl SyncEngine {
    #[must_use]
    pub fn new(config: SyncConfig, store: Arc<dyn LogStore>) -> Self {
        Self {
            config,
            store,
            detector: ConflictDetector::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Ingest a device's batch of pending operations.
    ///
    /// Every operation is judged against one consistent snapshot of the
    /// entities the batch touches; accepted operations are appended in a
    /// single atomic transaction. The response carries one result per
    /// submitted operation, in submitted order, keyed by `operation_id`.
    ///
    /// Conflicts are results, not errors: a conflict on one entity never
    /// affects operations on other entities in the same batch.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id, device_id = %request.device_id, operations = request.operations.len()))]
    pub async fn push(
        &self,
        user_id: &str,
        request: &PushRequest,
    ) -> Result<PushResponse, SyncError> {
        let start = std::time::Instant::now();

        self.validate_push(request).inspect_err(|_| {
            crate::metrics::record_push_batch("rejected");
        })?;
        crate::metrics::record_batch_size(request.operations.len());

        let keys = distinct_keys(&request.operations);
        let max_attempts = self.config.push_retry_attempts.max(1);

        for attempt in 1..=max_attempts {
            let snapshot = self.store.latest_for_entities(user_id, &keys).await?;
            let (results, entries) = self.evaluate_batch(user_id, request, &snapshot);

            debug!(
                accepted = entries.len(),
                conflicts = results.len() - entries.len(),
                attempt,
                "Batch evaluated"
            );

            match self.store.append_batch(&entries).await {
                Ok(()) => {
                    for result in &results {
                        crate::metrics::record_push_outcome(if result.outcome.is_accepted() {
                            "accepted"
                        } else {
                            "conflict"
                        });
                    }
                    crate::metrics::record_push_batch("committed");
                    crate::metrics::record_latency("push", start.elapsed());
                    return Ok(PushResponse { results });
                }
                Err(StorageError::VersionCollision {
                    entity_type,
                    entity_id,
                    version,
                }) => {
                    // A concurrent device claimed one of our versions.
                    // Nothing committed; re-snapshot and re-evaluate. The
                    // loop ends after the configured number of attempts.
                    crate::metrics::record_version_collision();
                    warn!(
                        %entity_type,
                        %entity_id,
                        version,
                        attempt,
                        "Version race lost, re-evaluating batch"
                    );
                }
                Err(err) => {
                    crate::metrics::record_push_batch("error");
                    return Err(err.into());
                }
            }
        }

        // Collided on every attempt. The client retries the whole push.
        crate::metrics::record_push_batch("error");
        Err(SyncError::Storage(StorageError::Backend(format!(
            "push gave up after {max_attempts} version-collision retries"
        ))))
    }

    /// Serve a device the next page of changes it has not yet observed.
    ///
    /// Pure read: the device's own writes are suppressed, entries are
    /// ordered by `(applied_at, id)` ascending, and the page is capped at
    /// `max_batch_size`. `has_more` signals the client to re-pull with the
    /// last change's `applied_at` as the next cursor.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id, device_id = %request.device_id))]
    pub async fn pull(
        &self,
        user_id: &str,
        request: &PullRequest,
    ) -> Result<PullResponse, SyncError> {
        let start = std::time::Instant::now();

        if request.device_id.is_empty() {
            return Err(SyncError::InvalidOperation {
                reason: "deviceId must not be empty".to_string(),
            });
        }

        let query = PullQuery {
            exclude_device_id: request.device_id.clone(),
            since: request.since.unwrap_or(DateTime::UNIX_EPOCH),
            entity_types: request.entity_types.clone(),
            limit: self.config.max_batch_size,
        };

        let entries = self.store.scan_since(user_id, &query).await?;
        let has_more = entries.len() == self.config.max_batch_size;

        debug!(changes = entries.len(), has_more, "Pull page served");
        crate::metrics::record_pull_page(entries.len());
        crate::metrics::record_latency("pull", start.elapsed());

        Ok(PullResponse {
            changes: entries.into_iter().map(ChangeRecord::from).collect(),
            has_more,
            server_time: Utc::now(),
        })
    }

    fn validate_push(&self, request: &PushRequest) -> Result<(), SyncError> {
        if request.device_id.is_empty() {
            return Err(SyncError::InvalidOperation {
                reason: "deviceId must not be empty".to_string(),
            });
        }
        if request.operations.len() > self.config.max_batch_size {
            return Err(SyncError::BatchTooLarge {
                submitted: request.operations.len(),
                max: self.config.max_batch_size,
            });
        }
        for op in &request.operations {
            if op.operation_id.is_empty() {
                return Err(SyncError::InvalidOperation {
                    reason: "operationId must not be empty".to_string(),
                });
            }
            if op.entity_id.is_nil() {
                return Err(SyncError::InvalidOperation {
                    reason: format!("operation '{}' has a nil entityId", op.operation_id),
                });
            }
        }
        Ok(())
    }

    /// Judge every operation against the snapshot and build the log entries
    /// for the accepted ones.
    ///
    /// Conflict judgement uses the snapshot version only (one consistent
    /// view for the whole batch), but version assignment tracks versions
    /// handed out earlier in the same batch so an entity edited twice in one
    /// batch stays gapless. Each entry gets a distinct `applied_at` (base
    /// time plus its batch offset) so per-entity `applied_at` order is
    /// strictly increasing even within a batch.
    fn evaluate_batch(
        &self,
        user_id: &str,
        request: &PushRequest,
        snapshot: &HashMap<EntityKey, SyncLogEntry>,
    ) -> (Vec<crate::conflict::OperationResult>, Vec<SyncLogEntry>) {
        let base_time = Utc::now();
        let mut assigned: HashMap<EntityKey, i64> = HashMap::new();
        let mut results = Vec::with_capacity(request.operations.len());
        let mut entries: Vec<SyncLogEntry> = Vec::new();

        for operation in &request.operations {
            let key = operation.entity_key();
            let existing = snapshot.get(&key);
            let result = self.detector.evaluate(operation, existing);

            if result.outcome.is_accepted() {
                let current = assigned
                    .get(&key)
                    .copied()
                    .or(existing.map(|e| e.version))
                    .unwrap_or(0);
                let version = current + 1;
                assigned.insert(key, version);

                entries.push(SyncLogEntry {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    device_id: request.device_id.clone(),
                    entity_type: operation.entity_type,
                    entity_id: operation.entity_id,
                    operation: operation.operation,
                    payload: operation.payload.clone(),
                    version,
                    applied_at: base_time + Duration::microseconds(entries.len() as i64),
                });
            }
            results.push(result);
        }

        (results, entries)
    }
}

/// Distinct entity keys of a batch, in first-seen order.
fn distinct_keys(operations: &[SyncOperation]) -> Vec<EntityKey> {
    let mut keys = Vec::new();
    for op in operations {
        let key = op.entity_key();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
