//! Protocol types for the sync engine.
//!
//! These are the transport-agnostic request/response shapes of the push and
//! pull operations. A host wires them to whatever transport it has (HTTP,
//! gRPC, a message queue); the engine never sees the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::OperationResult;
use crate::operation::{EntityType, OperationKind, SyncLogEntry, SyncOperation};

/// A device's batch of pending operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    pub operations: Vec<SyncOperation>,
}

/// Per-operation outcomes, one per submitted operation, in submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub results: Vec<OperationResult>,
}

impl PushResponse {
    /// Count of operations that were accepted and appended.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.is_accepted())
            .count()
    }
}

/// A device asking for changes it has not yet observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub device_id: String,
    /// `applied_at` of the last entry the device has seen; `None` for a
    /// first sync (treated as the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Optional filter; `None` means all entity types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityType>>,
}

/// One change another device made, as served to a pulling device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl From<SyncLogEntry> for ChangeRecord {
    fn from(entry: SyncLogEntry) -> Self {
        Self {
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            operation: entry.operation,
            payload: entry.payload,
            applied_at: entry.applied_at,
        }
    }
}

/// One page of changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub changes: Vec<ChangeRecord>,
    /// True when the page hit the cap; the client re-pulls with the last
    /// change's `applied_at` as the next cursor.
    pub has_more: bool,
    /// Informational only (clock-skew detection); never the next cursor.
    pub server_time: DateTime<Utc>,
}

impl PullResponse {
    /// Cursor for the follow-up pull, if this page had any changes.
    #[must_use]
    pub fn next_cursor(&self) -> Option<DateTime<Utc>> {
        self.changes.last().map(|c| c.applied_at)
    }
}
