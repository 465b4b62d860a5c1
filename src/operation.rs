//! Sync data model.
//!
//! Two record kinds flow through the engine: the [`SyncOperation`] a device
//! submits (its offline edit intent) and the [`SyncLogEntry`] the server
//! writes once an operation is accepted. Log entries are immutable facts;
//! nothing in this crate ever rewrites or removes one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain entity kinds that participate in sync.
///
/// The set is closed: payloads are opaque to the engine, but the kind is part
/// of the log key and of pull filtering, so it is a real enum rather than a
/// free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Score,
    Folder,
    SetList,
    SetListEntry,
    AnnotationLayer,
    Tag,
}

impl EntityType {
    /// Stable text form used in storage columns.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Folder => "folder",
            Self::SetList => "set_list",
            Self::SetListEntry => "set_list_entry",
            Self::AnnotationLayer => "annotation_layer",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Self::Score),
            "folder" => Ok(Self::Folder),
            "set_list" => Ok(Self::SetList),
            "set_list_entry" => Ok(Self::SetListEntry),
            "annotation_layer" => Ok(Self::AnnotationLayer),
            "tag" => Ok(Self::Tag),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// What the client did to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation kind '{other}'")),
        }
    }
}

/// Identity of one syncable entity within a user's data set.
///
/// Snapshot lookups and the per-entity uniqueness guard key on this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
}

impl EntityKey {
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self { entity_type, entity_id }
    }
}

/// A client-submitted edit intent.
///
/// `operation_id` is the client-generated idempotency key (unique per
/// device); the engine echoes it back on every result so the client can
/// reconcile responses even when they interleave with other devices'
/// activity. `client_version` is the server version the client last observed
/// for this entity, and is the sole input to conflict detection — acceptance
/// is never keyed on `operation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub operation_id: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: OperationKind,
    pub client_version: i64,
    /// Opaque serialized entity state. Absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl SyncOperation {
    /// The log key this operation targets.
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }
}

/// A server-accepted, durable log record.
///
/// Created exactly once by the push path, read many times by pulls and by
/// future conflict evaluations (as the entity's current version), never
/// altered. `applied_at` is the pull pagination cursor; `id` breaks
/// `applied_at` ties so pagination is never ambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub device_id: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Server-assigned version, starting at 1 and gapless per entity.
    pub version: i64,
    pub applied_at: DateTime<Utc>,
}

impl SyncLogEntry {
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }
}
