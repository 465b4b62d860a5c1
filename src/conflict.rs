//! Version conflict detection.
//!
//! The [`ConflictDetector`] is the single decision point for whether an
//! incoming operation may be applied. It is a pure function over the
//! operation and the entity's latest log entry — no I/O, no mutation — which
//! keeps the optimistic-concurrency rule trivially testable.
//!
//! A conflict is a first-class outcome, not an error: callers branch on the
//! [`Outcome`] tag and the client reconciles using the returned server
//! payload and version, then resubmits with an updated `client_version`.

use serde::{Deserialize, Serialize};

use crate::operation::{SyncLogEntry, SyncOperation};

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// The client's known version of the entity is older than the server's.
    VersionMismatch,
}

/// Per-operation push outcome.
///
/// Serializes to the wire shape `{"status":"accepted"}` or
/// `{"status":"conflict","conflictType":...,"serverPayload":...,"serverVersion":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    Accepted,
    #[serde(rename_all = "camelCase")]
    Conflict {
        conflict_type: ConflictType,
        /// The latest server payload for the entity, so the client can merge.
        server_payload: Option<String>,
        /// The server's current version, for the client's resubmit.
        server_version: i64,
    },
}

impl Outcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One operation's result, keyed by the client's idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub operation_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Stateless optimistic-concurrency rule.
///
/// The latest log entry for an entity is the version oracle; there is no
/// separate per-entity counter table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `operation` may be applied given the entity's latest
    /// accepted entry (or `None` if the entity has never been synced).
    ///
    /// Accepted iff there is no prior entry, or the client has observed the
    /// server's current version (`client_version >= server version`). Equal
    /// versions mean a deliberate overwrite after reconciliation and are
    /// accepted.
    #[must_use]
    pub fn evaluate(
        &self,
        operation: &SyncOperation,
        existing: Option<&SyncLogEntry>,
    ) -> OperationResult {
        let outcome = match existing {
            // No server state to conflict with.
            None => Outcome::Accepted,
            Some(entry) if operation.client_version >= entry.version => Outcome::Accepted,
            Some(entry) => Outcome::Conflict {
                conflict_type: ConflictType::VersionMismatch,
                server_payload: entry.payload.clone(),
                server_version: entry.version,
            },
        };

        OperationResult {
            operation_id: operation.operation_id.clone(),
            outcome,
        }
    }
}
