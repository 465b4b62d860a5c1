//! # SheetSync Engine
//!
//! Offline-first synchronization for multi-device user data: an append-only
//! per-user change log, a push/pull protocol, and optimistic-concurrency
//! conflict detection. Conflicts are surfaced to the client, never silently
//! resolved.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      SyncEngine                         │
//! │  • push(): validate → snapshot → evaluate → append      │
//! │  • pull(): cursor range scan with device-echo           │
//! │    suppression and pagination                           │
//! └─────────────────────────────────────────────────────────┘
//!           │                               │
//!           ▼                               ▼
//! ┌──────────────────────┐   ┌─────────────────────────────┐
//! │   ConflictDetector   │   │          LogStore           │
//! │  pure per-operation  │   │  append-only, per-user log  │
//! │  version comparison  │   │  (in-memory / SQLite/MySQL) │
//! └──────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! Each accepted operation becomes an immutable [`SyncLogEntry`] with a
//! server-assigned, per-entity gapless version; the latest entry per entity
//! is the version oracle for conflict detection. Concurrent pushes to the
//! same entity serialize on a `(user, entity, version)` uniqueness guard in
//! the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheetsync::{
//!     InMemoryLogStore, PullRequest, PushRequest, SyncConfig, SyncEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryLogStore::new());
//!     let engine = SyncEngine::new(SyncConfig::default(), store);
//!
//!     // Ingest a device's offline edits (user id comes from the host's
//!     // identity layer).
//!     let request: PushRequest = serde_json::from_str(r#"{
//!         "deviceId": "tablet-1",
//!         "operations": [{
//!             "operationId": "op-1",
//!             "entityType": "score",
//!             "entityId": "a3b26a55-55a6-4f04-9f6c-32d898d875a6",
//!             "operation": "update",
//!             "clientVersion": 0,
//!             "payload": "{\"title\":\"Prelude in C\"}"
//!         }]
//!     }"#).unwrap();
//!     let response = engine.push("user-1", &request).await.unwrap();
//!     assert!(response.results[0].outcome.is_accepted());
//!
//!     // Another device catches up.
//!     let pull = PullRequest {
//!         device_id: "phone-2".into(),
//!         since: None,
//!         entity_types: None,
//!     };
//!     let page = engine.pull("user-1", &pull).await.unwrap();
//!     assert_eq!(page.changes.len(), 1);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the [`SyncEngine`] push/pull orchestrator
//! - [`conflict`]: the pure [`ConflictDetector`] and per-operation outcomes
//! - [`operation`]: the [`SyncOperation`] / [`SyncLogEntry`] data model
//! - [`storage`]: log store backends (in-memory, SQLite/MySQL)
//! - [`resilience`]: bounded retry for the SQL backend
//! - [`metrics`]: metrics-crate instrumentation (exporter chosen by the host)

pub mod config;
pub mod operation;
pub mod conflict;
pub mod engine;
pub mod storage;
pub mod resilience;
pub mod metrics;

pub use config::SyncConfig;
pub use conflict::{ConflictDetector, ConflictType, OperationResult, Outcome};
pub use engine::{
    ChangeRecord, PullRequest, PullResponse, PushRequest, PushResponse, SyncEngine, SyncError,
};
pub use operation::{EntityKey, EntityType, OperationKind, SyncLogEntry, SyncOperation};
pub use storage::{InMemoryLogStore, LogStore, PullQuery, SqlLogStore, StorageError};
pub use resilience::retry::RetryConfig;
