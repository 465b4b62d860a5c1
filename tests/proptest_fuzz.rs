//! Property-based tests.
//!
//! Three groups:
//! - conflict-rule properties over arbitrary version pairs
//! - wire-format fuzzing (arbitrary bytes and JSON must never panic the
//!   deserializers)
//! - engine invariants over generated operation sequences (gapless
//!   versions, lossless pagination)

use std::sync::Arc;

use proptest::prelude::*;
use sheetsync::{
    ConflictDetector, EntityType, InMemoryLogStore, OperationKind, Outcome, PullRequest,
    PushRequest, SyncConfig, SyncEngine, SyncLogEntry, SyncOperation,
};
use chrono::Utc;
use uuid::Uuid;

fn update_op(entity_id: Uuid, client_version: i64) -> SyncOperation {
    SyncOperation {
        operation_id: Uuid::new_v4().to_string(),
        entity_type: EntityType::Score,
        entity_id,
        operation: OperationKind::Update,
        client_version,
        payload: Some("{}".to_string()),
    }
}

fn log_entry(entity_id: Uuid, version: i64, payload: Option<String>) -> SyncLogEntry {
    SyncLogEntry {
        id: Uuid::new_v4(),
        user_id: "user-1".to_string(),
        device_id: "other-device".to_string(),
        entity_type: EntityType::Score,
        entity_id,
        operation: OperationKind::Update,
        payload,
        version,
        applied_at: Utc::now(),
    }
}

// =============================================================================
// Conflict rule
// =============================================================================

proptest! {
    /// Acceptance is exactly `client_version >= server_version`, for any
    /// pair of versions.
    #[test]
    fn conflict_rule_is_the_version_comparison(
        client_version in 0i64..1_000_000,
        server_version in 1i64..1_000_000,
    ) {
        let detector = ConflictDetector::new();
        let entity_id = Uuid::new_v4();
        let op = update_op(entity_id, client_version);
        let latest = log_entry(entity_id, server_version, Some("{\"x\":1}".into()));

        let result = detector.evaluate(&op, Some(&latest));
        match result.outcome {
            Outcome::Accepted => prop_assert!(client_version >= server_version),
            Outcome::Conflict { server_version: reported, ref server_payload, .. } => {
                prop_assert!(client_version < server_version);
                prop_assert_eq!(reported, server_version);
                prop_assert_eq!(server_payload.as_deref(), Some("{\"x\":1}"));
            }
        }
    }

    /// An entity with no log history accepts any claimed client version.
    #[test]
    fn conflict_rule_accepts_unseen_entities(client_version in proptest::num::i64::ANY) {
        let detector = ConflictDetector::new();
        let op = update_op(Uuid::new_v4(), client_version);
        prop_assert!(detector.evaluate(&op, None).outcome.is_accepted());
    }
}

// =============================================================================
// Wire-format fuzzing
// =============================================================================

proptest! {
    /// Arbitrary bytes never panic the request deserializers.
    #[test]
    fn fuzz_arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = serde_json::from_slice::<PushRequest>(&data);
        let _ = serde_json::from_slice::<PullRequest>(&data);
        let _ = serde_json::from_slice::<SyncOperation>(&data);
    }

    /// Structurally valid JSON with hostile field values either parses or
    /// errors, and round-trips when it parses.
    #[test]
    fn fuzz_operation_fields(
        operation_id in ".*",
        entity_type in "[a-z_]{0,24}",
        operation in "[a-z]{0,12}",
        client_version in proptest::num::i64::ANY,
    ) {
        let json = serde_json::json!({
            "operationId": operation_id,
            "entityType": entity_type,
            "entityId": Uuid::new_v4(),
            "operation": operation,
            "clientVersion": client_version,
        });

        if let Ok(op) = serde_json::from_value::<SyncOperation>(json) {
            let reencoded = serde_json::to_value(&op).unwrap();
            let reparsed: SyncOperation = serde_json::from_value(reencoded).unwrap();
            prop_assert_eq!(reparsed.client_version, op.client_version);
            prop_assert_eq!(reparsed.entity_type, op.entity_type);
        }
    }
}

// =============================================================================
// Engine invariants
// =============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A device that always resubmits with the version it last observed
    /// drives an entity through gapless versions 1..=n.
    #[test]
    fn versions_stay_gapless_under_sequential_updates(updates in 1usize..30) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryLogStore::new());
            let engine = SyncEngine::new(SyncConfig::default(), Arc::clone(&store) as _);
            let entity_id = Uuid::new_v4();

            for observed in 0..updates as i64 {
                let request = PushRequest {
                    device_id: "tablet".to_string(),
                    operations: vec![update_op(entity_id, observed)],
                };
                let response = engine.push("user-1", &request).await.unwrap();
                prop_assert!(response.results[0].outcome.is_accepted());
            }

            prop_assert_eq!(store.len_for_user("user-1"), updates);
            Ok(())
        })?;
    }

    /// Paging through the log with `next_cursor` yields every change exactly
    /// once, for any log size and page size.
    #[test]
    fn pagination_is_lossless(total in 0usize..60, page_size in 1usize..20) {
        let rt = runtime();
        rt.block_on(async {
            let config = SyncConfig { max_batch_size: page_size, ..Default::default() };
            let engine = SyncEngine::new(config, Arc::new(InMemoryLogStore::new()));

            let mut pushed = std::collections::HashSet::new();
            for _ in 0..total {
                let entity_id = Uuid::new_v4();
                pushed.insert(entity_id);
                let request = PushRequest {
                    device_id: "tablet".to_string(),
                    operations: vec![update_op(entity_id, 0)],
                };
                engine.push("user-1", &request).await.unwrap();
            }

            let mut seen = std::collections::HashSet::new();
            let mut cursor = None;
            loop {
                let page = engine
                    .pull(
                        "user-1",
                        &PullRequest {
                            device_id: "phone".to_string(),
                            since: cursor,
                            entity_types: None,
                        },
                    )
                    .await
                    .unwrap();

                prop_assert!(page.changes.len() <= page_size);
                for change in &page.changes {
                    prop_assert!(seen.insert(change.entity_id));
                }
                if !page.has_more {
                    break;
                }
                cursor = page.next_cursor();
            }

            prop_assert_eq!(seen, pushed);
            Ok(())
        })?;
    }
}
