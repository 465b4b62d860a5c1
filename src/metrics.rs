// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the sync engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! process chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `sheetsync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: push, pull
//! - `status`: accepted, conflict, rejected, error

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the outcome of one operation within a push batch.
pub fn record_push_outcome(status: &str) {
    counter!(
        "sheetsync_push_operations_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a whole-batch result (committed, rejected, error).
pub fn record_push_batch(status: &str) {
    counter!(
        "sheetsync_push_batches_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record push batch size (operations per request).
pub fn record_batch_size(count: usize) {
    histogram!("sheetsync_push_batch_size").record(count as f64);
}

/// Record a lost per-entity version race (append retried).
pub fn record_version_collision() {
    counter!("sheetsync_version_collisions_total").increment(1);
}

/// Record a pull page size (entries returned).
pub fn record_pull_page(count: usize) {
    histogram!("sheetsync_pull_page_size").record(count as f64);
}

/// Record end-to-end latency of a push or pull call.
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "sheetsync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}
