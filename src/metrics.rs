// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for civic-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding host is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `civic_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `outcome`: hit, miss, expired, corrupt, error
//! - `operation`: create, update, delete
//! - `status`: success, failure

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of a store read (hit, miss, expired, corrupt, error)
pub fn record_store_read(outcome: &str) {
    counter!(
        "civic_sync_store_reads_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the outcome of a store write
pub fn record_store_write(status: &str) {
    counter!(
        "civic_sync_store_writes_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record read-cache evictions caused by the capacity bound
pub fn record_cache_eviction() {
    counter!("civic_sync_cache_evictions_total").increment(1);
}

/// Record entries evicted because their TTL had passed
pub fn record_expired_evictions(count: usize) {
    counter!("civic_sync_expired_evictions_total").increment(count as u64);
}

/// Set current read-cache entry count
pub fn set_read_cache_entries(count: usize) {
    gauge!("civic_sync_read_cache_entries").set(count as f64);
}

/// Set current pending-change queue depth
pub fn set_queue_depth(count: usize) {
    gauge!("civic_sync_queue_depth").set(count as f64);
}

/// Record the terminal outcome of a sync run (idle, offline, error)
pub fn record_sync_run(outcome: &str) {
    counter!(
        "civic_sync_runs_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a per-item sync result
pub fn record_sync_item(operation: &str, status: &str) {
    counter!(
        "civic_sync_items_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record total wall time of a sync run
pub fn record_sync_run_duration(duration: Duration) {
    histogram!("civic_sync_run_seconds").record(duration.as_secs_f64());
}

/// Record latency of a single remote call
pub fn record_remote_latency(operation: &str, duration: Duration) {
    histogram!(
        "civic_sync_remote_call_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a corruption detection (checksum mismatch or undecodable entry)
pub fn record_corruption(key: &str) {
    counter!(
        "civic_sync_corruption_detected_total",
        "key" => key.to_string()
    )
    .increment(1);
}
