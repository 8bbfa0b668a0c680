//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_indexed_total",
        "Total number of blocks successfully indexed"
    );
    describe_counter!(
        "transactions_indexed_total",
        "Total number of inscription-bearing transactions persisted"
    );
    describe_counter!(
        "protocol_errors_total",
        "Total number of metaprotocol operations that failed validation"
    );
    describe_counter!(
        "listings_timed_out_total",
        "Total number of marketplace deposits released by the timeout sweeper"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to process a block in seconds"
    );
}

/// Record a successfully indexed block.
pub fn record_block_indexed() {
    counter!("blocks_indexed_total").increment(1);
}

/// Record a persisted inscription-bearing transaction.
pub fn record_transaction_indexed() {
    counter!("transactions_indexed_total").increment(1);
}

/// Record a failed metaprotocol operation.
///
/// # Arguments
/// * `protocol` - The metaprotocol name from the URN ("unknown" if unrouted)
pub fn record_protocol_error(protocol: &str) {
    counter!("protocol_errors_total", "protocol" => protocol.to_string()).increment(1);
}

/// Record deposits released by the timeout sweeper.
pub fn record_listings_timed_out(count: u64) {
    counter!("listings_timed_out_total").increment(count);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_block_processing_duration(duration);
    }
}
