//! Merge writer metrics.
//!
//! Counters for merge outcomes and CAS retries. These complement the
//! structured logging already emitted on each commit.

use metrics::{counter, describe_counter};

/// Rows merged counter.
pub const ROWS_MERGED: &str = "strata_rows_merged_total";

/// Replayed (identical resubmission) batches counter.
pub const BATCHES_REPLAYED: &str = "strata_batches_replayed_total";

/// Rejected (validation failure) batches counter.
pub const BATCHES_REJECTED: &str = "strata_batches_rejected_total";

/// Manifest CAS retry counter.
pub const CAS_RETRY: &str = "strata_manifest_cas_retry_total";

/// Registers all merge metric descriptions.
///
/// Call once at application startup after initializing the metrics
/// recorder.
pub fn register_metrics() {
    describe_counter!(ROWS_MERGED, "Total rows committed by the merge writer");
    describe_counter!(BATCHES_REPLAYED, "Batches detected as identical resubmissions");
    describe_counter!(BATCHES_REJECTED, "Batches rejected by whole-batch validation");
    describe_counter!(CAS_RETRY, "Manifest CAS retry attempts");
}

/// Records rows committed for a table.
pub fn record_rows_merged(table: &str, rows: u64) {
    counter!(ROWS_MERGED, "table" => table.to_string()).increment(rows);
}

/// Records an idempotent batch replay.
pub fn record_batch_replayed(table: &str) {
    counter!(BATCHES_REPLAYED, "table" => table.to_string()).increment(1);
}

/// Records a whole-batch validation rejection.
pub fn record_batch_rejected(table: &str) {
    counter!(BATCHES_REJECTED, "table" => table.to_string()).increment(1);
}

/// Records a manifest CAS retry.
pub fn record_cas_retry(table: &str) {
    counter!(CAS_RETRY, "table" => table.to_string()).increment(1);
}
