//! The merge-upsert writer.
//!
//! `apply` commits a batch of keyed records to a target table with
//! merge semantics: an existing merge key is replaced in place, a new key
//! is inserted. The commit protocol makes replay safe:
//!
//! 1. Validate every record; any failure rejects the whole batch before a
//!    single write.
//! 2. Acquire the table writer lock (a concurrent writer is rejected).
//! 3. If the manifest already records this batch's fingerprint, return the
//!    committed version without writing (idempotent replay).
//! 4. Write each row to an immutable, uniquely named object — invisible
//!    until referenced.
//! 5. CAS-swap the manifest with all row pointers updated at once.
//!
//! A failure at any point before step 5 leaves the manifest — and thus the
//! readable table — in its pre-run state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use tracing::{Instrument as _, debug, info};
use ulid::Ulid;

use strata_core::observability::merge_span;
use strata_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use strata_core::{Error as CoreError, TableLock};

use crate::error::{MergeError, Result};
use crate::manifest::{RowPointer, TableManifest, paths};
use crate::metrics::{
    record_batch_rejected, record_batch_replayed, record_cas_retry, record_rows_merged,
};

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct MergeWriterConfig {
    /// TTL for the table writer lock.
    pub lock_ttl: Duration,
    /// Retry attempts when the lock is held.
    pub lock_max_retries: u32,
    /// Maximum CAS retries for the manifest swap.
    pub max_cas_retries: usize,
}

impl Default for MergeWriterConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            lock_max_retries: 5,
            max_cas_retries: 16,
        }
    }
}

/// One keyed record in a merge batch.
#[derive(Debug, Clone)]
pub struct MergeRecord {
    /// Merge key within the target table.
    pub merge_key: String,
    /// Row payload (a JSON object).
    pub row: serde_json::Value,
}

impl MergeRecord {
    /// Builds a record from any serializable row.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the row cannot be converted to JSON.
    pub fn new<T: Serialize>(merge_key: impl Into<String>, row: &T) -> Result<Self> {
        let row = serde_json::to_value(row)
            .map_err(|e| MergeError::serialization(format!("serialize row: {e}")))?;
        Ok(Self {
            merge_key: merge_key.into(),
            row,
        })
    }
}

/// A batch of records destined for one table, applied atomically.
#[derive(Debug, Clone)]
pub struct MergeBatch {
    /// Target table name.
    pub table: String,
    /// Batch identity for replay detection (e.g. `{table}/{run_date}`).
    pub batch_key: String,
    /// Records to merge.
    pub records: Vec<MergeRecord>,
}

impl MergeBatch {
    /// Creates an empty batch for `table` keyed by `batch_key`.
    #[must_use]
    pub fn new(table: impl Into<String>, batch_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            batch_key: batch_key.into(),
            records: Vec::new(),
        }
    }

    /// Appends a serializable row under its merge key.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the row cannot be converted to JSON.
    pub fn push<T: Serialize>(&mut self, merge_key: impl Into<String>, row: &T) -> Result<()> {
        self.records.push(MergeRecord::new(merge_key, row)?);
        Ok(())
    }

    /// Whether the batch carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of a committed (or replayed) batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Manifest version after the commit.
    pub version: u64,
    /// Rows merged by this call (zero on replay).
    pub rows_merged: usize,
    /// Whether the batch was detected as an identical resubmission.
    pub replayed: bool,
}

/// Merge-upsert writer for one target table.
pub struct MergeWriter {
    storage: Arc<dyn StorageBackend>,
    config: MergeWriterConfig,
}

impl std::fmt::Debug for MergeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeWriter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MergeWriter {
    /// Creates a writer over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            config: MergeWriterConfig::default(),
        }
    }

    /// Sets writer configuration.
    #[must_use]
    pub fn with_config(mut self, config: MergeWriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies a batch to its target table.
    ///
    /// Equivalent in effect to running the batch exactly once: an identical
    /// resubmission leaves the target unchanged, and a corrected
    /// resubmission fully supersedes the previous value for each merge key.
    ///
    /// # Errors
    ///
    /// - [`MergeError::Validation`] if any record is invalid (whole batch
    ///   rejected, nothing written)
    /// - [`MergeError::Conflict`] if a concurrent writer holds the table or
    ///   CAS retries are exhausted
    /// - [`MergeError::Storage`] on storage failures (manifest untouched)
    pub async fn apply(&self, batch: &MergeBatch, now: DateTime<Utc>) -> Result<CommitOutcome> {
        let span = merge_span(&batch.table, &batch.batch_key);
        self.apply_inner(batch, now).instrument(span).await
    }

    async fn apply_inner(&self, batch: &MergeBatch, now: DateTime<Utc>) -> Result<CommitOutcome> {
        if let Err(e) = validate(batch) {
            record_batch_rejected(&batch.table);
            return Err(e);
        }

        let fingerprint = batch_fingerprint(batch)?;

        let lock = TableLock::new(Arc::clone(&self.storage), paths::lock(&batch.table));
        let lock_guard = lock
            .acquire_with_operation(
                self.config.lock_ttl,
                self.config.lock_max_retries,
                Some(format!("merge {}", batch.batch_key)),
            )
            .await
            .map_err(|e| match e {
                CoreError::PreconditionFailed { message } => MergeError::conflict(message),
                other => MergeError::Storage(other),
            })?;

        let result = self.commit_locked(batch, &fingerprint, now).await;

        // Release even on failure so a retry does not wait out the TTL.
        lock_guard.release().await.map_err(MergeError::Storage)?;

        result
    }

    async fn commit_locked(
        &self,
        batch: &MergeBatch,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        for _ in 0..self.config.max_cas_retries {
            let (manifest, version_token) = self.load_manifest(&batch.table).await?;

            if manifest.applied_batches.get(&batch.batch_key) == Some(&fingerprint.to_string()) {
                debug!(batch = %batch.batch_key, "identical batch already applied; replaying");
                record_batch_replayed(&batch.table);
                return Ok(CommitOutcome {
                    version: manifest.version,
                    rows_merged: 0,
                    replayed: true,
                });
            }

            let mut pointers = BTreeMap::new();
            for record in &batch.records {
                let path = paths::row_object(&batch.table, &Ulid::new());
                let (bytes, row_hash) = encode_row(&record.row)?;
                let write = self
                    .storage
                    .put(&path, bytes, WritePrecondition::DoesNotExist)
                    .await?;
                let WriteResult::Success { .. } = write else {
                    return Err(MergeError::conflict(format!(
                        "row object path collision at {path}"
                    )));
                };
                pointers.insert(record.merge_key.clone(), RowPointer { path, row_hash });
            }

            let mut updated = manifest.clone();
            updated.version = manifest.next_version();
            updated.updated_at = now;
            updated.rows.extend(pointers);
            updated
                .applied_batches
                .insert(batch.batch_key.clone(), fingerprint.to_string());

            match self.store_manifest(&batch.table, &updated, version_token.as_deref()).await? {
                WriteResult::Success { .. } => {
                    record_rows_merged(&batch.table, batch.records.len() as u64);
                    info!(
                        batch = %batch.batch_key,
                        rows = batch.records.len(),
                        version = updated.version,
                        "merge committed"
                    );
                    return Ok(CommitOutcome {
                        version: updated.version,
                        rows_merged: batch.records.len(),
                        replayed: false,
                    });
                }
                WriteResult::PreconditionFailed { .. } => {
                    record_cas_retry(&batch.table);
                    continue;
                }
            }
        }

        Err(MergeError::conflict(format!(
            "failed to commit {} after {} CAS retries",
            batch.batch_key, self.config.max_cas_retries
        )))
    }

    async fn load_manifest(&self, table: &str) -> Result<(TableManifest, Option<String>)> {
        let path = paths::manifest(table);
        let Some(meta) = self.storage.head(&path).await? else {
            return Ok((TableManifest::new(DateTime::<Utc>::MIN_UTC), None));
        };

        let bytes = self.storage.get(&path).await?;
        let manifest: TableManifest = serde_json::from_slice(&bytes)
            .map_err(|e| MergeError::serialization(format!("deserialize manifest: {e}")))?;
        Ok((manifest, Some(meta.version)))
    }

    async fn store_manifest(
        &self,
        table: &str,
        manifest: &TableManifest,
        expected_version: Option<&str>,
    ) -> Result<WriteResult> {
        let path = paths::manifest(table);
        let json = serde_json::to_vec(manifest)
            .map_err(|e| MergeError::serialization(format!("serialize manifest: {e}")))?;
        let precondition = expected_version.map_or(WritePrecondition::DoesNotExist, |v| {
            WritePrecondition::MatchesVersion(v.to_string())
        });
        Ok(self
            .storage
            .put(&path, Bytes::from(json), precondition)
            .await?)
    }
}

fn validate(batch: &MergeBatch) -> Result<()> {
    if batch.table.is_empty() {
        return Err(MergeError::validation("<unnamed>", "table name is empty"));
    }
    if batch.batch_key.is_empty() {
        return Err(MergeError::validation(&batch.table, "batch key is empty"));
    }

    let mut seen = std::collections::HashSet::new();
    for record in &batch.records {
        if record.merge_key.is_empty() {
            return Err(MergeError::validation(&batch.table, "record has empty merge key"));
        }
        if !record.row.is_object() {
            return Err(MergeError::validation(
                &batch.table,
                format!("row for {} is not a JSON object", record.merge_key),
            ));
        }
        if !seen.insert(record.merge_key.as_str()) {
            return Err(MergeError::validation(
                &batch.table,
                format!("duplicate merge key in batch: {}", record.merge_key),
            ));
        }
    }
    Ok(())
}

fn encode_row(row: &serde_json::Value) -> Result<(Bytes, String)> {
    let canonical = serde_jcs::to_vec(row)
        .map_err(|e| MergeError::serialization(format!("canonicalize row: {e}")))?;
    let hash = sha256_hex(&canonical);
    Ok((Bytes::from(canonical), hash))
}

/// Canonical fingerprint of a batch: the batch key plus each merge key's
/// row hash, hashed over an RFC 8785 encoding so field order never matters.
fn batch_fingerprint(batch: &MergeBatch) -> Result<String> {
    let mut row_hashes = BTreeMap::new();
    for record in &batch.records {
        let canonical = serde_jcs::to_vec(&record.row)
            .map_err(|e| MergeError::serialization(format!("canonicalize row: {e}")))?;
        row_hashes.insert(record.merge_key.clone(), sha256_hex(&canonical));
    }

    let value = serde_json::json!({
        "batchKey": batch.batch_key,
        "rows": row_hashes,
    });
    let canonical = serde_jcs::to_string(&value)
        .map_err(|e| MergeError::serialization(format!("canonicalize fingerprint: {e}")))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> MergeBatch {
        let mut batch = MergeBatch::new("cumulative_rent_listing", "cumulative_rent_listing/2025-02-04");
        batch
            .push("p1/2025-02-04", &serde_json::json!({"propertyId": "p1", "price": "1850.00"}))
            .expect("push");
        batch
    }

    #[test]
    fn fingerprint_is_stable_under_field_order() {
        let mut a = MergeBatch::new("t", "t/2025-02-04");
        a.push("k1", &serde_json::json!({"x": 1, "y": 2})).expect("push");
        let mut b = MergeBatch::new("t", "t/2025-02-04");
        b.push("k1", &serde_json::json!({"y": 2, "x": 1})).expect("push");

        assert_eq!(
            batch_fingerprint(&a).expect("fp a"),
            batch_fingerprint(&b).expect("fp b")
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = sample_batch();
        let mut b = sample_batch();
        b.records[0].row = serde_json::json!({"propertyId": "p1", "price": "1900.00"});

        assert_ne!(
            batch_fingerprint(&a).expect("fp a"),
            batch_fingerprint(&b).expect("fp b")
        );
    }

    #[test]
    fn validation_rejects_duplicate_merge_keys() {
        let mut batch = sample_batch();
        batch
            .push("p1/2025-02-04", &serde_json::json!({"propertyId": "p1"}))
            .expect("push");
        assert!(matches!(
            validate(&batch),
            Err(MergeError::Validation { .. })
        ));
    }

    #[test]
    fn validation_rejects_non_object_rows() {
        let mut batch = MergeBatch::new("t", "t/2025-02-04");
        batch.records.push(MergeRecord {
            merge_key: "k".into(),
            row: serde_json::json!([1, 2, 3]),
        });
        assert!(matches!(
            validate(&batch),
            Err(MergeError::Validation { .. })
        ));
    }

    #[test]
    fn validation_rejects_empty_merge_key() {
        let mut batch = MergeBatch::new("t", "t/2025-02-04");
        batch.records.push(MergeRecord {
            merge_key: String::new(),
            row: serde_json::json!({}),
        });
        assert!(matches!(
            validate(&batch),
            Err(MergeError::Validation { .. })
        ));
    }
}
