//! Read path for merge-committed tables.
//!
//! Readers resolve rows exclusively through the table manifest, so they
//! only ever observe fully committed state. Merge keys are
//! `{property_id}/{ISO date}`, which makes per-entity ranges sort
//! chronologically and lets date-level queries parse the key suffix.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use strata_core::storage::StorageBackend;

use crate::error::{MergeError, Result};
use crate::manifest::{TableManifest, paths};

/// Summary statistics for one table, for operator surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// Manifest commit version.
    pub version: u64,
    /// Number of committed merge keys.
    pub rows: usize,
    /// Highest date committed, parsed from merge-key suffixes.
    pub max_date: Option<NaiveDate>,
}

/// Reader over one committed table.
pub struct TableReader {
    storage: Arc<dyn StorageBackend>,
    table: String,
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl TableReader {
    /// Creates a reader for `table`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }

    /// Loads the table manifest, or `None` for a never-written table.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt manifest.
    pub async fn manifest(&self) -> Result<Option<TableManifest>> {
        let path = paths::manifest(&self.table);
        match self.storage.get(&path).await {
            Ok(bytes) => {
                let manifest: TableManifest = serde_json::from_slice(&bytes)
                    .map_err(|e| MergeError::serialization(format!("deserialize manifest: {e}")))?;
                Ok(Some(manifest))
            }
            Err(strata_core::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(MergeError::Storage(e)),
        }
    }

    /// Equality lookup of one merge key.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a row that fails to decode.
    pub async fn get_row<T: DeserializeOwned>(&self, merge_key: &str) -> Result<Option<T>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(None);
        };
        let Some(pointer) = manifest.rows.get(merge_key) else {
            return Ok(None);
        };
        Ok(Some(self.fetch(&pointer.path).await?))
    }

    /// Sorted scan of all merge keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a row that fails to decode.
    pub async fn scan_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for (key, pointer) in manifest.rows.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.clone(), self.fetch(&pointer.path).await?));
        }
        Ok(out)
    }

    /// All rows whose merge key dates them at exactly `date`, keyed by the
    /// entity portion of the merge key.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a row that fails to decode.
    pub async fn rows_at_date<T: DeserializeOwned>(
        &self,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, T>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(BTreeMap::new());
        };

        let suffix = format!("/{}", date.format("%Y-%m-%d"));
        let mut out = BTreeMap::new();
        for (key, pointer) in &manifest.rows {
            if let Some(entity) = key.strip_suffix(&suffix) {
                out.insert(entity.to_string(), self.fetch(&pointer.path).await?);
            }
        }
        Ok(out)
    }

    /// Highest date committed to this table, or `None` when empty.
    ///
    /// This is the watermark source: the boundary between already-processed
    /// and new input.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt manifest.
    pub async fn max_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self.key_dates().await?.into_iter().max())
    }

    /// Highest committed date strictly before `bound`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt manifest.
    pub async fn max_date_before(&self, bound: NaiveDate) -> Result<Option<NaiveDate>> {
        Ok(self
            .key_dates()
            .await?
            .into_iter()
            .filter(|d| *d < bound)
            .max())
    }

    /// Summary statistics for this table.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt manifest.
    pub async fn stats(&self) -> Result<Option<TableStats>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(None);
        };
        let max_date = manifest
            .rows
            .keys()
            .filter_map(|k| parse_key_date(k))
            .max();
        Ok(Some(TableStats {
            version: manifest.version,
            rows: manifest.rows.len(),
            max_date,
        }))
    }

    async fn key_dates(&self) -> Result<Vec<NaiveDate>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(Vec::new());
        };
        Ok(manifest
            .rows
            .keys()
            .filter_map(|k| parse_key_date(k))
            .collect())
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.storage.get(path).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MergeError::serialization(format!("deserialize row {path}: {e}")))
    }
}

/// Parses the trailing `/{ISO date}` component of a merge key.
fn parse_key_date(merge_key: &str) -> Option<NaiveDate> {
    let (_, suffix) = merge_key.rsplit_once('/')?;
    NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_core::storage::MemoryBackend;

    use crate::writer::{MergeBatch, MergeWriter};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_key_dates() {
        assert_eq!(
            parse_key_date("p1/2025-02-04"),
            Some(date(2025, 2, 4))
        );
        assert_eq!(parse_key_date("p1"), None);
        assert_eq!(parse_key_date("p1/not-a-date"), None);
    }

    #[tokio::test]
    async fn empty_table_reads_as_absent() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let reader = TableReader::new(storage, "cumulative_rent_listing");

        assert!(reader.manifest().await.expect("manifest").is_none());
        assert_eq!(reader.max_date().await.expect("max date"), None);
        assert!(reader.stats().await.expect("stats").is_none());
        let rows: Vec<(String, serde_json::Value)> =
            reader.scan_prefix("p1/").await.expect("scan");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn reads_committed_rows_by_key_prefix_and_date() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let writer = MergeWriter::new(Arc::clone(&storage));

        let mut batch = MergeBatch::new("t", "t/2025-02-04");
        for (key, price) in [
            ("p1/2025-02-03", "1800.00"),
            ("p1/2025-02-04", "1850.00"),
            ("p2/2025-02-04", "2400.00"),
        ] {
            batch
                .push(key, &serde_json::json!({"price": price}))
                .expect("push");
        }
        writer.apply(&batch, Utc::now()).await.expect("apply");

        let reader = TableReader::new(storage, "t");

        let p1_history: Vec<(String, serde_json::Value)> =
            reader.scan_prefix("p1/").await.expect("scan");
        assert_eq!(p1_history.len(), 2);
        assert!(p1_history[0].0 < p1_history[1].0, "chronological order");

        let at_4th = reader
            .rows_at_date::<serde_json::Value>(date(2025, 2, 4))
            .await
            .expect("rows at date");
        assert_eq!(at_4th.len(), 2);
        assert!(at_4th.contains_key("p1") && at_4th.contains_key("p2"));

        assert_eq!(reader.max_date().await.expect("max"), Some(date(2025, 2, 4)));
        assert_eq!(
            reader.max_date_before(date(2025, 2, 4)).await.expect("before"),
            Some(date(2025, 2, 3))
        );

        let stats = reader.stats().await.expect("stats").expect("present");
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.version, 1);
    }
}
