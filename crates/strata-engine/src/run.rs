//! The per-segment daily run pipeline.
//!
//! One run consumes a complete snapshot for its run date (plus any older
//! dates on a full-refresh backfill) and sequences the commits in
//! dependency order: the dimension advance for a date is committed before
//! that date's cumulative classification, which reads "current version"
//! lookups against it. Rent and sale segments have disjoint merge targets
//! and may run concurrently; within one table the merge writer's lock
//! keeps writers serialized.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{Instrument as _, info};

use strata_core::observability::run_span;
use strata_core::storage::StorageBackend;
use strata_core::{ListingObservation, Segment};
use strata_dimension::{DimensionConfig, DimensionVersion, VersionTracker};
use strata_merge::{MergeBatch, MergeWriter, TableReader};

use crate::cumulative::{derive_day, key_by_property};
use crate::error::{EngineError, Result};
use crate::watermark::Watermark;

/// Summary of one executed run, for logs and operator surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Segment processed.
    pub segment: Segment,
    /// Run date of the invocation.
    pub run_date: NaiveDate,
    /// Resolved incremental cutoff.
    pub cutoff: NaiveDate,
    /// Observations received in the snapshot.
    pub observations_total: usize,
    /// Observations past the watermark.
    pub observations_new: usize,
    /// Dimension version rows merged (closes plus inserts).
    pub dimension_rows: usize,
    /// Cumulative state rows merged.
    pub state_rows: usize,
    /// Dates actually processed, ascending.
    pub dates_processed: Vec<NaiveDate>,
}

/// A daily batch run over one segment's tables.
pub struct DailyRun {
    storage: Arc<dyn StorageBackend>,
    segment: Segment,
    tracker: VersionTracker,
    writer: MergeWriter,
}

impl std::fmt::Debug for DailyRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyRun")
            .field("segment", &self.segment)
            .finish_non_exhaustive()
    }
}

impl DailyRun {
    /// Creates a run over `segment` with the default tracked attributes.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, segment: Segment) -> Self {
        Self {
            tracker: VersionTracker::with_defaults(segment),
            writer: MergeWriter::new(Arc::clone(&storage)),
            storage,
            segment,
        }
    }

    /// Overrides the tracked-attribute configuration.
    #[must_use]
    pub fn with_dimension_config(mut self, config: DimensionConfig) -> Self {
        self.tracker = VersionTracker::new(config, self.segment);
        self
    }

    /// Executes the run.
    ///
    /// `snapshot` must be the complete feed for `run_date` (partial-day
    /// data must not be classified); on full refresh it may additionally
    /// carry older dates, which are processed in ascending order. `now` is
    /// the commit timestamp — the engine never reads the clock itself.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid snapshots, contradictory classifier
    /// input, dimension partition violations, or merge failures. A failed
    /// run leaves previously committed data untouched.
    pub async fn execute(
        &self,
        snapshot: Vec<ListingObservation>,
        run_date: NaiveDate,
        full_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let span = run_span(self.segment, run_date);
        self.execute_inner(snapshot, run_date, full_refresh, now)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        snapshot: Vec<ListingObservation>,
        run_date: NaiveDate,
        full_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        if let Some(future) = snapshot.iter().find(|o| o.load_date > run_date) {
            return Err(EngineError::invalid_snapshot(format!(
                "observation for {} dated {} is past the run date {run_date}",
                future.property_id, future.load_date
            )));
        }

        let cumulative_table = self.segment.cumulative_table();
        let dimension_table = self.segment.dimension_table();
        let cum_reader = TableReader::new(Arc::clone(&self.storage), cumulative_table);
        let dim_reader = TableReader::new(Arc::clone(&self.storage), dimension_table);

        // Resolved once; held fixed for the whole run.
        let prior_max = cum_reader.max_date().await?;
        let watermark = Watermark::resolve(prior_max, full_refresh);
        info!(cutoff = %watermark.cutoff(), full_refresh, "watermark resolved");

        let observations_total = snapshot.len();
        let mut by_date: BTreeMap<NaiveDate, Vec<ListingObservation>> = BTreeMap::new();
        let mut observations_new = 0;
        for obs in snapshot {
            if watermark.is_new(obs.load_date) {
                observations_new += 1;
                by_date.entry(obs.load_date).or_default().push(obs);
            }
        }

        // An empty feed day is still a run day: known entities must be
        // carried forward to keep the continuity invariant.
        if watermark.is_new(run_date) {
            by_date.entry(run_date).or_default();
        }

        let mut summary = RunSummary {
            segment: self.segment,
            run_date,
            cutoff: watermark.cutoff(),
            observations_total,
            observations_new,
            dimension_rows: 0,
            state_rows: 0,
            dates_processed: Vec::new(),
        };

        for (date, day_observations) in by_date {
            let keyed = key_by_property(day_observations);

            // Dimension pass commits first: the cumulative pass and its
            // consumers read current-version lookups against it.
            let mut dim_batch =
                MergeBatch::new(dimension_table, format!("{dimension_table}/{date}"));
            for (property_id, obs) in &keyed {
                let prior = current_version(&dim_reader, property_id).await?;
                let delta = self
                    .tracker
                    .advance(prior.as_ref(), std::slice::from_ref(obs))?;
                for row in delta.rows() {
                    dim_batch.push(row.merge_key(), row)?;
                }
            }
            if !dim_batch.is_empty() {
                let outcome = self.writer.apply(&dim_batch, now).await?;
                summary.dimension_rows += outcome.rows_merged;
            }

            let previous = match cum_reader.max_date_before(date).await? {
                Some(prev_date) => cum_reader.rows_at_date(prev_date).await?,
                None => BTreeMap::new(),
            };

            let records = derive_day(&previous, &keyed, date)?;
            if !records.is_empty() {
                let mut batch =
                    MergeBatch::new(cumulative_table, format!("{cumulative_table}/{date}"));
                for record in &records {
                    batch.push(record.merge_key(), record)?;
                }
                let outcome = self.writer.apply(&batch, now).await?;
                summary.state_rows += outcome.rows_merged;
            }

            summary.dates_processed.push(date);
            info!(%date, rows = records.len(), "run date classified");
        }

        Ok(summary)
    }
}

/// Finds an entity's current dimension version via a sorted key scan.
async fn current_version(
    reader: &TableReader,
    property_id: &str,
) -> Result<Option<DimensionVersion>> {
    let versions: Vec<(String, DimensionVersion)> =
        reader.scan_prefix(&format!("{property_id}/")).await?;
    Ok(versions.into_iter().map(|(_, v)| v).find(|v| v.is_current))
}
