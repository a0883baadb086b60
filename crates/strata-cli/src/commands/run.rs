//! `strata run` - execute a daily run for one segment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;

use strata_core::storage::{LocalFsBackend, StorageBackend};
use strata_core::{ListingObservation, Segment};
use strata_engine::DailyRun;

use crate::Config;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Segment to process (rent or sale).
    #[arg(long)]
    pub segment: String,

    /// Run date (YYYY-MM-DD). The snapshot must be complete for this date.
    #[arg(long)]
    pub run_date: NaiveDate,

    /// Snapshot file: a JSON array of staged feed rows.
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Reprocess all history instead of only new observations.
    #[arg(long)]
    pub full_refresh: bool,
}

/// Executes the run command.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be read or the run fails.
pub async fn execute(args: RunArgs, config: &Config) -> Result<()> {
    let segment: Segment = args
        .segment
        .parse()
        .with_context(|| format!("invalid segment '{}'", args.segment))?;

    let raw = std::fs::read(&args.snapshot)
        .with_context(|| format!("read snapshot {}", args.snapshot.display()))?;
    let snapshot: Vec<ListingObservation> = serde_json::from_slice(&raw)
        .with_context(|| format!("parse snapshot {}", args.snapshot.display()))?;

    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalFsBackend::new(&config.data_root)
            .with_context(|| format!("open storage root {}", config.data_root.display()))?,
    );

    let run = DailyRun::new(storage, segment);
    let summary = run
        .execute(snapshot, args.run_date, args.full_refresh, Utc::now())
        .await
        .with_context(|| format!("run {segment} for {}", args.run_date))?;

    println!("Run complete: {segment} {}", summary.run_date);
    let cutoff = if summary.cutoff == strata_engine::BEGINNING_OF_TIME {
        "(beginning of time)".to_string()
    } else {
        summary.cutoff.to_string()
    };
    println!("  cutoff:            {cutoff}");
    println!(
        "  observations:      {} total, {} new",
        summary.observations_total, summary.observations_new
    );
    println!("  dimension rows:    {}", summary.dimension_rows);
    println!("  state rows:        {}", summary.state_rows);
    if summary.dates_processed.is_empty() {
        println!("  nothing past the watermark; no dates processed");
    } else {
        let dates: Vec<String> = summary
            .dates_processed
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("  dates processed:   {}", dates.join(", "));
    }

    Ok(())
}
