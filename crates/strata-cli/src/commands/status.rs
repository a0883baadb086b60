//! `strata status` - inspect table watermarks and row counts.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;

use strata_core::Segment;
use strata_core::storage::{LocalFsBackend, StorageBackend};
use strata_merge::TableReader;

use crate::Config;

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Limit to one segment (rent or sale). Defaults to both.
    #[arg(long)]
    pub segment: Option<String>,
}

/// Executes the status command.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or a manifest is corrupt.
pub async fn execute(args: &StatusArgs, config: &Config) -> Result<()> {
    let segments: Vec<Segment> = match &args.segment {
        Some(s) => vec![s.parse().with_context(|| format!("invalid segment '{s}'"))?],
        None => vec![Segment::Rent, Segment::Sale],
    };

    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalFsBackend::new(&config.data_root)
            .with_context(|| format!("open storage root {}", config.data_root.display()))?,
    );

    for segment in segments {
        for table in [segment.cumulative_table(), segment.dimension_table()] {
            let reader = TableReader::new(Arc::clone(&storage), table);
            match reader.stats().await? {
                Some(stats) => {
                    let watermark = stats
                        .max_date
                        .map_or_else(|| "-".to_string(), |d| d.to_string());
                    println!(
                        "{table}: version {} | {} rows | watermark {watermark}",
                        stats.version, stats.rows
                    );
                }
                None => println!("{table}: empty"),
            }
        }
    }

    Ok(())
}
