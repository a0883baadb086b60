//! Observability infrastructure: structured logging with consistent spans.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::listing::Segment;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops. Log levels come from `RUST_LOG`
/// (e.g. `info`, `strata_merge=debug`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one daily run of a segment.
#[must_use]
pub fn run_span(segment: Segment, run_date: chrono::NaiveDate) -> Span {
    tracing::info_span!(
        "daily_run",
        segment = %segment,
        run_date = %run_date,
    )
}

/// Creates a span for a merge commit against one table.
#[must_use]
pub fn merge_span(table: &str, batch_key: &str) -> Span {
    tracing::info_span!(
        "merge",
        table = table,
        batch = batch_key,
    )
}
