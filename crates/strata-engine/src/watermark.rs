//! Watermark resolution: the boundary between already-processed and new
//! input.
//!
//! The cutoff is resolved exactly once per run from the target table's
//! committed maximum date and held fixed for the whole run. Components
//! receive it as a value and never re-query mid-run, so partially
//! committed rows from the same run can never move the boundary.

use chrono::NaiveDate;

/// Sentinel cutoff meaning "reprocess everything".
///
/// Substituted explicitly for an empty target table (first run) and for
/// full-refresh runs, so no code path compares against a missing value.
pub const BEGINNING_OF_TIME: NaiveDate = NaiveDate::MIN;

/// A resolved incremental cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    cutoff: NaiveDate,
}

impl Watermark {
    /// Resolves the cutoff for one run.
    ///
    /// On full refresh the cutoff is [`BEGINNING_OF_TIME`] regardless of
    /// prior output; otherwise it is the maximum date already committed,
    /// or the sentinel when the target table is empty.
    #[must_use]
    pub fn resolve(prior_output_max_date: Option<NaiveDate>, full_refresh: bool) -> Self {
        let cutoff = if full_refresh {
            BEGINNING_OF_TIME
        } else {
            prior_output_max_date.unwrap_or(BEGINNING_OF_TIME)
        };
        Self { cutoff }
    }

    /// The resolved cutoff date.
    #[must_use]
    pub const fn cutoff(self) -> NaiveDate {
        self.cutoff
    }

    /// Whether an observation dated `observed` is new for this run.
    ///
    /// Strictly-greater: an observation dated exactly at the cutoff has
    /// already been processed.
    #[must_use]
    pub fn is_new(self, observed: NaiveDate) -> bool {
        observed > self.cutoff
    }
}
