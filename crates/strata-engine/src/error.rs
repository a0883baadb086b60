//! Error types for `strata-engine`.

use chrono::NaiveDate;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The classifier was invoked with neither a previous record nor a
    /// current observation. This is an upstream join defect, never a data
    /// condition, and is surfaced rather than defaulted.
    #[error("contradictory classifier input for {property_id} on {date}: both previous and current absent")]
    ContradictoryInput {
        /// Entity that triggered the condition.
        property_id: String,
        /// Run date being classified.
        date: NaiveDate,
    },

    /// The snapshot handed to a run is not usable as a complete day's data.
    #[error("invalid snapshot: {detail}")]
    InvalidSnapshot {
        /// What made the snapshot invalid.
        detail: String,
    },

    /// Dimension tracking failed (partition violation, out-of-order input).
    #[error(transparent)]
    Dimension(#[from] strata_dimension::DimensionError),

    /// The merge writer rejected or failed a batch.
    #[error(transparent)]
    Merge(#[from] strata_merge::MergeError),
}

impl EngineError {
    /// Creates an invalid snapshot error.
    #[must_use]
    pub fn invalid_snapshot(detail: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            detail: detail.into(),
        }
    }
}
