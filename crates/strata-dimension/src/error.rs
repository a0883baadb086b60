//! Error types for `strata-dimension`.

/// Result type for dimension operations.
pub type Result<T> = std::result::Result<T, DimensionError>;

/// Dimension-specific errors.
///
/// Partition violations are never locally patched: they abort the run
/// before anything is committed.
#[derive(Debug, thiserror::Error)]
pub enum DimensionError {
    /// The version chain for an entity violates the partition invariant
    /// (overlap, gap, or not exactly one current version).
    #[error("dimension partition violated for {property_id}: {detail}")]
    PartitionViolation {
        /// Entity whose version chain is invalid.
        property_id: String,
        /// What was violated.
        detail: String,
    },

    /// An observation predates the entity's current version.
    ///
    /// Versions are dated by observation time; history earlier than the
    /// recorded current version cannot be reconstructed from last-known
    /// state and requires a dimension rebuild.
    #[error(
        "out-of-order observation for {property_id}: observed {observed} before current version of {current_valid_from}"
    )]
    OutOfOrderObservation {
        /// Entity the observation belongs to.
        property_id: String,
        /// The observation's date.
        observed: chrono::NaiveDate,
        /// The current version's `valid_from`.
        current_valid_from: chrono::NaiveDate,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] strata_core::Error),
}

impl DimensionError {
    /// Creates a partition violation error.
    #[must_use]
    pub fn partition(property_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PartitionViolation {
            property_id: property_id.into(),
            detail: detail.into(),
        }
    }
}
