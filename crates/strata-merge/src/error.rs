//! Error types for `strata-merge`.

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Merge-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A record in the batch failed validation; the whole batch is rejected.
    #[error("batch rejected for {table}: {detail}")]
    Validation {
        /// The target table.
        table: String,
        /// What failed validation.
        detail: String,
    },

    /// A concurrent writer holds the table, or CAS retries were exhausted.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable conflict details.
        message: String,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] strata_core::Error),

    /// Failed to serialize/deserialize table state.
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable serialization details.
        message: String,
    },
}

impl MergeError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub(crate) fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
