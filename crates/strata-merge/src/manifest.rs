//! Table manifests: the atomic visibility gate for merge commits.
//!
//! Every output table is described by one manifest object mapping each
//! merge key to the immutable row object currently holding its value.
//! Readers resolve rows only through the manifest, so a batch becomes
//! visible in its entirety when the manifest CAS succeeds and never
//! before. A crashed commit leaves only unreferenced row objects; the
//! pre-run table state stays intact.
//!
//! # Storage Layout
//!
//! ```text
//! tables/{table}/manifest.json     # merge-key -> row pointer map (CAS)
//! tables/{table}/rows/{ulid}.json  # immutable row objects
//! locks/{table}.lock.json          # single-writer lock
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pointer from a merge key to the row object holding its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPointer {
    /// Path of the immutable row object.
    pub path: String,
    /// Canonical hash of the row payload, used for replay detection.
    pub row_hash: String,
}

/// Manifest describing the committed state of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableManifest {
    /// Monotonic commit version (starts at 0 for an empty table).
    pub version: u64,

    /// Current row pointer per merge key, sorted by key.
    pub rows: BTreeMap<String, RowPointer>,

    /// Fingerprint of the last applied batch per batch key.
    ///
    /// An identical resubmission is detected here and replayed as a no-op.
    pub applied_batches: BTreeMap<String, String>,

    /// Last commit timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TableManifest {
    /// Creates an empty manifest dated `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: 0,
            rows: BTreeMap::new(),
            applied_batches: BTreeMap::new(),
            updated_at: now,
        }
    }

    /// Returns the next commit version.
    #[must_use]
    pub const fn next_version(&self) -> u64 {
        self.version + 1
    }
}

/// Path helpers for the table storage layout.
pub mod paths {
    /// Manifest object for a table.
    #[must_use]
    pub fn manifest(table: &str) -> String {
        format!("tables/{table}/manifest.json")
    }

    /// A fresh, uniquely named row object for a table.
    #[must_use]
    pub fn row_object(table: &str, id: &ulid::Ulid) -> String {
        format!("tables/{table}/rows/{id}.json")
    }

    /// Writer lock object for a table.
    #[must_use]
    pub fn lock(table: &str) -> String {
        format!("locks/{table}.lock.json")
    }
}
