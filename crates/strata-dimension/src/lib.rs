//! SCD2 version tracking for the Strata property dimension.
//!
//! Given an entity's attribute history ordered by observation date, this
//! crate computes validity intervals and marks exactly one current
//! version. Version boundaries are emitted when a tracked attribute
//! changes; `valid_from` is the date the change was *observed*, not the
//! date it is processed. The tracker is incremental: each run carries only
//! the persisted current version per entity, never the full history.
//!
//! The partition invariant — no gaps, no overlaps, exactly one current
//! version — is validated before anything is handed to the merge writer;
//! a violation halts the run.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod tracker;
pub mod types;

pub use config::{DimensionConfig, TrackedField};
pub use error::{DimensionError, Result};
pub use tracker::{VersionDelta, VersionTracker, validate_partition};
pub use types::DimensionVersion;
