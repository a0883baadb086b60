//! Incremental classification engine for Strata.
//!
//! This crate wires the core contract together for one segment's daily
//! run: resolve the watermark once, filter the snapshot to new
//! observations, advance the property dimension, then classify each
//! entity's day-over-day lifecycle and price movement from exactly
//! "yesterday's derived state" plus "today's snapshot" — no full-history
//! rescans.
//!
//! All components take their dates as explicit parameters; nothing in
//! this crate reads wall-clock time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod classifier;
pub mod cumulative;
pub mod error;
pub mod run;
pub mod watermark;

pub use classifier::classify;
pub use cumulative::{derive_day, key_by_property};
pub use error::{EngineError, Result};
pub use run::{DailyRun, RunSummary};
pub use watermark::{BEGINNING_OF_TIME, Watermark};
