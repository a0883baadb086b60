//! # strata-core
//!
//! Core primitives for the Strata listing state engine:
//!
//! - **Surrogate Keys**: deterministic key derivation from natural-key tuples
//! - **Listing Model**: segments, daily observations, exact money amounts
//! - **States**: lifecycle/price enums and the cumulative state record
//! - **Storage**: object-store contract with CAS writes, plus memory and
//!   local-filesystem backends
//! - **Locks**: per-table writer locks over storage CAS
//! - **Error Types**: shared error definitions and result aliases
//!
//! ## Crate Boundary
//!
//! `strata-core` is the only crate allowed to define shared primitives.
//! Component crates (`strata-dimension`, `strata-engine`, `strata-merge`)
//! build on these contracts and never redefine them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod key;
pub mod listing;
pub mod lock;
pub mod money;
pub mod observability;
pub mod state;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::key::{KeyPart, SurrogateKey};
    pub use crate::listing::{ListingObservation, Segment};
    pub use crate::lock::{LockGuard, LockInfo, TableLock};
    pub use crate::money::Money;
    pub use crate::state::{CumulativeStateRecord, PriceState, PropertyState};
    pub use crate::storage::{
        LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use key::{KeyPart, SurrogateKey};
pub use listing::{ListingObservation, Segment};
pub use lock::{LockGuard, LockInfo, TableLock};
pub use money::Money;
pub use observability::{LogFormat, init_logging};
pub use state::{CumulativeStateRecord, PriceState, PropertyState};
pub use storage::{
    LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};
