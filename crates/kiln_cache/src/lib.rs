//! Persistent cache state for the Kiln build engine.
//!
//! This crate defines the serialized record of a completed build (the
//! operations that ran, the file system facts they observed, and the values
//! they produced) along with the store that loads and atomically commits
//! that record across builds. All reads are fail-safe: corruption or version
//! mismatches result in an empty cache rather than an error.

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod snapshot;
pub mod store;

pub use entry::{CacheEntry, FactErrorKind, FileFact, FileOutput, OpId, OpKind, Step, SubKey};
pub use error::CacheError;
pub use snapshot::{Snapshot, SnapshotIndex};
pub use store::{CacheStore, FileStore};
