//! File system probing and observation primitives for the Kiln engine.
//!
//! This crate defines the [`FsProbe`] seam between the engine and the real
//! file system: a small capability set of read-only, idempotent operations,
//! with a production implementation ([`RealFs`]) and an in-memory test
//! implementation ([`MemFs`]). It also defines how tracked file reads are
//! pinned for later replay ([`Comparison`] and [`Observation`]).

#![warn(missing_docs)]

pub mod comparison;
pub mod hasher;
pub mod memory;
pub mod paths;
pub mod probe;

pub use comparison::{Comparison, Observation};
pub use memory::MemFs;
pub use paths::normalize;
pub use probe::{FileMeta, FsProbe, RealFs};
