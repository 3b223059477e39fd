//! Shared foundational types used across the Kiln build cache engine.
//!
//! This crate provides content fingerprinting and the canonical JSON value
//! encoding that gives build operations a stable identity.

#![warn(missing_docs)]

pub mod fingerprint;
pub mod value;

pub use fingerprint::Fingerprint;
pub use value::{canonical_bytes, digest_args};
