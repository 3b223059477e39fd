//! File comparison methods and their recorded observations.

use serde::{Deserialize, Serialize};

use kiln_common::Fingerprint;

use crate::probe::{FileMeta, FsProbe};
use std::path::Path;

/// A method for comparing a file at two points in time.
///
/// The engine uses a comparison to decide whether a tracked input or output
/// file has changed since the last build, in which case the cache entries
/// that observed it are invalid.
///
/// The comparison contract is pure, total, and symmetric: observing the same
/// file twice yields values that compare equal if and only if the recorded
/// observations are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    /// Compare by metadata: size in bytes and modification time.
    ///
    /// Recommended for most use cases. It can misjudge in either direction
    /// (a rewritten file with identical metadata, or a touched file with
    /// identical content), but it is fast and normally accurate.
    Metadata,

    /// Compare by a fingerprint of the file's contents.
    ///
    /// Exact, but requires reading the entire file.
    Hash,
}

/// The recorded result of observing a file under a [`Comparison`].
///
/// Equality of observations is the comparison: a file is unchanged exactly
/// when a fresh observation equals the recorded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// A metadata observation: length plus modification time.
    Metadata {
        /// File length in bytes.
        len: u64,
        /// Modification time, seconds since the epoch.
        mtime_secs: i64,
        /// Sub-second part of the modification time.
        mtime_nanos: u32,
    },

    /// A content fingerprint observation.
    Hash(Fingerprint),
}

impl Observation {
    /// Builds a metadata observation from probed file metadata.
    pub fn from_meta(meta: &FileMeta) -> Self {
        Observation::Metadata {
            len: meta.len,
            mtime_secs: meta.mtime_secs,
            mtime_nanos: meta.mtime_nanos,
        }
    }

    /// Observes a regular file through a probe using the given comparison.
    ///
    /// The caller is responsible for ensuring the path refers to a regular
    /// file; errors from the underlying probe are returned as-is.
    pub fn capture(
        probe: &dyn FsProbe,
        path: &Path,
        comparison: Comparison,
    ) -> std::io::Result<Self> {
        match comparison {
            Comparison::Metadata => Ok(Observation::from_meta(&probe.metadata(path)?)),
            Comparison::Hash => Ok(Observation::Hash(probe.fingerprint(path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RealFs;

    #[test]
    fn metadata_observation_from_meta() {
        let meta = FileMeta {
            len: 10,
            mtime_secs: 100,
            mtime_nanos: 5,
        };
        let obs = Observation::from_meta(&meta);
        assert_eq!(
            obs,
            Observation::Metadata {
                len: 10,
                mtime_secs: 100,
                mtime_nanos: 5
            }
        );
    }

    #[test]
    fn capture_hash_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "same").unwrap();
        std::fs::write(&b, "same").unwrap();

        let fs = RealFs::new();
        let oa = Observation::capture(&fs, &a, Comparison::Hash).unwrap();
        let ob = Observation::capture(&fs, &b, Comparison::Hash).unwrap();
        assert_eq!(oa, ob);
    }

    #[test]
    fn capture_metadata_tracks_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "12345").unwrap();

        let fs = RealFs::new();
        match Observation::capture(&fs, &path, Comparison::Metadata).unwrap() {
            Observation::Metadata { len, .. } => assert_eq!(len, 5),
            other => panic!("expected metadata observation, got {other:?}"),
        }
    }

    #[test]
    fn serde_roundtrip() {
        let obs = Observation::Hash(Fingerprint::from_bytes(b"x"));
        let json = serde_json::to_string(&obs).unwrap();
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(obs, back);
    }
}
