//! File fingerprinting with a metadata-keyed cache.
//!
//! Hashing a large tree on every query would dominate build time, so the
//! probe remembers the fingerprint it computed for each path along with the
//! metadata observed at that moment. A later query re-hashes only when the
//! metadata no longer matches. The metadata match is a hint, not a proof:
//! the cache lives for a single build, and a fresh build always re-hashes,
//! so content changes that preserve size and mtime are caught between
//! builds.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kiln_common::Fingerprint;

use crate::probe::FileMeta;

/// A thread-safe fingerprint cache keyed by path and file metadata.
#[derive(Default)]
pub struct FingerprintCache {
    entries: Mutex<HashMap<PathBuf, (FileMeta, Fingerprint)>>,
}

impl FingerprintCache {
    /// Returns the fingerprint of the file at `path`.
    ///
    /// `meta` must be the file's current metadata; if it matches the cached
    /// entry the stored fingerprint is returned without reading the file.
    pub fn fingerprint(&self, path: &Path, meta: FileMeta) -> io::Result<Fingerprint> {
        {
            let entries = self.entries.lock().unwrap();
            if let Some((cached_meta, hash)) = entries.get(path) {
                if *cached_meta == meta {
                    return Ok(*hash);
                }
            }
        }

        let file = File::open(path)?;
        let hash = Fingerprint::from_reader(io::BufReader::new(file))?;

        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.to_path_buf(), (meta, hash));
        Ok(hash)
    }

    /// Forgets every cached fingerprint.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(len: u64, secs: i64) -> FileMeta {
        FileMeta {
            len,
            mtime_secs: secs,
            mtime_nanos: 0,
        }
    }

    #[test]
    fn computes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "hello").unwrap();

        let cache = FingerprintCache::default();
        let first = cache.fingerprint(&path, meta(5, 1)).unwrap();
        assert_eq!(first, Fingerprint::from_bytes(b"hello"));

        // Same metadata: served from cache even though the file changed.
        std::fs::write(&path, "BYE__").unwrap();
        let second = cache.fingerprint(&path, meta(5, 1)).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn metadata_change_rehashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "hello").unwrap();

        let cache = FingerprintCache::default();
        let first = cache.fingerprint(&path, meta(5, 1)).unwrap();

        std::fs::write(&path, "world").unwrap();
        let second = cache.fingerprint(&path, meta(5, 2)).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, Fingerprint::from_bytes(b"world"));
    }

    #[test]
    fn missing_file_errors() {
        let cache = FingerprintCache::default();
        assert!(cache
            .fingerprint(Path::new("/no/such/kiln/file"), meta(0, 0))
            .is_err());
    }
}
