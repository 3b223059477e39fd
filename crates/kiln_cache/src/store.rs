//! Loading and committing snapshots across builds.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::snapshot::Snapshot;

/// Persistent storage for build snapshots.
///
/// The store is read-only during a build: `load` runs before any work,
/// `commit` replaces the snapshot atomically at the very end, and `discard`
/// abandons the session. `begin` allocates the session staging area used by
/// the rollback journal.
pub trait CacheStore: Send + Sync {
    /// The path of the snapshot file.
    fn cache_path(&self) -> &Path;

    /// The path of the session staging area, whether or not it exists.
    fn staging_path(&self) -> &Path;

    /// Loads the previous snapshot, or `None` if there is none.
    ///
    /// Corrupt or version-incompatible snapshots load as `None` (full
    /// rebuild) rather than failing. A cache path that is an existing
    /// directory is an error: the store could never commit to it.
    fn load(&self) -> Result<Option<Snapshot>, CacheError>;

    /// Creates the staging area for a new session and returns its path.
    fn begin(&self) -> Result<PathBuf, CacheError>;

    /// Atomically replaces the snapshot with `snapshot` and removes the
    /// staging area. A crash before the final rename leaves the previous
    /// snapshot fully intact; a partially written snapshot is never visible
    /// at the cache path.
    fn commit(&self, snapshot: &Snapshot) -> Result<(), CacheError>;

    /// Abandons the session, removing the staging area. The previous
    /// snapshot is left untouched.
    fn discard(&self) -> Result<(), CacheError>;
}

/// The production store: one snapshot file plus a sibling staging directory.
pub struct FileStore {
    cache_path: PathBuf,
    staging_path: PathBuf,
}

impl FileStore {
    /// Creates a store for the snapshot at `cache_path`.
    ///
    /// The staging area lives at `<cache_path>.staging` alongside it.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        let mut staging_name = cache_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        staging_name.push(".staging");
        let staging_path = cache_path.with_file_name(staging_name);
        Self {
            cache_path,
            staging_path,
        }
    }
}

impl CacheStore for FileStore {
    fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    fn load(&self) -> Result<Option<Snapshot>, CacheError> {
        if self.cache_path.is_dir() {
            return Err(CacheError::IsADirectory {
                path: self.cache_path.clone(),
            });
        }
        let data = match fs::read(&self.cache_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&self.cache_path, e)),
        };
        Ok(Snapshot::from_gz_bytes(&data, &self.cache_path))
    }

    fn begin(&self) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.staging_path)
            .map_err(|e| CacheError::io(&self.staging_path, e))?;
        Ok(self.staging_path.clone())
    }

    fn commit(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let bytes = snapshot.to_gz_bytes()?;

        let mut tmp_name = self
            .cache_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.cache_path.with_file_name(tmp_name);

        fs::write(&tmp_path, &bytes).map_err(|e| CacheError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.cache_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::io(&self.cache_path, e)
        })?;

        self.discard()
    }

    fn discard(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.staging_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.staging_path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store_in(dir: &Path) -> FileStore {
        FileStore::new(dir.join("kiln.cache"))
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn commit_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin().unwrap();

        let snap = Snapshot::empty("demo", BTreeMap::from([("f".to_string(), 2)]));
        store.commit(&snap).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.build_name, "demo");
        assert_eq!(loaded.func_version("f"), Some(2));
    }

    #[test]
    fn commit_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let staging = store.begin().unwrap();
        assert!(staging.is_dir());

        store.commit(&Snapshot::empty("demo", BTreeMap::new())).unwrap();
        assert!(!staging.exists());
    }

    #[test]
    fn discard_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin().unwrap();
        store.commit(&Snapshot::empty("demo", BTreeMap::new())).unwrap();

        store.begin().unwrap();
        store.discard().unwrap();
        assert!(store.load().unwrap().is_some());
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn corrupt_snapshot_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.cache_path(), b"definitely not a snapshot").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn directory_at_cache_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::create_dir(store.cache_path()).unwrap();
        assert!(matches!(
            store.load(),
            Err(CacheError::IsADirectory { .. })
        ));
    }

    #[test]
    fn staging_path_is_sibling() {
        let store = FileStore::new("/tmp/builds/kiln.cache");
        assert_eq!(
            store.staging_path(),
            Path::new("/tmp/builds/kiln.cache.staging")
        );
    }

    #[test]
    fn no_temp_file_left_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.begin().unwrap();
        store.commit(&Snapshot::empty("demo", BTreeMap::new())).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["kiln.cache"]);
    }
}
