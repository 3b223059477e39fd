//! The file system probe seam.

use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use kiln_common::Fingerprint;

use crate::hasher::FingerprintCache;

/// Metadata about a regular file, as observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// File length in bytes.
    pub len: u64,
    /// Modification time, seconds since the epoch (may be negative).
    pub mtime_secs: i64,
    /// Sub-second part of the modification time.
    pub mtime_nanos: u32,
}

/// Read-only, idempotent access to a file system.
///
/// The engine performs every raw read through this trait so that the file
/// system can be swapped out: [`RealFs`] in production, [`MemFs`] in tests.
/// Existence checks follow symlinks; [`FsProbe::read_link`] and
/// [`FsProbe::is_symlink`] inspect the link itself.
///
/// [`MemFs`]: crate::memory::MemFs
pub trait FsProbe: Send + Sync {
    /// Returns whether the path refers to an existing file or directory.
    fn exists(&self, path: &Path) -> bool;

    /// Returns whether the path refers to an existing regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Returns whether the path refers to an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns whether the path itself is a symbolic link.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Returns the names of the direct children of a directory, sorted.
    ///
    /// Names are final path components only, without `.` or `..` entries.
    /// The sort order is fixed (lexicographic by name) so that listings are
    /// deterministic regardless of what order the OS reports entries in.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Reads the entire contents of a regular file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Returns size and modification time for a regular file.
    fn metadata(&self, path: &Path) -> io::Result<FileMeta>;

    /// Returns a content fingerprint for a regular file.
    fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint>;

    /// Reads the target of a symbolic link, as a string.
    fn read_link(&self, path: &Path) -> io::Result<String>;

    /// Drops any memoized per-build state, such as fingerprint hints.
    ///
    /// Called at the start of each build. The metadata-keyed fingerprint
    /// cache is sound only within one build; across builds a file may
    /// change content while keeping its size and mtime, and a fresh build
    /// must notice.
    fn invalidate_cache(&self) {}
}

/// The production probe backed by `std::fs`.
///
/// Carries a per-instance fingerprint cache keyed by (length, mtime), so a
/// file is hashed at most once per build unless it changes. The metadata key
/// is a hint only: a cache entry is discarded whenever the metadata differs,
/// and content equality is always decided by the hash itself.
#[derive(Default)]
pub struct RealFs {
    cache: FingerprintCache,
}

impl RealFs {
    /// Creates a probe with an empty fingerprint cache.
    pub fn new() -> Self {
        Self::default()
    }
}

fn meta_from_std(meta: &fs::Metadata) -> FileMeta {
    let (mtime_secs, mtime_nanos) = match meta.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                (-(d.as_secs() as i64), d.subsec_nanos())
            }
        },
        Err(_) => (0, 0),
    };
    FileMeta {
        len: meta.len(),
        mtime_secs,
        mtime_nanos,
    }
}

impl FsProbe for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = fs::metadata(path)?;
        Ok(meta_from_std(&meta))
    }

    fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint> {
        let meta = self.metadata(path)?;
        self.cache.fingerprint(path, meta)
    }

    fn read_link(&self, path: &Path) -> io::Result<String> {
        let target = fs::read_link(path)?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_fs_basic_queries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "content").unwrap();

        let fs = RealFs::new();
        assert!(fs.exists(dir.path()));
        assert!(fs.is_dir(dir.path()));
        assert!(!fs.is_file(dir.path()));
        assert!(fs.is_file(&file));
        assert!(!fs.is_dir(&file));
        assert!(!fs.exists(&dir.path().join("missing")));
    }

    #[test]
    fn list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let fs = RealFs::new();
        let names = fs.list_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
    }

    #[test]
    fn list_dir_missing_errors() {
        let fs = RealFs::new();
        assert!(fs.list_dir(Path::new("/nonexistent/dir/for/kiln")).is_err());
    }

    #[test]
    fn metadata_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "12345678").unwrap();

        let fs = RealFs::new();
        let meta = fs.metadata(&file).unwrap();
        assert_eq!(meta.len, 8);
    }

    #[test]
    fn fingerprint_matches_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "fingerprint me").unwrap();

        let fs = RealFs::new();
        let h = fs.fingerprint(&file).unwrap();
        assert_eq!(h, Fingerprint::from_bytes(b"fingerprint me"));
    }

    #[cfg(unix)]
    #[test]
    fn read_link_reports_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link");
        std::fs::write(&target, "t").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs = RealFs::new();
        assert!(fs.is_symlink(&link));
        assert!(!fs.is_symlink(&target));
        assert_eq!(fs.read_link(&link).unwrap(), target.display().to_string());
    }
}
