//! An in-memory file system probe for tests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kiln_common::Fingerprint;

use crate::probe::{FileMeta, FsProbe};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, mtime_secs: i64 },
    Dir,
    Symlink(String),
}

/// An in-memory [`FsProbe`] implementation.
///
/// Holds a flat map from normalized absolute paths to nodes. Parent
/// directories are created implicitly when a file is added. Symlinks are
/// resolved one level for existence and content queries, which is enough
/// for testing link observation; nested link chains are not followed.
#[derive(Default)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl MemFs {
    /// Creates an empty in-memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regular file, creating parent directories implicitly.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut nodes = self.nodes.lock().unwrap();
        Self::add_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                data: data.into(),
                mtime_secs: 0,
            },
        );
    }

    /// Adds an empty directory, creating parents implicitly.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut nodes = self.nodes.lock().unwrap();
        Self::add_parents(&mut nodes, &path);
        nodes.insert(path, Node::Dir);
    }

    /// Adds a symbolic link with the given target string.
    pub fn add_symlink(&self, path: impl Into<PathBuf>, target: impl Into<String>) {
        let path = path.into();
        let mut nodes = self.nodes.lock().unwrap();
        Self::add_parents(&mut nodes, &path);
        nodes.insert(path, Node::Symlink(target.into()));
    }

    /// Removes a file or directory, if present.
    pub fn remove(&self, path: &Path) {
        self.nodes.lock().unwrap().remove(path);
    }

    /// Overwrites a file's contents, bumping its modification time.
    pub fn touch(&self, path: &Path, data: impl Into<Vec<u8>>) {
        let mut nodes = self.nodes.lock().unwrap();
        let next_mtime = match nodes.get(path) {
            Some(Node::File { mtime_secs, .. }) => mtime_secs + 1,
            _ => 0,
        };
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: data.into(),
                mtime_secs: next_mtime,
            },
        );
    }

    fn add_parents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() || nodes.contains_key(dir) {
                break;
            }
            nodes.insert(dir.to_path_buf(), Node::Dir);
            parent = dir.parent();
        }
    }

    fn resolve(&self, path: &Path) -> Option<Node> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path)? {
            Node::Symlink(target) => nodes.get(Path::new(target.as_str())).cloned(),
            node => Some(node.clone()),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

impl FsProbe for MemFs {
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.resolve(path), Some(Node::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.resolve(path), Some(Node::Dir))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(path),
            Some(Node::Symlink(_))
        )
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        if !self.is_dir(path) {
            return Err(not_found(path));
        }
        let nodes = self.nodes.lock().unwrap();
        let mut names = Vec::new();
        for child in nodes.keys() {
            if child.parent() == Some(path) {
                if let Some(name) = child.file_name() {
                    names.push(name.to_string_lossy().into_owned());
                }
            }
        }
        Ok(names)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.resolve(path) {
            Some(Node::File { data, .. }) => Ok(data),
            _ => Err(not_found(path)),
        }
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        match self.resolve(path) {
            Some(Node::File { data, mtime_secs }) => Ok(FileMeta {
                len: data.len() as u64,
                mtime_secs,
                mtime_nanos: 0,
            }),
            _ => Err(not_found(path)),
        }
    }

    fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint> {
        match self.resolve(path) {
            Some(Node::File { data, .. }) => Ok(Fingerprint::from_bytes(&data)),
            _ => Err(not_found(path)),
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<String> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            _ => Err(not_found(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_imply_parent_dirs() {
        let fs = MemFs::new();
        fs.add_file("/a/b/c.txt", "data");
        assert!(fs.is_dir(Path::new("/a")));
        assert!(fs.is_dir(Path::new("/a/b")));
        assert!(fs.is_file(Path::new("/a/b/c.txt")));
    }

    #[test]
    fn list_dir_is_sorted() {
        let fs = MemFs::new();
        fs.add_file("/d/z.txt", "");
        fs.add_file("/d/a.txt", "");
        fs.add_dir("/d/m");
        assert_eq!(fs.list_dir(Path::new("/d")).unwrap(), vec!["a.txt", "m", "z.txt"]);
    }

    #[test]
    fn touch_bumps_mtime() {
        let fs = MemFs::new();
        fs.add_file("/f", "one");
        let before = fs.metadata(Path::new("/f")).unwrap();
        fs.touch(Path::new("/f"), "two");
        let after = fs.metadata(Path::new("/f")).unwrap();
        assert!(after.mtime_secs > before.mtime_secs);
    }

    #[test]
    fn symlink_resolution() {
        let fs = MemFs::new();
        fs.add_file("/target.txt", "content");
        fs.add_symlink("/link", "/target.txt");
        assert!(fs.is_file(Path::new("/link")));
        assert!(fs.is_symlink(Path::new("/link")));
        assert_eq!(fs.read(Path::new("/link")).unwrap(), b"content");
        assert_eq!(fs.read_link(Path::new("/link")).unwrap(), "/target.txt");
    }

    #[test]
    fn missing_paths_error() {
        let fs = MemFs::new();
        assert!(!fs.exists(Path::new("/nope")));
        assert!(fs.read(Path::new("/nope")).is_err());
        assert!(fs.list_dir(Path::new("/nope")).is_err());
    }
}
