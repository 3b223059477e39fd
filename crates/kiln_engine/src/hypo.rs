//! Hypothetical outputs during cache validation.
//!
//! Validating a cache entry replays its recorded probes without executing
//! anything. When the entry's tree contains file operations, probes that
//! come later in the replay must see the files those operations would have
//! created, or a parent that lists its own output directory could never
//! validate. `HypoFiles` is that what-if overlay: the files the
//! candidate tree would create so far, along with all of their implied
//! parent directories.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use kiln_fs::paths;

/// The set of files a candidate entry tree would have created so far
/// during a validation replay.
///
/// Building a file implies creating its parent directories, so parents are
/// tracked from the moment an operation starts; the file itself appears
/// when the operation finishes.
#[derive(Default)]
pub(crate) struct HypoFiles {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
    dir_children: HashMap<PathBuf, BTreeMap<String, ()>>,
}

impl HypoFiles {
    /// Marks a file operation as started: its parent directories now exist
    /// in the hypothetical view.
    pub fn started_building(&mut self, file: &Path) {
        let Some(first_parent) = paths::parent(file) else {
            return;
        };
        let mut dir = first_parent;
        while !self.dirs.contains(dir) {
            self.dirs.insert(dir.to_path_buf());
            self.add_child(dir);
            match paths::parent(dir) {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    /// Marks a file operation as finished: the file itself now exists.
    pub fn finished_building(&mut self, file: &Path) {
        self.files.insert(file.to_path_buf());
        self.add_child(file);
    }

    /// Returns whether the hypothetical view contains a regular file here.
    pub fn has_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Returns whether the hypothetical view contains a directory here.
    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    /// Returns the hypothetical children of a directory, sorted by name.
    pub fn children(&self, dir: &Path) -> Vec<String> {
        match self.dir_children.get(dir) {
            Some(children) => children.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn add_child(&mut self, path: &Path) {
        let (Some(dir), Some(name)) = (paths::parent(path), path.file_name()) else {
            return;
        };
        self.dir_children
            .entry(dir.to_path_buf())
            .or_default()
            .entry(name.to_string_lossy().into_owned())
            .or_insert(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_implies_parent_dirs() {
        let mut hypo = HypoFiles::default();
        hypo.started_building(Path::new("/out/sub/a.txt"));
        assert!(hypo.has_dir(Path::new("/out")));
        assert!(hypo.has_dir(Path::new("/out/sub")));
        assert!(!hypo.has_file(Path::new("/out/sub/a.txt")));
    }

    #[test]
    fn finished_adds_the_file() {
        let mut hypo = HypoFiles::default();
        hypo.started_building(Path::new("/out/a.txt"));
        hypo.finished_building(Path::new("/out/a.txt"));
        assert!(hypo.has_file(Path::new("/out/a.txt")));
        assert_eq!(hypo.children(Path::new("/out")), vec!["a.txt"]);
    }

    #[test]
    fn children_sorted_and_deduplicated() {
        let mut hypo = HypoFiles::default();
        hypo.started_building(Path::new("/out/z.txt"));
        hypo.finished_building(Path::new("/out/z.txt"));
        hypo.started_building(Path::new("/out/a/deep.txt"));
        assert_eq!(hypo.children(Path::new("/out")), vec!["a", "z.txt"]);
    }
}
