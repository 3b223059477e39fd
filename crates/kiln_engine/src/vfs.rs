//! The virtualized file system view.
//!
//! Build functions never see the raw disk. The view they query is the real
//! file system, minus the previous build's outputs that have not yet been
//! proven to survive (deferred deletion), minus files being produced right
//! now, plus outputs committed earlier in this session. The cache file and
//! the staging area are never visible. All queries consult the session
//! overlay under the session lock and perform probe I/O outside it.

use std::path::Path;

use kiln_cache::FactErrorKind;
use kiln_fs::{Comparison, Observation};

use crate::hypo::HypoFiles;
use crate::session::{FileState, Session};

/// A failed virtual file system query: the replayable kind plus a message
/// for the error surfaced to the caller.
#[derive(Debug)]
pub(crate) struct FactFailure {
    pub kind: FactErrorKind,
    pub message: String,
}

impl FactFailure {
    fn not_found(path: &Path) -> Self {
        Self {
            kind: FactErrorKind::NotFound,
            message: format!("the requested file does not exist: {}", path.display()),
        }
    }

    fn is_a_directory(path: &Path) -> Self {
        Self {
            kind: FactErrorKind::IsADirectory,
            message: format!("cannot read a directory: {}", path.display()),
        }
    }

    fn not_a_directory(path: &Path) -> Self {
        Self {
            kind: FactErrorKind::NotADirectory,
            message: format!("{} is not a directory", path.display()),
        }
    }

    fn io(path: &Path, e: &std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path)
        } else {
            Self {
                kind: FactErrorKind::Io,
                message: format!("{}: {}", path.display(), e),
            }
        }
    }
}

pub(crate) type FactResult<T> = Result<T, FactFailure>;

impl Session {
    /// Whether `path` is a regular file in the virtual view.
    pub fn virt_is_file(&self, path: &Path, hypo: Option<&HypoFiles>) -> bool {
        if let Some(h) = hypo {
            if h.has_file(path) {
                return true;
            }
            if h.has_dir(path) {
                return false;
            }
        }
        if self.is_reserved_path(path) {
            return false;
        }
        {
            let st = self.state.lock().unwrap();
            match st.files.get(path) {
                Some(claim) if claim.state == FileState::Pending => return false,
                Some(_) => {}
                None => {
                    if self.old_outputs.contains(path) {
                        // A previous-build output not yet proven to
                        // survive: deferred deletion hides it.
                        return false;
                    }
                }
            }
        }
        self.probe.is_file(path)
    }

    /// Whether `path` is a directory in the virtual view.
    pub fn virt_is_dir(&self, path: &Path, hypo: Option<&HypoFiles>) -> bool {
        if let Some(h) = hypo {
            if h.has_dir(path) {
                return true;
            }
            if h.has_file(path) {
                return false;
            }
        }
        if self.is_reserved_path(path) {
            return false;
        }
        if self.is_prior_removed_dir(path) {
            return false;
        }
        self.probe.is_dir(path)
    }

    /// Whether `path` exists at all in the virtual view.
    pub fn virt_exists(&self, path: &Path, hypo: Option<&HypoFiles>) -> bool {
        self.virt_is_file(path, hypo) || self.virt_is_dir(path, hypo)
    }

    /// The sorted child names of a directory in the virtual view.
    pub fn virt_list_dir(
        &self,
        dir: &Path,
        hypo: Option<&HypoFiles>,
    ) -> FactResult<Vec<String>> {
        if !self.virt_is_dir(dir, hypo) {
            if self.virt_is_file(dir, hypo) {
                return Err(FactFailure::not_a_directory(dir));
            }
            return Err(FactFailure::not_found(dir));
        }
        let superset = self.list_superset(dir, hypo)?;
        Ok(superset
            .into_iter()
            .filter(|name| self.virt_exists(&dir.join(name), hypo))
            .collect())
    }

    /// Observes a file read in the virtual view, without returning content.
    pub fn virt_read_observe(
        &self,
        path: &Path,
        comparison: Comparison,
        hypo: Option<&HypoFiles>,
    ) -> FactResult<Observation> {
        if !self.virt_is_file(path, hypo) {
            if self.virt_is_dir(path, hypo) {
                return Err(FactFailure::is_a_directory(path));
            }
            return Err(FactFailure::not_found(path));
        }
        Observation::capture(self.probe.as_ref(), path, comparison)
            .map_err(|e| FactFailure::io(path, &e))
    }

    /// The size of a regular file in the virtual view.
    pub fn virt_file_size(&self, path: &Path, hypo: Option<&HypoFiles>) -> FactResult<u64> {
        if !self.virt_exists(path, hypo) {
            return Err(FactFailure::not_found(path));
        }
        self.probe
            .metadata(path)
            .map(|m| m.len)
            .map_err(|e| FactFailure::io(path, &e))
    }

    /// The target of a symbolic link. Links are never build outputs, so
    /// this consults the probe directly.
    pub fn virt_read_link(&self, path: &Path) -> FactResult<String> {
        if self.is_reserved_path(path) {
            return Err(FactFailure::not_found(path));
        }
        self.probe
            .read_link(path)
            .map_err(|e| FactFailure::io(path, &e))
    }

    /// Splits a directory's virtual children into subdirectory names and
    /// regular-file names, both sorted. Used by `walk`; a directory that
    /// cannot be listed reads as empty, so a tree mutated mid-walk cannot
    /// fail the walk itself.
    pub fn walk_split(
        &self,
        dir: &Path,
        hypo: Option<&HypoFiles>,
    ) -> (Vec<String>, Vec<String>) {
        let superset = self.list_superset(dir, hypo).unwrap_or_default();
        let mut subdirs = Vec::new();
        let mut subfiles = Vec::new();
        for name in superset {
            let child = dir.join(&name);
            if self.virt_is_file(&child, hypo) {
                subfiles.push(name);
            } else if self.virt_is_dir(&child, hypo) {
                subdirs.push(name);
            }
        }
        (subdirs, subfiles)
    }

    /// A sorted superset of a directory's virtual children: the real
    /// children plus names created by this session plus hypothetical
    /// names. Each candidate must still pass the virtual existence check.
    fn list_superset(&self, dir: &Path, hypo: Option<&HypoFiles>) -> FactResult<Vec<String>> {
        let mut names = match self.probe.list_dir(dir) {
            Ok(names) => names,
            Err(e) => return Err(FactFailure::io(dir, &e)),
        };
        {
            let st = self.state.lock().unwrap();
            if let Some(children) = st.dir_children.get(dir) {
                for name in children {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        if let Some(h) = hypo {
            for name in h.children(dir) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether `path` is a prior-build directory that is removed in the
    /// virtual view.
    ///
    /// A prior-created directory stays removed until something
    /// re-establishes it: an output built below it this session, or
    /// content inside it that the virtual view still considers existing
    /// (which includes anything placed there from outside the build). The
    /// scan is lazy and memoized; the lock is never held across the scan's
    /// probe I/O.
    fn is_prior_removed_dir(&self, path: &Path) -> bool {
        {
            let mut st = self.state.lock().unwrap();
            if st.active_dirs.contains_key(path) {
                return false;
            }
            if st.created_dirs_set.contains(path) {
                return false;
            }
            if !self.old_created_dirs.contains(path) {
                return false;
            }
            if let Some(verdict) = st.removed_verdicts.get(path) {
                return *verdict;
            }
            // Provisional verdict: a re-entrant query for this directory
            // (possible through a symlink loop) sees "not removed" instead
            // of scanning again.
            st.removed_verdicts.insert(path.to_path_buf(), false);
        }
        let removed = self.scan_removed(path);
        self.state
            .lock()
            .unwrap()
            .removed_verdicts
            .insert(path.to_path_buf(), removed);
        removed
    }

    /// Scans a prior-created directory to decide whether it is virtually
    /// removed: it is, unless it contains anything that virtually exists.
    fn scan_removed(&self, dir: &Path) -> bool {
        let children = match self.probe.list_dir(dir) {
            Ok(children) => children,
            // Gone from the real file system, or replaced by a file: in
            // either case it is not a surviving prior directory.
            Err(_) => return !self.probe.exists(dir),
        };
        for name in children {
            let child = dir.join(&name);
            if self.probe.is_dir(&child) {
                if !self.is_prior_removed_dir(&child) {
                    return false;
                }
            } else if self.virt_is_file(&child, None) {
                return false;
            }
            // An invisible file (an unconsumed prior output) does not
            // keep the directory alive.
        }
        true
    }
}
