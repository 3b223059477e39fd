//! The runtime state of one top-level build.
//!
//! A session owns everything shared between the operations of a build: the
//! single-flight table keyed by operation identity, the output-path claims
//! that make the virtual file system view consistent, directory
//! bookkeeping, the rollback journal, and the prior build's snapshot. One
//! mutex guards the session maps; waiting for another thread's operation
//! happens on the session condvar, and file system I/O stays outside the
//! lock.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use kiln_cache::{CacheEntry, OpId, SnapshotIndex};
use kiln_fs::{paths, FsProbe};

use crate::error::BuildError;
use crate::journal::Journal;

/// The state of an operation in the session's single-flight table.
///
/// `UNVISITED` is the absence of a slot. A leader holds `InFlight` through
/// both validation and execution; other callers of the same identity block
/// until the slot turns terminal and then adopt its result.
pub(crate) enum OpSlot {
    /// One thread is validating or running the operation.
    InFlight,
    /// The operation completed; its entry holds the reusable result.
    Done(Arc<CacheEntry>),
    /// The operation failed; its entry records the failure.
    Failed(Arc<CacheEntry>),
}

/// What `Session::enter` decided for a caller.
pub(crate) enum Entered {
    /// The caller is the leader and must perform the operation.
    Lead,
    /// Another invocation already completed the operation.
    Done(Arc<CacheEntry>),
    /// Another invocation already failed the operation.
    Failed(Arc<CacheEntry>),
}

/// The session-visible state of an output path.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileState {
    /// The file is being produced right now; it is invisible.
    Pending,
    /// The file was produced (or consumed as carryover); it is visible.
    Built,
    /// The producing function failed; the path was cleaned up.
    Failed,
}

pub(crate) struct FileClaim {
    pub op: OpId,
    pub state: FileState,
}

#[derive(Default)]
pub(crate) struct SessionState {
    /// Single-flight slots keyed by operation identity.
    pub ops: HashMap<OpId, OpSlot>,
    /// Output-path claims. A path belongs to exactly one operation.
    pub files: HashMap<PathBuf, FileClaim>,
    /// Names created under each directory this session (outputs and dirs),
    /// merged into directory listings.
    pub dir_children: HashMap<PathBuf, BTreeSet<String>>,
    /// Directories virtually created this session, in creation order.
    pub created_dirs: Vec<PathBuf>,
    pub created_dirs_set: HashSet<PathBuf>,
    /// Directories created for an operation that later failed, pending
    /// removal at commit.
    pub error_dirs: Vec<PathBuf>,
    /// Refcount of in-flight or completed outputs below each directory.
    /// An active directory is never considered removed.
    pub active_dirs: HashMap<PathBuf, usize>,
    /// Memoized verdicts of the prior-created-directory removal check.
    pub removed_verdicts: HashMap<PathBuf, bool>,
    /// Completed operations invoked directly by the top-level function.
    pub roots: Vec<CacheEntry>,
}

pub(crate) struct Session {
    pub probe: Arc<dyn FsProbe>,
    pub cache_path: PathBuf,
    pub staging_path: PathBuf,
    /// Indexed entries of the prior build's snapshot.
    pub old_index: SnapshotIndex,
    /// Output files of the prior build: hidden until proven to survive.
    pub old_outputs: HashSet<PathBuf>,
    /// Directories the prior build created: removed until re-established.
    pub old_created_dirs: HashSet<PathBuf>,
    pub old_versions: BTreeMap<String, i64>,
    pub versions: BTreeMap<String, i64>,
    pub journal: Journal,
    pub state: Mutex<SessionState>,
    pub cond: Condvar,
}

impl Session {
    pub fn new(
        probe: Arc<dyn FsProbe>,
        cache_path: PathBuf,
        staging_path: PathBuf,
        old: &kiln_cache::Snapshot,
        versions: BTreeMap<String, i64>,
        journal: Journal,
    ) -> Self {
        Self {
            probe,
            cache_path,
            staging_path,
            old_index: old.index(),
            old_outputs: old.output_files().into_iter().collect(),
            old_created_dirs: old.created_dirs.iter().cloned().collect(),
            old_versions: old.func_versions.clone(),
            versions,
            journal,
            state: Mutex::new(SessionState::default()),
            cond: Condvar::new(),
        }
    }

    /// Returns the current version for a function name.
    pub fn version_of(&self, func: &str) -> Option<i64> {
        self.versions.get(func).copied()
    }

    /// Returns whether a function's version is unchanged since the prior
    /// build.
    pub fn version_unchanged(&self, func: &str) -> bool {
        self.old_versions.get(func) == self.versions.get(func)
    }

    /// Enters the single-flight slot for an operation.
    ///
    /// The first caller becomes the leader and must later settle the slot
    /// through one of the `finish_*` methods. Later callers block until
    /// the slot is terminal and adopt its outcome. For file operations this also
    /// claims the output path; a claim already held by a *different*
    /// operation is a programming error, because each output path is owned
    /// by exactly one operation per build.
    pub fn enter(&self, op: &OpId) -> Result<Entered, BuildError> {
        let mut st = self.state.lock().unwrap();
        loop {
            match st.ops.get(op) {
                None => break,
                Some(OpSlot::InFlight) => {
                    st = self.cond.wait(st).unwrap();
                }
                Some(OpSlot::Done(entry)) => return Ok(Entered::Done(entry.clone())),
                Some(OpSlot::Failed(entry)) => return Ok(Entered::Failed(entry.clone())),
            }
        }

        if let Some(path) = &op.output {
            if let Some(claim) = st.files.get(path) {
                if claim.op != *op {
                    return Err(BuildError::programming(format!(
                        "building the same file twice is not allowed: {}",
                        path.display()
                    )));
                }
            }
            st.files.insert(
                path.clone(),
                FileClaim {
                    op: op.clone(),
                    state: FileState::Pending,
                },
            );
        }
        st.ops.insert(op.clone(), OpSlot::InFlight);
        Ok(Entered::Lead)
    }

    /// Settles an operation slot with a successful entry.
    pub fn finish_success(&self, op: &OpId, entry: &Arc<CacheEntry>) {
        let mut st = self.state.lock().unwrap();
        if let Some(path) = &op.output {
            if let Some(claim) = st.files.get_mut(path) {
                claim.state = FileState::Built;
            }
            Self::note_child(&mut st, path);
        }
        st.ops.insert(op.clone(), OpSlot::Done(entry.clone()));
        drop(st);
        self.cond.notify_all();
    }

    /// Settles an operation slot after the user function failed.
    pub fn finish_failed(&self, op: &OpId, entry: &Arc<CacheEntry>) {
        let mut st = self.state.lock().unwrap();
        if let Some(path) = &op.output {
            if let Some(claim) = st.files.get_mut(path) {
                claim.state = FileState::Failed;
            }
        }
        st.ops.insert(op.clone(), OpSlot::Failed(entry.clone()));
        drop(st);
        self.cond.notify_all();
    }

    /// Settles an operation slot after a setup failure: an error before
    /// the function ran or a cached result was applied. The path claim is
    /// released, since the conditions that produced the failure may not
    /// hold next time.
    pub fn finish_setup_failed(&self, op: &OpId, entry: &Arc<CacheEntry>) {
        let mut st = self.state.lock().unwrap();
        if let Some(path) = &op.output {
            st.files.remove(path);
        }
        st.ops.insert(op.clone(), OpSlot::Failed(entry.clone()));
        drop(st);
        self.cond.notify_all();
    }

    /// Records a completed root-level operation for the final snapshot.
    pub fn record_root(&self, entry: &CacheEntry) {
        self.state.lock().unwrap().roots.push(entry.clone());
    }

    /// Marks the ancestor directories of an output path active.
    pub fn started_building(&self, file: &Path) {
        let mut st = self.state.lock().unwrap();
        let mut dir = paths::parent(file).map(Path::to_path_buf);
        while let Some(d) = dir {
            let count = st.active_dirs.get(&d).copied().unwrap_or(0);
            st.active_dirs.insert(d.clone(), count + 1);
            if count > 0 {
                break;
            }
            dir = paths::parent(&d).map(Path::to_path_buf);
        }
    }

    /// Releases the ancestor directories of a failed output path. A
    /// directory created for this build that loses its last output is
    /// moved to the error list for removal at commit.
    pub fn error_building(&self, file: &Path) {
        let mut st = self.state.lock().unwrap();
        let mut dir = paths::parent(file).map(Path::to_path_buf);
        while let Some(d) = dir {
            let count = st.active_dirs.get(&d).copied().unwrap_or(1) - 1;
            if count > 0 {
                st.active_dirs.insert(d.clone(), count);
                break;
            }
            st.active_dirs.remove(&d);
            if st.created_dirs_set.remove(&d) {
                st.created_dirs.retain(|c| c != &d);
                st.error_dirs.push(d.clone());
                if let Some(name) = d.file_name() {
                    if let Some(parent) = paths::parent(&d) {
                        if let Some(children) = st.dir_children.get_mut(parent) {
                            children.remove(&name.to_string_lossy().into_owned());
                        }
                    }
                }
            }
            dir = paths::parent(&d).map(Path::to_path_buf);
        }
    }

    /// Computes the directories that must be created so that `dir` exists
    /// in the virtual file system view, parents first.
    pub fn dirs_to_make(
        &self,
        dir: &Path,
        hypo: Option<&crate::hypo::HypoFiles>,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let mut parents: Vec<PathBuf> = Vec::new();
        let mut cur = dir.to_path_buf();
        loop {
            if self.virt_is_dir(&cur, hypo) {
                break;
            }
            if self.virt_is_file(&cur, hypo) {
                return Err(BuildError::fs(
                    dir,
                    std::io::Error::other(format!(
                        "unable to create directory {}, because {} is a regular file",
                        dir.display(),
                        cur.display()
                    )),
                ));
            }
            if cur == self.cache_path {
                return Err(BuildError::fs(
                    dir,
                    std::io::Error::other(format!(
                        "unable to create directory {}, because {} is the cache file",
                        dir.display(),
                        cur.display()
                    )),
                ));
            }
            parents.push(cur.clone());
            match paths::parent(&cur) {
                Some(parent) => cur = parent.to_path_buf(),
                None => {
                    return Err(BuildError::fs(
                        dir,
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!(
                                "unable to create directory {}, because the root does not exist",
                                dir.display()
                            ),
                        ),
                    ));
                }
            }
        }
        parents.reverse();
        Ok(parents)
    }

    /// Creates `dir` and any missing parents in the real file system, and
    /// records them as virtually created by this session.
    ///
    /// A prior-build output file standing where a directory is needed is
    /// displaced through the journal first.
    pub fn make_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
        let to_make = self.dirs_to_make(dir, None)?;
        for d in &to_make {
            if self.probe.is_file(d) && self.old_outputs.contains(d.as_path()) {
                if self.journal.displace(d)? {
                    tracing::info!(
                        path = %d.display(),
                        "moved a previous output aside to create a directory with its name"
                    );
                }
            }
            match std::fs::create_dir(d) {
                Ok(()) => {
                    self.journal.note_dir(d)?;
                    tracing::info!(path = %d.display(), "created directory");
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(BuildError::fs(d, e)),
            }
        }

        let mut st = self.state.lock().unwrap();
        for d in &to_make {
            if st.created_dirs_set.insert(d.clone()) {
                st.created_dirs.push(d.clone());
                st.error_dirs.retain(|e| e != d);
                Self::note_child(&mut st, d);
            }
        }
        Ok(to_make)
    }

    /// Registers the nested operations of a validated cache entry as
    /// completed in this session, so that later identical calls coalesce
    /// onto the cached results and the final snapshot contains them.
    ///
    /// Returns `false` without registering anything if a nested operation
    /// conflicts with work this session has already done; the caller then
    /// re-runs the function instead of reusing the entry.
    pub fn graft_nested(&self, top: &CacheEntry) -> bool {
        let mut nested = Vec::new();
        collect_nested(top, false, &mut nested);

        let mut st = self.state.lock().unwrap();
        // Validation rejects entries with failed descendants, so every
        // nested entry here is a success.
        for entry in &nested {
            let op = entry.op_id(self.version_of(&entry.func));
            match st.ops.get(&op) {
                None => {}
                Some(OpSlot::Done(_)) => continue,
                Some(_) => return false,
            }
            if let Some(output) = &entry.output {
                if st.files.contains_key(&output.path) {
                    return false;
                }
            }
        }

        for entry in nested {
            let op = entry.op_id(self.version_of(&entry.func));
            if matches!(st.ops.get(&op), Some(OpSlot::Done(_))) {
                continue;
            }
            let shared = Arc::new(entry.clone());
            if let Some(output) = &entry.output {
                let path = output.path.clone();
                st.files.insert(
                    path.clone(),
                    FileClaim {
                        op: op.clone(),
                        state: FileState::Built,
                    },
                );
                st.ops.insert(op, OpSlot::Done(shared));
                Self::bump_active_locked(&mut st, &path);
                Self::note_child(&mut st, &path);
                Self::reestablish_dirs_locked(&mut st, &self.old_created_dirs, &path);
            } else {
                st.ops.insert(op, OpSlot::Done(shared));
            }
        }
        true
    }

    fn bump_active_locked(st: &mut SessionState, file: &Path) {
        let mut dir = paths::parent(file).map(Path::to_path_buf);
        while let Some(d) = dir {
            let count = st.active_dirs.get(&d).copied().unwrap_or(0);
            st.active_dirs.insert(d.clone(), count + 1);
            if count > 0 {
                break;
            }
            dir = paths::parent(&d).map(Path::to_path_buf);
        }
    }

    /// Re-records prior-build directories that host a surviving output as
    /// created by this session, so they appear in the new snapshot.
    fn reestablish_dirs_locked(
        st: &mut SessionState,
        old_created_dirs: &HashSet<PathBuf>,
        file: &Path,
    ) {
        let mut dir = paths::parent(file).map(Path::to_path_buf);
        while let Some(d) = dir {
            if old_created_dirs.contains(&d) && st.created_dirs_set.insert(d.clone()) {
                st.created_dirs.push(d.clone());
                st.error_dirs.retain(|e| e != &d);
                Self::note_child(st, &d);
            }
            dir = paths::parent(&d).map(Path::to_path_buf);
        }
    }

    fn note_child(st: &mut SessionState, path: &Path) {
        let (Some(dir), Some(name)) = (paths::parent(path), path.file_name()) else {
            return;
        };
        st.dir_children
            .entry(dir.to_path_buf())
            .or_default()
            .insert(name.to_string_lossy().into_owned());
    }

    /// Assembles the snapshot of this session's completed state.
    pub fn finish_snapshot(&self, build_name: &str) -> kiln_cache::Snapshot {
        let st = self.state.lock().unwrap();
        kiln_cache::Snapshot {
            build_name: build_name.to_string(),
            func_versions: self.versions.clone(),
            created_dirs: st.created_dirs.clone(),
            roots: st.roots.clone(),
        }
    }

    /// Returns whether the cache file or staging area covers `path`.
    pub fn is_reserved_path(&self, path: &Path) -> bool {
        path == self.cache_path || path.starts_with(&self.staging_path)
    }
}

/// Collects every nested child entry of `entry`, and `entry` itself when
/// `include_self` is set.
fn collect_nested(entry: &CacheEntry, include_self: bool, out: &mut Vec<CacheEntry>) {
    if include_self {
        out.push(entry.clone());
    }
    for step in &entry.steps {
        if let kiln_cache::Step::Child(child) = step {
            collect_nested(child, true, out);
        }
    }
}
