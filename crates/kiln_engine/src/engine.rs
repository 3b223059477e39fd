//! Top-level build orchestration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::{CacheStore, FileStore, OpKind, Snapshot};
use kiln_fs::{paths, FsProbe, Observation, RealFs};

use crate::builder::Builder;
use crate::error::BuildError;
use crate::journal::Journal;
use crate::session::Session;

/// Per-function versions, as passed to [`Engine::build_versioned`].
///
/// A function's version is an arbitrary integer describing its behavior.
/// Changing it invalidates every cache entry recorded under a different
/// version and, transitively, the entries of the functions that called
/// it. A function absent from the map is unversioned. A practical habit:
/// bump a function's number whenever its output for unchanged inputs would
/// differ, such as after fixing a bug in it.
pub type Versions = BTreeMap<String, i64>;

/// The engine owns a cache location and executes builds against it.
///
/// The persistent cache is the only global state, and it is explicit: each
/// `Engine` holds its own [`CacheStore`] handle. Distinct cache paths are
/// fully independent.
pub struct Engine {
    store: Box<dyn CacheStore>,
    probe: Arc<dyn FsProbe>,
}

impl Engine {
    /// Creates an engine storing its cache at `cache_path`, backed by the
    /// real file system.
    pub fn new(cache_path: impl AsRef<Path>) -> Self {
        Self {
            store: Box::new(FileStore::new(cache_path.as_ref())),
            probe: Arc::new(RealFs::new()),
        }
    }

    /// Creates an engine from explicit store and probe implementations.
    pub fn with_store(store: Box<dyn CacheStore>, probe: Arc<dyn FsProbe>) -> Self {
        Self { store, probe }
    }

    /// Executes a build.
    ///
    /// Equivalent to [`build_versioned`](Self::build_versioned) with an
    /// empty version map.
    pub fn build<R, F>(&self, build_name: &str, f: F) -> Result<R, BuildError>
    where
        F: FnOnce(&Builder<'_>) -> Result<R, BuildError>,
    {
        self.build_versioned(build_name, Versions::new(), f)
    }

    /// Executes a build with per-function versions.
    ///
    /// The observable behavior is that of a clean-slate rebuild: as if the
    /// previous build's outputs were deleted, `f` ran from scratch, and
    /// then, on success, its outputs were committed, or, on failure, every
    /// file system change was undone and the previous build's outputs
    /// restored. In reality, results from the previous build are reused
    /// whenever their recorded observations still hold, and unchanged
    /// output files are never rewritten.
    ///
    /// `build_name` identifies the build process; a cache file created for
    /// a different name is refused rather than misapplied. The return
    /// value of `f` itself is not cached; wrap work in
    /// [`Builder::subbuild`] to cache it.
    ///
    /// If a previous build of this cache was interrupted (for example by a
    /// crash), its journal is rolled back here, before any new work.
    pub fn build_versioned<R, F>(
        &self,
        build_name: &str,
        versions: Versions,
        f: F,
    ) -> Result<R, BuildError>
    where
        F: FnOnce(&Builder<'_>) -> Result<R, BuildError>,
    {
        let cache_path = paths::normalize(self.store.cache_path())
            .map_err(|e| BuildError::fs(self.store.cache_path(), e))?;
        let staging_path = paths::normalize(self.store.staging_path())
            .map_err(|e| BuildError::fs(self.store.staging_path(), e))?;

        Journal::recover(&staging_path)?;
        self.probe.invalidate_cache();

        let old = match self.store.load()? {
            Some(snapshot) => {
                if snapshot.build_name != build_name {
                    return Err(BuildError::BuildNameMismatch {
                        expected: build_name.to_string(),
                        found: snapshot.build_name,
                    });
                }
                snapshot
            }
            None => {
                tracing::info!(
                    path = %cache_path.display(),
                    "no usable cache; building everything from scratch"
                );
                Snapshot::empty(build_name, versions.clone())
            }
        };

        self.store.begin()?;
        let journal = Journal::open(&staging_path)?;
        let session = Session::new(
            self.probe.clone(),
            cache_path.clone(),
            staging_path,
            &old,
            versions,
            journal,
        );

        let root = Builder::root(&session);
        let result = (|| {
            // Create the cache file's directory up front, so a build that
            // could never commit fails before doing any work.
            if let Some(parent) = paths::parent(&cache_path) {
                session.make_dirs(parent)?;
            }
            f(&root)
        })();

        match result {
            Ok(value) => match self.commit(build_name, &session) {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.roll_back(&session, &old);
                    Err(e)
                }
            },
            Err(e) => {
                self.roll_back(&session, &old);
                Err(e)
            }
        }
    }

    /// Removes the files and directories created by the previous build.
    ///
    /// Deletes the previous build's output files (even if they changed),
    /// the cache file itself, and any of the build's directories that are
    /// left empty. A missing cache file means there is nothing to clean.
    /// `build_name`, when given, must match the cache's recorded name.
    /// Running `clean` twice has the same effect as running it once.
    pub fn clean(&self, build_name: Option<&str>) -> Result<(), BuildError> {
        let staging_path = paths::normalize(self.store.staging_path())
            .map_err(|e| BuildError::fs(self.store.staging_path(), e))?;
        Journal::recover(&staging_path)?;

        let cache_path = paths::normalize(self.store.cache_path())
            .map_err(|e| BuildError::fs(self.store.cache_path(), e))?;
        if !cache_path.exists() {
            tracing::info!(
                path = %cache_path.display(),
                "the cache file does not exist, so there's nothing to clean"
            );
            return Ok(());
        }

        match self.store.load()? {
            None => {
                // Unreadable cache: the outputs are unknown, so removing
                // the cache file is all that can be done.
                tracing::warn!(
                    path = %cache_path.display(),
                    "cache file is unreadable; removing it"
                );
                try_to_remove_file(&cache_path);
                Ok(())
            }
            Some(snapshot) => {
                if let Some(name) = build_name {
                    if snapshot.build_name != name {
                        return Err(BuildError::BuildNameMismatch {
                            expected: name.to_string(),
                            found: snapshot.build_name,
                        });
                    }
                }
                for file in snapshot.output_files() {
                    try_to_remove_file(&file);
                }
                try_to_remove_file(&cache_path);
                remove_empty_dirs(&snapshot.created_dirs);
                Ok(())
            }
        }
    }

    fn commit(&self, build_name: &str, session: &Session) -> Result<(), BuildError> {
        tracing::info!("committing build");
        verify_outputs(session)?;

        let snapshot = session.finish_snapshot(build_name);
        self.store.commit(&snapshot)?;

        // Previous-build outputs the virtual view no longer contains are
        // orphans; their operations were not reached this build.
        let mut orphans: Vec<&PathBuf> = session
            .old_outputs
            .iter()
            .filter(|path| **path != session.cache_path)
            .collect();
        orphans.sort();
        for path in orphans {
            if !session.virt_is_file(path, None) {
                try_to_remove_file(path);
            }
        }

        let mut stale_dirs: Vec<PathBuf> = {
            let st = session.state.lock().unwrap();
            st.error_dirs.clone()
        };
        for dir in &session.old_created_dirs {
            if !session.virt_is_dir(dir, None) {
                stale_dirs.push(dir.clone());
            }
        }
        remove_empty_dirs(&stale_dirs);

        tracing::info!("committed build");
        Ok(())
    }

    fn roll_back(&self, session: &Session, old: &Snapshot) {
        tracing::warn!("rolling back build after failure");
        session.journal.restore_all();
        create_dirs(&old.created_dirs);
        if let Err(e) = self.store.discard() {
            tracing::error!(error = %e, "failed to remove the staging area");
        }
        tracing::info!("rolled back build");
    }
}

/// Re-observes every output file produced or kept by this build and
/// reports any that changed since its operation recorded it. A build
/// cannot vouch for outputs mutated under it by an outside writer.
fn verify_outputs(session: &Session) -> Result<(), BuildError> {
    let mut outputs = Vec::new();
    {
        let st = session.state.lock().unwrap();
        for root in &st.roots {
            root.visit(&mut |entry| {
                if entry.kind == OpKind::BuildFile && !entry.failed && !entry.setup_failed {
                    if let Some(output) = &entry.output {
                        if let Some(observation) = &output.observation {
                            outputs.push((
                                output.path.clone(),
                                output.comparison,
                                observation.clone(),
                            ));
                        }
                    }
                }
            });
        }
    }
    for (path, comparison, recorded) in outputs {
        let current = Observation::capture(session.probe.as_ref(), &path, comparison);
        match current {
            Ok(observation) if observation == recorded => {}
            _ => return Err(BuildError::ConcurrentMutation { path }),
        }
    }
    Ok(())
}

/// Removes a regular file, logging instead of failing.
pub(crate) fn try_to_remove_file(path: &Path) {
    if path.is_file() {
        match fs::remove_file(path) {
            Ok(()) => tracing::info!(path = %path.display(), "removed"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to remove"),
        }
    }
}

/// Removes whichever of the given directories are empty, children before
/// parents. Directories that cannot be removed are skipped.
fn remove_empty_dirs(dirs: &[PathBuf]) {
    let mut sorted = dirs.to_vec();
    sorted.sort_by_key(|d| std::cmp::Reverse(d.as_os_str().len()));
    sorted.dedup();
    for dir in sorted {
        if fs::remove_dir(&dir).is_ok() {
            tracing::info!(path = %dir.display(), "removed empty directory");
        }
    }
}

/// Creates the given directories, parents before children. Failures for
/// directories that do not end up existing are logged, not raised.
fn create_dirs(dirs: &[PathBuf]) {
    let mut sorted = dirs.to_vec();
    sorted.sort_by_key(|d| d.as_os_str().len());
    for dir in sorted {
        match fs::create_dir(&dir) {
            Ok(()) => tracing::info!(path = %dir.display(), "created directory"),
            Err(_) if dir.is_dir() => {}
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "failed to create directory")
            }
        }
    }
}
