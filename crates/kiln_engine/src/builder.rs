//! The per-operation handle passed to build functions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use kiln_cache::{CacheEntry, FileFact, FileOutput, OpId, OpKind};
use kiln_fs::{paths, Comparison};

use crate::error::BuildError;
use crate::recorder::Frame;
use crate::session::{Entered, Session};
use crate::validate::Validator;
use crate::vfs::FactFailure;
use crate::walk::Walk;

/// Links each in-flight operation to its parent, for cycle detection.
struct OpChain {
    op: OpId,
    parent: Option<Arc<OpChain>>,
}

/// The handle a build function uses for all file system access and for
/// invoking nested operations.
///
/// Every read through a `Builder` becomes a tracked dependency of the
/// enclosing operation, and the view it reads is the session's virtual
/// file system: previous-build outputs that have not been proven valid
/// are invisible, outputs produced earlier in this build are visible.
///
/// A function must use the `Builder` passed *to it*, not one captured
/// from an enclosing scope. The borrow it receives cannot outlive the
/// call, so a `Builder` can never be used after its operation finished.
/// `Builder` is `Sync`: the embedder may share it across scoped threads to
/// run independent nested operations in parallel.
pub struct Builder<'s> {
    session: &'s Session,
    frame: Option<Frame>,
    ancestry: Option<Arc<OpChain>>,
}

impl<'s> Builder<'s> {
    /// The handle for the top-level build function. Its own reads are not
    /// recorded (the top-level function is re-run every build), but the
    /// operations it invokes are.
    pub(crate) fn root(session: &'s Session) -> Self {
        Self {
            session,
            frame: None,
            ancestry: None,
        }
    }

    pub(crate) fn session(&self) -> &'s Session {
        self.session
    }

    pub(crate) fn record_fact(&self, fact: FileFact) {
        if let Some(frame) = &self.frame {
            frame.record_fact(fact);
        }
    }

    fn record_child_entry(&self, entry: &CacheEntry) {
        match &self.frame {
            Some(frame) => frame.record_child(entry.clone()),
            None => self.session.record_root(entry),
        }
    }

    fn child(&self, op: &OpId) -> Builder<'s> {
        Builder {
            session: self.session,
            frame: Some(Frame::new()),
            ancestry: Some(Arc::new(OpChain {
                op: op.clone(),
                parent: self.ancestry.clone(),
            })),
        }
    }

    fn check_cycle(&self, op: &OpId) -> Result<(), BuildError> {
        let mut chain = self.ancestry.as_ref();
        while let Some(link) = chain {
            if link.op == *op {
                return Err(BuildError::programming(format!(
                    "the operation '{}' is already in progress on this call stack (dependency cycle)",
                    op.func
                )));
            }
            chain = link.parent.as_ref();
        }
        Ok(())
    }

    fn normalize(&self, path: &Path) -> Result<PathBuf, BuildError> {
        paths::normalize(path).map_err(|e| BuildError::fs(path, e))
    }

    /// A failed tracked read is recorded in the frame as a fact outcome
    /// and surfaced to the caller as a user-function error.
    fn fact_error(&self, failure: FactFailure) -> BuildError {
        BuildError::user(failure.message)
    }

    // ---- nested operations -------------------------------------------

    /// Produces the output file at `path` by calling `f`, or reuses the
    /// previous build's result if it is still valid.
    ///
    /// Equivalent to
    /// [`build_file_with_comparison`](Self::build_file_with_comparison)
    /// with [`Comparison::Metadata`].
    pub fn build_file<T, F>(
        &self,
        path: impl AsRef<Path>,
        func_name: &str,
        args: &[Value],
        f: F,
    ) -> Result<T, BuildError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Builder<'_>, &Path) -> Result<T, BuildError>,
    {
        self.build_file_with_comparison(path, Comparison::Metadata, func_name, args, f)
    }

    /// Produces the output file at `path` by calling `f`, or reuses the
    /// previous build's result if it is still valid.
    ///
    /// `f` receives a fresh `Builder` and the normalized output path, and
    /// must leave a regular file at that path; it may write nowhere else.
    /// Its parent directories are created beforehand. Building a file is
    /// atomic from the perspective of other operations: until `f` returns,
    /// the file does not exist in the virtual view, even if it already
    /// exists on disk.
    ///
    /// `comparison` selects how the produced file is pinned: during the
    /// next build it decides whether the output has changed out from under
    /// its cache entry. The comparison contract is pure, total and
    /// symmetric: two observations compare equal exactly when their
    /// recorded values are identical.
    ///
    /// `f` must be functional and deterministic, and `args` must capture
    /// everything it depends on besides the file system. The same
    /// invocation (function name, arguments, version, path) from several
    /// threads runs `f` once; all callers observe the same result. Two
    /// *different* invocations may not claim the same output path in one
    /// build.
    pub fn build_file_with_comparison<T, F>(
        &self,
        path: impl AsRef<Path>,
        comparison: Comparison,
        func_name: &str,
        args: &[Value],
        f: F,
    ) -> Result<T, BuildError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Builder<'_>, &Path) -> Result<T, BuildError>,
    {
        let path = self.normalize(path.as_ref())?;
        if self.session.is_reserved_path(&path) {
            return Err(BuildError::programming(format!(
                "build_file may not write to the cache file: {}",
                path.display()
            )));
        }
        let op = OpId::build_file(func_name, args, self.session.version_of(func_name), &path);
        self.check_cycle(&op)?;

        match self.session.enter(&op)? {
            Entered::Done(entry) => {
                self.record_child_entry(&entry);
                cached_value(&entry)
            }
            Entered::Failed(entry) => {
                self.record_child_entry(&entry);
                Err(BuildError::user(format!(
                    "the build_file call for {} failed in another invocation",
                    path.display()
                )))
            }
            Entered::Lead => self.lead_build_file(op, path, comparison, func_name, args, f),
        }
    }

    /// Computes an in-memory value by calling `f`, or reuses the previous
    /// build's result if it is still valid.
    ///
    /// The value is serialized into the cache as JSON; a return value that
    /// cannot be represented as JSON fails the operation. `f` must be
    /// functional and deterministic. The same invocation from several
    /// threads runs `f` once; all callers observe the same result.
    pub fn subbuild<T, F>(&self, func_name: &str, args: &[Value], f: F) -> Result<T, BuildError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Builder<'_>) -> Result<T, BuildError>,
    {
        let op = OpId::subbuild(func_name, args, self.session.version_of(func_name));
        self.check_cycle(&op)?;

        match self.session.enter(&op)? {
            Entered::Done(entry) => {
                self.record_child_entry(&entry);
                cached_value(&entry)
            }
            Entered::Failed(entry) => {
                self.record_child_entry(&entry);
                Err(BuildError::user(format!(
                    "the subbuild function {func_name} failed in another invocation"
                )))
            }
            Entered::Lead => self.lead_subbuild(op, func_name, args, f),
        }
    }

    fn lead_build_file<T, F>(
        &self,
        op: OpId,
        path: PathBuf,
        comparison: Comparison,
        func_name: &str,
        args: &[Value],
        f: F,
    ) -> Result<T, BuildError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Builder<'_>, &Path) -> Result<T, BuildError>,
    {
        // Setup: clear anything standing where the file goes and create
        // its parent directories.
        let setup = self.make_room_for_file(&path).and_then(|()| {
            match paths::parent(&path) {
                Some(parent) => self.session.make_dirs(parent).map(|_| ()),
                None => Err(BuildError::programming(format!(
                    "cannot build a file at a filesystem root: {}",
                    path.display()
                ))),
            }
        });
        if let Err(e) = setup {
            let entry = Arc::new(setup_failed_entry(func_name, args, &path, comparison));
            self.session.finish_setup_failed(&op, &entry);
            self.record_child_entry(&entry);
            return Err(e);
        }
        self.session.started_building(&path);

        // Reuse the previous build's result when every recorded
        // observation still holds and the output file is untouched.
        if let Some(candidate) = self.session.old_index.files.get(&path).cloned() {
            if candidate.func == func_name
                && candidate.args == args
                && Validator::new(self.session).can_reuse_file(&candidate)
                && self.session.graft_nested(&candidate)
            {
                match observe_output(self.session, &path, comparison) {
                    Some(observation)
                        if fresh_output_consistent(&candidate, &observation, comparison) =>
                    {
                        let entry = Arc::new(CacheEntry {
                            kind: OpKind::BuildFile,
                            func: func_name.to_string(),
                            args: args.to_vec(),
                            output: Some(FileOutput {
                                path: path.clone(),
                                comparison,
                                observation: Some(observation),
                            }),
                            steps: candidate.steps.clone(),
                            value: candidate.value.clone(),
                            failed: false,
                            setup_failed: false,
                        });
                        self.session.finish_success(&op, &entry);
                        self.record_child_entry(&entry);
                        tracing::debug!(path = %path.display(), "kept file from previous build");
                        return cached_value(&entry);
                    }
                    _ => {
                        // The output changed between validation and use.
                        // Retry once by rebuilding; the grafted children
                        // stay valid and are served from the session.
                        tracing::warn!(
                            path = %path.display(),
                            "output file changed between validation and reuse; rebuilding"
                        );
                    }
                }
            }
        }

        // Make way for a fresh write, preserving the original through the
        // journal.
        let prepared = (|| -> Result<(), BuildError> {
            if self.session.probe.is_file(&path) {
                if self.session.journal.displace(&path)? {
                    tracing::info!(
                        path = %path.display(),
                        "moved the previous file aside before rebuilding"
                    );
                    return Ok(());
                }
            }
            self.session.journal.note_created(&path)
        })();
        if let Err(e) = prepared {
            self.session.error_building(&path);
            let entry = Arc::new(setup_failed_entry(func_name, args, &path, comparison));
            self.session.finish_setup_failed(&op, &entry);
            self.record_child_entry(&entry);
            return Err(e);
        }

        let child = self.child(&op);
        let result = f(&child, &path);
        let frame = child.frame.clone().unwrap_or_else(Frame::new);
        drop(child);

        match result {
            Ok(value) => {
                let json = match serde_json::to_value(&value) {
                    Ok(json) => json,
                    Err(e) => {
                        return self.fail_build_file(
                            &op,
                            &frame,
                            func_name,
                            args,
                            &path,
                            comparison,
                            BuildError::programming(format!(
                                "the return value of the build_file call for {} is not a JSON value: {e}",
                                path.display()
                            )),
                        );
                    }
                };
                match observe_output(self.session, &path, comparison) {
                    Some(observation) => {
                        let entry = Arc::new(CacheEntry {
                            kind: OpKind::BuildFile,
                            func: func_name.to_string(),
                            args: args.to_vec(),
                            output: Some(FileOutput {
                                path: path.clone(),
                                comparison,
                                observation: Some(observation),
                            }),
                            steps: frame.take_steps(),
                            value: Some(json),
                            failed: false,
                            setup_failed: false,
                        });
                        self.session.finish_success(&op, &entry);
                        self.record_child_entry(&entry);
                        if self.session.old_outputs.contains(&path) {
                            tracing::info!(path = %path.display(), "rebuilt file");
                        } else {
                            tracing::info!(path = %path.display(), "built file");
                        }
                        Ok(value)
                    }
                    None => self.fail_build_file(
                        &op,
                        &frame,
                        func_name,
                        args,
                        &path,
                        comparison,
                        BuildError::programming(format!(
                            "the build_file call for {} didn't create that file",
                            path.display()
                        )),
                    ),
                }
            }
            Err(e) => self.fail_build_file(&op, &frame, func_name, args, &path, comparison, e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_build_file<T>(
        &self,
        op: &OpId,
        frame: &Frame,
        func_name: &str,
        args: &[Value],
        path: &Path,
        comparison: Comparison,
        err: BuildError,
    ) -> Result<T, BuildError> {
        crate::engine::try_to_remove_file(path);
        self.session.error_building(path);
        let entry = Arc::new(CacheEntry {
            kind: OpKind::BuildFile,
            func: func_name.to_string(),
            args: args.to_vec(),
            output: Some(FileOutput {
                path: path.to_path_buf(),
                comparison,
                observation: None,
            }),
            steps: frame.take_steps(),
            value: None,
            failed: true,
            setup_failed: false,
        });
        self.session.finish_failed(op, &entry);
        self.record_child_entry(&entry);
        tracing::warn!(path = %path.display(), "failed to build file");
        Err(err)
    }

    fn lead_subbuild<T, F>(
        &self,
        op: OpId,
        func_name: &str,
        args: &[Value],
        f: F,
    ) -> Result<T, BuildError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Builder<'_>) -> Result<T, BuildError>,
    {
        if let Some(candidate) = self
            .session
            .old_index
            .subbuilds
            .get(&kiln_cache::SubKey::new(func_name, args))
            .cloned()
        {
            if candidate.args == args
                && Validator::new(self.session).can_reuse_subbuild(&candidate)
                && self.session.graft_nested(&candidate)
            {
                let entry = Arc::new(candidate);
                self.session.finish_success(&op, &entry);
                self.record_child_entry(&entry);
                tracing::debug!(func = func_name, "reused cached subbuild");
                return cached_value(&entry);
            }
        }

        let child = self.child(&op);
        let result = f(&child);
        let frame = child.frame.clone().unwrap_or_else(Frame::new);
        drop(child);

        match result {
            Ok(value) => {
                let json = match serde_json::to_value(&value) {
                    Ok(json) => json,
                    Err(e) => {
                        return self.fail_subbuild(
                            &op,
                            &frame,
                            func_name,
                            args,
                            BuildError::programming(format!(
                                "the return value of the subbuild function {func_name} is not a JSON value: {e}"
                            )),
                        );
                    }
                };
                let entry = Arc::new(CacheEntry {
                    kind: OpKind::Subbuild,
                    func: func_name.to_string(),
                    args: args.to_vec(),
                    output: None,
                    steps: frame.take_steps(),
                    value: Some(json),
                    failed: false,
                    setup_failed: false,
                });
                self.session.finish_success(&op, &entry);
                self.record_child_entry(&entry);
                Ok(value)
            }
            Err(e) => self.fail_subbuild(&op, &frame, func_name, args, e),
        }
    }

    fn fail_subbuild<T>(
        &self,
        op: &OpId,
        frame: &Frame,
        func_name: &str,
        args: &[Value],
        err: BuildError,
    ) -> Result<T, BuildError> {
        let entry = Arc::new(CacheEntry {
            kind: OpKind::Subbuild,
            func: func_name.to_string(),
            args: args.to_vec(),
            output: None,
            steps: frame.take_steps(),
            value: None,
            failed: true,
            setup_failed: false,
        });
        self.session.finish_failed(op, &entry);
        self.record_child_entry(&entry);
        tracing::warn!(func = func_name, "subbuild failed");
        Err(err)
    }

    /// Clears whatever stands at a future output path, if it is a
    /// directory left over from a previous build.
    fn make_room_for_file(&self, path: &Path) -> Result<(), BuildError> {
        if !self.session.probe.is_dir(path) {
            return Ok(());
        }
        if self.session.virt_is_dir(path, None) {
            return Err(BuildError::fs(
                path,
                std::io::Error::other(format!(
                    "the file passed to build_file is an existing directory, so we can't write to it: {}",
                    path.display()
                )),
            ));
        }
        tracing::info!(
            path = %path.display(),
            "output path is a directory from a previous build; clearing it"
        );
        self.make_room(path, path)
    }

    fn make_room(&self, dir: &Path, output: &Path) -> Result<(), BuildError> {
        let occupied = || {
            BuildError::fs(
                output,
                std::io::Error::other(format!(
                    "the file passed to build_file is an existing directory, so we can't write to it: {}",
                    output.display()
                )),
            )
        };
        let children = self
            .session
            .probe
            .list_dir(dir)
            .map_err(|e| BuildError::fs(dir, e))?;
        for name in children {
            let child = dir.join(&name);
            if self.session.probe.is_dir(&child) {
                if self.session.virt_is_dir(&child, None) {
                    return Err(occupied());
                }
                self.make_room(&child, output)?;
            } else if self.session.virt_is_file(&child, None) {
                return Err(occupied());
            } else {
                self.session.journal.displace(&child)?;
            }
        }
        self.session.journal.note_removed_dir(dir)?;
        std::fs::remove_dir(dir).map_err(|_| occupied())?;
        tracing::info!(path = %dir.display(), "removed empty directory");
        Ok(())
    }

    // ---- tracked file system reads -----------------------------------

    /// Whether `path` refers to an existing regular file, in the virtual
    /// file system view. Follows symbolic links.
    pub fn is_file(&self, path: impl AsRef<Path>) -> Result<bool, BuildError> {
        let path = self.normalize(path.as_ref())?;
        let value = self.session.virt_is_file(&path, None);
        self.record_fact(FileFact::IsFile {
            path: path.clone(),
            value,
        });
        Ok(value)
    }

    /// Whether `path` refers to an existing directory, in the virtual
    /// file system view. Follows symbolic links.
    pub fn is_dir(&self, path: impl AsRef<Path>) -> Result<bool, BuildError> {
        let path = self.normalize(path.as_ref())?;
        let value = self.session.virt_is_dir(&path, None);
        self.record_fact(FileFact::IsDir {
            path: path.clone(),
            value,
        });
        Ok(value)
    }

    /// Whether `path` exists at all, in the virtual file system view.
    pub fn exists(&self, path: impl AsRef<Path>) -> Result<bool, BuildError> {
        let path = self.normalize(path.as_ref())?;
        let value = self.session.virt_exists(&path, None);
        self.record_fact(FileFact::Exists {
            path: path.clone(),
            value,
        });
        Ok(value)
    }

    /// The names of the direct children of a directory, sorted, in the
    /// virtual file system view. Names are final components only.
    pub fn list_dir(&self, path: impl AsRef<Path>) -> Result<Vec<String>, BuildError> {
        let path = self.normalize(path.as_ref())?;
        match self.session.virt_list_dir(&path, None) {
            Ok(names) => {
                self.record_fact(FileFact::ListDir {
                    path: path.clone(),
                    outcome: Ok(names.clone()),
                });
                Ok(names)
            }
            Err(failure) => {
                self.record_fact(FileFact::ListDir {
                    path: path.clone(),
                    outcome: Err(failure.kind),
                });
                Err(self.fact_error(failure))
            }
        }
    }

    /// Walks the directory tree under `root` lazily, in the virtual file
    /// system view. Yields nothing if `root` is not a directory.
    pub fn walk(&self, root: impl AsRef<Path>) -> Result<Walk<'_, 's>, BuildError> {
        let root = self.normalize(root.as_ref())?;
        let is_dir = self.session.virt_is_dir(&root, None);
        self.record_fact(FileFact::IsDir {
            path: root.clone(),
            value: is_dir,
        });
        Ok(Walk::new(self, is_dir.then_some(root)))
    }

    /// Reads a file as UTF-8 text, recording the read as a dependency
    /// under [`Comparison::Metadata`].
    pub fn read_text(&self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        self.read_text_with_comparison(path, Comparison::Metadata)
    }

    /// Reads a file as UTF-8 text, recording the read under the given
    /// comparison.
    pub fn read_text_with_comparison(
        &self,
        path: impl AsRef<Path>,
        comparison: Comparison,
    ) -> Result<String, BuildError> {
        let bytes = self.read_binary_with_comparison(path, comparison)?;
        String::from_utf8(bytes).map_err(|e| {
            BuildError::user(format!("file contents are not valid UTF-8: {e}"))
        })
    }

    /// Reads a file's raw bytes, recording the read as a dependency under
    /// [`Comparison::Metadata`].
    pub fn read_binary(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, BuildError> {
        self.read_binary_with_comparison(path, Comparison::Metadata)
    }

    /// Reads a file's raw bytes, recording the read under the given
    /// comparison.
    pub fn read_binary_with_comparison(
        &self,
        path: impl AsRef<Path>,
        comparison: Comparison,
    ) -> Result<Vec<u8>, BuildError> {
        let path = self.normalize(path.as_ref())?;
        match self.session.virt_read_observe(&path, comparison, None) {
            Ok(observation) => {
                self.record_fact(FileFact::Read {
                    path: path.clone(),
                    comparison,
                    outcome: Ok(observation),
                });
                self.session.probe.read(&path).map_err(|e| {
                    BuildError::user(format!("failed to read {}: {e}", path.display()))
                })
            }
            Err(failure) => {
                self.record_fact(FileFact::Read {
                    path: path.clone(),
                    comparison,
                    outcome: Err(failure.kind),
                });
                Err(self.fact_error(failure))
            }
        }
    }

    /// Declares that the enclosing operation reads `path`, without reading
    /// it here, under [`Comparison::Metadata`].
    ///
    /// For functions that hand the file to an external tool which reads it
    /// on its own. Declare before reading where practical, so the
    /// dependency is recorded even if the read then fails.
    pub fn declare_read(&self, path: impl AsRef<Path>) -> Result<(), BuildError> {
        self.declare_read_with_comparison(path, Comparison::Metadata)
    }

    /// Declares a read of `path` under the given comparison.
    pub fn declare_read_with_comparison(
        &self,
        path: impl AsRef<Path>,
        comparison: Comparison,
    ) -> Result<(), BuildError> {
        let path = self.normalize(path.as_ref())?;
        match self.session.virt_read_observe(&path, comparison, None) {
            Ok(observation) => {
                self.record_fact(FileFact::Read {
                    path: path.clone(),
                    comparison,
                    outcome: Ok(observation),
                });
                Ok(())
            }
            Err(failure) => {
                self.record_fact(FileFact::Read {
                    path: path.clone(),
                    comparison,
                    outcome: Err(failure.kind),
                });
                Err(self.fact_error(failure))
            }
        }
    }

    /// The size in bytes of a file, in the virtual file system view.
    pub fn file_size(&self, path: impl AsRef<Path>) -> Result<u64, BuildError> {
        let path = self.normalize(path.as_ref())?;
        match self.session.virt_file_size(&path, None) {
            Ok(size) => {
                self.record_fact(FileFact::FileSize {
                    path: path.clone(),
                    outcome: Ok(size),
                });
                Ok(size)
            }
            Err(failure) => {
                self.record_fact(FileFact::FileSize {
                    path: path.clone(),
                    outcome: Err(failure.kind),
                });
                Err(self.fact_error(failure))
            }
        }
    }

    /// The target string of a symbolic link. The link itself becomes the
    /// dependency: the entry is valid while the link points at the same
    /// target.
    pub fn read_link(&self, path: impl AsRef<Path>) -> Result<String, BuildError> {
        let path = self.normalize(path.as_ref())?;
        match self.session.virt_read_link(&path) {
            Ok(target) => {
                self.record_fact(FileFact::SymlinkTo {
                    path: path.clone(),
                    outcome: Ok(target.clone()),
                });
                Ok(target)
            }
            Err(failure) => {
                self.record_fact(FileFact::SymlinkTo {
                    path: path.clone(),
                    outcome: Err(failure.kind),
                });
                Err(self.fact_error(failure))
            }
        }
    }
}

/// Extracts the typed value from a completed entry.
fn cached_value<T: DeserializeOwned>(entry: &CacheEntry) -> Result<T, BuildError> {
    let Some(value) = &entry.value else {
        return Err(BuildError::programming(format!(
            "the cached result for '{}' has no value",
            entry.func
        )));
    };
    serde_json::from_value(value.clone()).map_err(|e| {
        BuildError::programming(format!(
            "the cached value for '{}' does not deserialize as the requested type: {e}",
            entry.func
        ))
    })
}

/// Observes the produced output file, or `None` if it is not a regular
/// file (including when it does not exist).
fn observe_output(
    session: &Session,
    path: &Path,
    comparison: Comparison,
) -> Option<kiln_fs::Observation> {
    if !session.probe.is_file(path) {
        return None;
    }
    kiln_fs::Observation::capture(session.probe.as_ref(), path, comparison).ok()
}

/// Whether a fresh observation of a reused output is consistent with the
/// validated candidate. Under a different comparison than the candidate's
/// there is nothing to compare against.
fn fresh_output_consistent(
    candidate: &CacheEntry,
    observation: &kiln_fs::Observation,
    comparison: Comparison,
) -> bool {
    match &candidate.output {
        Some(output) if output.comparison == comparison => {
            output.observation.as_ref() == Some(observation)
        }
        _ => true,
    }
}

/// The entry recorded when an operation fails before its function runs.
fn setup_failed_entry(
    func_name: &str,
    args: &[Value],
    path: &Path,
    comparison: Comparison,
) -> CacheEntry {
    CacheEntry {
        kind: OpKind::BuildFile,
        func: func_name.to_string(),
        args: args.to_vec(),
        output: Some(FileOutput {
            path: path.to_path_buf(),
            comparison,
            observation: None,
        }),
        steps: Vec::new(),
        value: None,
        failed: true,
        setup_failed: true,
    }
}
