//! The rollback journal.
//!
//! Everything a build does to the file system is covered by a journal
//! record before it happens: displaced files are moved into the session
//! staging area, fresh output paths and created directories are noted. The
//! journal file itself lives inside the staging area and is appended and
//! flushed record by record, so a build interrupted at any point, even by
//! a crash, can be rolled back: in-process on failure, or by a recovery
//! pass at the next engine startup before any new work begins.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Name of the journal file inside the staging area.
const JOURNAL_FILE: &str = "journal.jsonl";

/// One journaled file system action, in the order it must be undone.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Record {
    /// A file was moved from `path` into the staging area at `staged`.
    /// Undo: move it back, overwriting whatever is at `path`.
    Displaced { path: PathBuf, staged: PathBuf },
    /// A new output will be written at `path`, where nothing existed.
    /// Undo: delete the file at `path`.
    Created { path: PathBuf },
    /// A directory was created at `path`. Undo: remove it if empty.
    Dir { path: PathBuf },
    /// An empty directory was removed at `path`. Undo: create it again.
    RemovedDir { path: PathBuf },
}

struct Inner {
    file: File,
    records: Vec<Record>,
    next_index: u64,
}

/// A durable journal of the current session's file system changes.
pub(crate) struct Journal {
    staging: PathBuf,
    inner: Mutex<Inner>,
}

impl Journal {
    /// Opens a fresh journal inside the staging area.
    pub fn open(staging: &Path) -> Result<Self, BuildError> {
        let journal_path = staging.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&journal_path)
            .map_err(|e| BuildError::fs(&journal_path, e))?;
        Ok(Self {
            staging: staging.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                records: Vec::new(),
                next_index: 0,
            }),
        })
    }

    /// Moves the file at `path` into the staging area, recording how to
    /// put it back. Returns whether a regular file was displaced.
    ///
    /// A path that vanished before the move returns `false`. A path that
    /// turns out to be a directory is left in the staging area unrecorded,
    /// matching the policy that directories standing in an output file's
    /// way are disposed of, not restored.
    pub fn displace(&self, path: &Path) -> Result<bool, BuildError> {
        let staged = {
            let mut inner = self.inner.lock().unwrap();
            let staged = self.staging.join(format!("file_{:06x}", inner.next_index));
            inner.next_index += 1;
            staged
        };

        match fs::rename(path, &staged) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(BuildError::fs(path, e)),
        }
        if staged.is_dir() {
            return Ok(false);
        }

        self.append(Record::Displaced {
            path: path.to_path_buf(),
            staged,
        })?;
        Ok(true)
    }

    /// Records that a new output file is about to be written at a path
    /// where nothing existed.
    pub fn note_created(&self, path: &Path) -> Result<(), BuildError> {
        self.append(Record::Created {
            path: path.to_path_buf(),
        })
    }

    /// Records that a directory was created.
    pub fn note_dir(&self, path: &Path) -> Result<(), BuildError> {
        self.append(Record::Dir {
            path: path.to_path_buf(),
        })
    }

    /// Records that an empty directory is about to be removed.
    pub fn note_removed_dir(&self, path: &Path) -> Result<(), BuildError> {
        self.append(Record::RemovedDir {
            path: path.to_path_buf(),
        })
    }

    /// Undoes every recorded action, newest first.
    ///
    /// Failures are logged and skipped so that one stubborn path cannot
    /// prevent the rest of the restore.
    pub fn restore_all(&self) {
        let records = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.records)
        };
        restore_records(&records);
    }

    /// Rolls back an interrupted session left behind by a crash.
    ///
    /// If the staging area holds a journal, its records are undone and the
    /// staging area is removed. Runs before any new work at engine startup.
    pub fn recover(staging: &Path) -> Result<(), BuildError> {
        let journal_path = staging.join(JOURNAL_FILE);
        if !journal_path.is_file() {
            if staging.is_dir() {
                // Staging area without a journal: nothing was displaced.
                fs::remove_dir_all(staging).map_err(|e| BuildError::fs(staging, e))?;
            }
            return Ok(());
        }

        tracing::warn!(
            staging = %staging.display(),
            "found an interrupted build; rolling it back before starting"
        );
        let file = File::open(&journal_path).map_err(|e| BuildError::fs(&journal_path, e))?;
        let mut records = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(|e| BuildError::fs(&journal_path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                // A torn final line means the crash interrupted the append
                // before the action it covers; nothing to undo for it.
                Err(_) => break,
            }
        }
        restore_records(&records);
        fs::remove_dir_all(staging).map_err(|e| BuildError::fs(staging, e))?;
        tracing::info!("recovered interrupted build");
        Ok(())
    }

    fn append(&self, record: Record) -> Result<(), BuildError> {
        let mut inner = self.inner.lock().unwrap();
        let mut line = serde_json::to_string(&record).map_err(|e| {
            BuildError::programming(format!("journal record serialization failed: {e}"))
        })?;
        line.push('\n');
        let journal_path = self.staging.join(JOURNAL_FILE);
        inner
            .file
            .write_all(line.as_bytes())
            .and_then(|()| inner.file.sync_all())
            .map_err(|e| BuildError::fs(&journal_path, e))?;
        inner.records.push(record);
        Ok(())
    }
}

fn restore_records(records: &[Record]) {
    for record in records.iter().rev() {
        match record {
            Record::Displaced { path, staged } => {
                if path.is_dir() {
                    tracing::error!(
                        path = %path.display(),
                        "unable to restore old contents: the path is an existing directory"
                    );
                    continue;
                }
                if let Some(parent) = path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        tracing::error!(
                            path = %path.display(),
                            error = %e,
                            "unable to restore old contents: failed to create parent directories"
                        );
                        continue;
                    }
                }
                match fs::rename(staged, path) {
                    Ok(()) => tracing::info!(path = %path.display(), "restored old contents"),
                    Err(e) => tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to restore old contents"
                    ),
                }
            }
            Record::Created { path } => {
                if path.is_file() {
                    match fs::remove_file(path) {
                        Ok(()) => tracing::info!(path = %path.display(), "removed"),
                        Err(e) => {
                            tracing::error!(path = %path.display(), error = %e, "failed to remove")
                        }
                    }
                }
            }
            Record::Dir { path } => {
                // Only empty directories go; contents may predate the build.
                if fs::remove_dir(path).is_ok() {
                    tracing::info!(path = %path.display(), "removed empty directory");
                }
            }
            Record::RemovedDir { path } => {
                if let Err(e) = fs::create_dir_all(path) {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to recreate a removed directory"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_in(dir: &Path) -> PathBuf {
        let staging = dir.join("kiln.cache.staging");
        fs::create_dir_all(&staging).unwrap();
        staging
    }

    #[test]
    fn displace_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let target = dir.path().join("out.txt");
        fs::write(&target, "original").unwrap();

        let journal = Journal::open(&staging).unwrap();
        assert!(journal.displace(&target).unwrap());
        assert!(!target.exists());

        fs::write(&target, "overwritten").unwrap();
        journal.restore_all();
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn displace_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let journal = Journal::open(&staging).unwrap();
        assert!(!journal.displace(&dir.path().join("missing")).unwrap());
    }

    #[test]
    fn created_files_removed_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let target = dir.path().join("new.txt");

        let journal = Journal::open(&staging).unwrap();
        journal.note_created(&target).unwrap();
        fs::write(&target, "fresh").unwrap();

        journal.restore_all();
        assert!(!target.exists());
    }

    #[test]
    fn created_dirs_removed_on_restore_if_empty() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let subdir = dir.path().join("made");

        let journal = Journal::open(&staging).unwrap();
        journal.note_dir(&subdir).unwrap();
        fs::create_dir(&subdir).unwrap();

        journal.restore_all();
        assert!(!subdir.exists());
    }

    #[test]
    fn restore_order_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let out_dir = dir.path().join("out");
        let file = out_dir.join("a.txt");

        let journal = Journal::open(&staging).unwrap();
        journal.note_dir(&out_dir).unwrap();
        fs::create_dir(&out_dir).unwrap();
        journal.note_created(&file).unwrap();
        fs::write(&file, "x").unwrap();

        // File removed before the directory, so the rmdir succeeds.
        journal.restore_all();
        assert!(!file.exists());
        assert!(!out_dir.exists());
    }

    #[test]
    fn recover_replays_journal_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        let target = dir.path().join("out.txt");
        fs::write(&target, "original").unwrap();

        {
            let journal = Journal::open(&staging).unwrap();
            journal.displace(&target).unwrap();
            fs::write(&target, "half-written").unwrap();
            // Journal dropped without restore, simulating a crash.
        }

        Journal::recover(&staging).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!staging.exists());
    }

    #[test]
    fn recover_without_staging_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        Journal::recover(&dir.path().join("no.staging")).unwrap();
    }

    #[test]
    fn recover_removes_journalless_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(dir.path());
        Journal::recover(&staging).unwrap();
        assert!(!staging.exists());
    }
}
