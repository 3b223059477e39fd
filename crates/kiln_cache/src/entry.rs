//! Cache entry records: operations, their observed facts, and results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kiln_common::{digest_args, Fingerprint};
use kiln_fs::{Comparison, Observation};

/// The kind of a cacheable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// An operation that produces exactly one output file.
    BuildFile,
    /// An operation that produces an in-memory value.
    Subbuild,
}

/// The stable identity of a cacheable operation.
///
/// Two invocations with the same `OpId` are the same operation: they share a
/// single-flight slot within a session and a cache entry across sessions.
/// For file operations the identity includes the output path, so the same
/// function may build many files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpId {
    /// The operation kind.
    pub kind: OpKind,
    /// The caller-supplied function name.
    pub func: String,
    /// Digest of the canonical encoding of the argument list.
    pub args_digest: Fingerprint,
    /// The function's version at the time of the call, if any.
    pub version: Option<i64>,
    /// The output path, for `BuildFile` operations.
    pub output: Option<PathBuf>,
}

impl OpId {
    /// Builds the identity of a file-producing operation.
    pub fn build_file(
        func: &str,
        args: &[Value],
        version: Option<i64>,
        output: &std::path::Path,
    ) -> Self {
        Self {
            kind: OpKind::BuildFile,
            func: func.to_string(),
            args_digest: digest_args(args),
            version,
            output: Some(output.to_path_buf()),
        }
    }

    /// Builds the identity of a value-producing operation.
    pub fn subbuild(func: &str, args: &[Value], version: Option<i64>) -> Self {
        Self {
            kind: OpKind::Subbuild,
            func: func.to_string(),
            args_digest: digest_args(args),
            version,
            output: None,
        }
    }
}

/// The lookup key for a subbuild: function name plus argument digest.
///
/// Unlike a full [`OpId`] this is version-free, because versions live in the
/// snapshot header and are checked separately during validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubKey {
    /// The function name.
    pub func: String,
    /// Digest of the canonical argument encoding.
    pub args_digest: Fingerprint,
}

impl SubKey {
    /// Builds the subbuild key for a function name and argument list.
    pub fn new(func: &str, args: &[Value]) -> Self {
        Self {
            func: func.to_string(),
            args_digest: digest_args(args),
        }
    }
}

/// The class of failure a tracked file system probe produced.
///
/// Recorded instead of the raw OS error so that replay can compare
/// outcomes: an operation that observed "no such file" is still valid
/// exactly when the probe fails the same way today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactErrorKind {
    /// The path did not exist in the virtual file system view.
    NotFound,
    /// The path referred to a directory where a file was required.
    IsADirectory,
    /// The path referred to a regular file where a directory was required.
    NotADirectory,
    /// Any other I/O failure.
    Io,
}

/// One replayable observation about a file system path.
///
/// A fact records both what was asked and what the answer was. Validation
/// re-asks the same question against the current virtual file system and
/// compares answers; the first divergence invalidates the entry that made
/// the observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFact {
    /// The path was (or was not) an existing regular file.
    IsFile {
        /// The queried path.
        path: PathBuf,
        /// The answer.
        value: bool,
    },
    /// The path was (or was not) an existing directory.
    IsDir {
        /// The queried path.
        path: PathBuf,
        /// The answer.
        value: bool,
    },
    /// The path did (or did not) exist at all.
    Exists {
        /// The queried path.
        path: PathBuf,
        /// The answer.
        value: bool,
    },
    /// The ordered child names of a directory.
    ListDir {
        /// The queried directory.
        path: PathBuf,
        /// Sorted child names, or the failure kind.
        outcome: Result<Vec<String>, FactErrorKind>,
    },
    /// A tracked read of a file, pinned under a comparison.
    ///
    /// A read of a missing file is recorded with a `NotFound` outcome, never
    /// dropped: observing absence is an observation too.
    Read {
        /// The file that was read.
        path: PathBuf,
        /// The comparison used to pin the contents.
        comparison: Comparison,
        /// The observation, or the failure kind.
        outcome: Result<Observation, FactErrorKind>,
    },
    /// The size in bytes of a regular file.
    FileSize {
        /// The queried path.
        path: PathBuf,
        /// The size, or the failure kind.
        outcome: Result<u64, FactErrorKind>,
    },
    /// The target string of a symbolic link.
    SymlinkTo {
        /// The queried link path.
        path: PathBuf,
        /// The link target, or the failure kind.
        outcome: Result<String, FactErrorKind>,
    },
    /// One directory yielded during a tree walk: its subdirectory names and
    /// its regular-file names, both sorted.
    WalkDir {
        /// The directory that was yielded.
        path: PathBuf,
        /// Sorted names of child directories.
        subdirs: Vec<String>,
        /// Sorted names of child regular files.
        subfiles: Vec<String>,
    },
}

/// One recorded step of an operation: either a file system fact it observed
/// or a child operation it invoked. Order matters: an earlier step's answer
/// may control whether a later step happens at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// A file system observation.
    Fact(FileFact),
    /// A nested cacheable operation, with its full record.
    Child(CacheEntry),
}

/// The output-file half of a `BuildFile` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutput {
    /// The output path the operation owns.
    pub path: PathBuf,
    /// The comparison used to pin the produced file.
    pub comparison: Comparison,
    /// The observation of the produced file, or `None` if the operation
    /// failed before producing it.
    pub observation: Option<Observation>,
}

/// The persisted record of one operation invocation.
///
/// Entries for failed operations are retained as a record of what happened,
/// but they carry no reusable value, are never treated as hits, and
/// invalidate any parent entry whose steps contain them. An entry whose
/// setup failed (an error before the user function ran or a cached result
/// was applied) is likewise never valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The operation kind.
    pub kind: OpKind,
    /// The caller-supplied function name.
    pub func: String,
    /// The argument list, in canonical JSON form.
    pub args: Vec<Value>,
    /// The output file record, for `BuildFile` entries.
    pub output: Option<FileOutput>,
    /// The ordered steps the operation performed.
    pub steps: Vec<Step>,
    /// The produced value, or `None` if the operation failed.
    pub value: Option<Value>,
    /// Whether the user function failed.
    pub failed: bool,
    /// Whether setup failed before the function ran.
    pub setup_failed: bool,
}

impl CacheEntry {
    /// Returns the subbuild lookup key for this entry.
    ///
    /// Only meaningful for `Subbuild` entries.
    pub fn sub_key(&self) -> SubKey {
        SubKey::new(&self.func, &self.args)
    }

    /// Returns the operation identity under the given version.
    pub fn op_id(&self, version: Option<i64>) -> OpId {
        OpId {
            kind: self.kind,
            func: self.func.clone(),
            args_digest: digest_args(&self.args),
            version,
            output: self.output.as_ref().map(|o| o.path.clone()),
        }
    }

    /// Visits this entry and every nested child entry, parents first.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a CacheEntry)) {
        f(self);
        for step in &self.steps {
            if let Step::Child(child) = step {
                child.visit(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn leaf(func: &str, value: i64) -> CacheEntry {
        CacheEntry {
            kind: OpKind::Subbuild,
            func: func.to_string(),
            args: vec![json!(value)],
            output: None,
            steps: Vec::new(),
            value: Some(json!(value)),
            failed: false,
            setup_failed: false,
        }
    }

    #[test]
    fn op_id_distinguishes_args() {
        let a = OpId::subbuild("f", &[json!(1)], None);
        let b = OpId::subbuild("f", &[json!(2)], None);
        assert_ne!(a, b);
    }

    #[test]
    fn op_id_distinguishes_versions() {
        let a = OpId::subbuild("f", &[json!(1)], None);
        let b = OpId::subbuild("f", &[json!(1)], Some(2));
        assert_ne!(a, b);
    }

    #[test]
    fn op_id_includes_output_path() {
        let a = OpId::build_file("f", &[], None, Path::new("/out/a"));
        let b = OpId::build_file("f", &[], None, Path::new("/out/b"));
        assert_ne!(a, b);
    }

    #[test]
    fn sub_key_matches_op_identity() {
        let entry = leaf("f", 3);
        assert_eq!(entry.sub_key(), SubKey::new("f", &[json!(3)]));
    }

    #[test]
    fn visit_reaches_nested_children() {
        let mut parent = leaf("parent", 0);
        parent.steps.push(Step::Child(leaf("a", 1)));
        parent.steps.push(Step::Fact(FileFact::Exists {
            path: PathBuf::from("/x"),
            value: true,
        }));
        let mut inner = leaf("b", 2);
        inner.steps.push(Step::Child(leaf("c", 3)));
        parent.steps.push(Step::Child(inner));

        let mut seen = Vec::new();
        parent.visit(&mut |e| seen.push(e.func.clone()));
        assert_eq!(seen, vec!["parent", "a", "b", "c"]);
    }

    #[test]
    fn serde_roundtrip() {
        let mut entry = leaf("top", 9);
        entry.steps.push(Step::Fact(FileFact::Read {
            path: PathBuf::from("/in/a.txt"),
            comparison: Comparison::Hash,
            outcome: Err(FactErrorKind::NotFound),
        }));
        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
