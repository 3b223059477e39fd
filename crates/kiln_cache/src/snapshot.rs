//! The persisted record of a completed build.
//!
//! A snapshot is stored as a single gzip-compressed JSON document. The
//! header carries a software marker and a format version; a file whose
//! header doesn't match is rejected as a whole (treated as empty), never
//! partially interpreted. Sorting keys and compressing keeps the file small
//! even for builds with many operations.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::entry::{CacheEntry, OpKind, SubKey};
use crate::error::CacheError;

/// Marker identifying a Kiln snapshot file.
pub const SOFTWARE: &str = "kiln";

/// Current snapshot format version. Increment on breaking changes to the
/// entry schema or to the semantics the entries encode.
pub const FORMAT_VERSION: u32 = 1;

/// The surviving state of the most recently completed build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The build name the snapshot belongs to, as passed to `build`.
    pub build_name: String,

    /// Per-function versions the build ran with.
    pub func_versions: BTreeMap<String, i64>,

    /// Directories the build created (virtually), deepest entries last.
    pub created_dirs: Vec<PathBuf>,

    /// The operation trees invoked directly by the top-level function.
    pub roots: Vec<CacheEntry>,
}

/// On-disk framing around a [`Snapshot`].
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    software: String,
    format_version: u32,
    #[serde(flatten)]
    snapshot: Snapshot,
}

impl Snapshot {
    /// Creates an empty snapshot for the given build name and versions.
    pub fn empty(build_name: &str, func_versions: BTreeMap<String, i64>) -> Self {
        Self {
            build_name: build_name.to_string(),
            func_versions,
            created_dirs: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Returns the version recorded for a function name, if any.
    pub fn func_version(&self, func: &str) -> Option<i64> {
        self.func_versions.get(func).copied()
    }

    /// Returns the output paths of every file the build produced.
    ///
    /// Failed file operations are excluded: their outputs were removed when
    /// the operation failed.
    pub fn output_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in &self.roots {
            root.visit(&mut |entry| {
                if entry.kind == OpKind::BuildFile && !entry.failed && !entry.setup_failed {
                    if let Some(output) = &entry.output {
                        files.push(output.path.clone());
                    }
                }
            });
        }
        files.sort();
        files.dedup();
        files
    }

    /// Builds lookup indexes over every entry in the snapshot, nested
    /// entries included. A nested entry may be reusable even when its
    /// parent is not, so children are indexed independently.
    pub fn index(&self) -> SnapshotIndex {
        let mut files = HashMap::new();
        let mut subbuilds = HashMap::new();
        for root in &self.roots {
            root.visit(&mut |entry| {
                if entry.setup_failed {
                    return;
                }
                match entry.kind {
                    OpKind::BuildFile => {
                        if let Some(output) = &entry.output {
                            files.insert(output.path.clone(), entry.clone());
                        }
                    }
                    OpKind::Subbuild => {
                        subbuilds.insert(entry.sub_key(), entry.clone());
                    }
                }
            });
        }
        SnapshotIndex { files, subbuilds }
    }

    /// Serializes the snapshot into gzip-compressed JSON bytes.
    pub fn to_gz_bytes(&self) -> Result<Vec<u8>, CacheError> {
        let file = SnapshotFile {
            software: SOFTWARE.to_string(),
            format_version: FORMAT_VERSION,
            snapshot: self.clone(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        encoder.finish().map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parses a snapshot from gzip-compressed JSON bytes.
    ///
    /// Returns `None` if the data is not a valid snapshot, was written by
    /// different software, or has an unknown format version. Unknown
    /// versions are rejected, not migrated.
    pub fn from_gz_bytes(data: &[u8], origin: &Path) -> Option<Self> {
        let mut decoder = GzDecoder::new(data);
        let mut json = Vec::new();
        if decoder.read_to_end(&mut json).is_err() {
            tracing::warn!(path = %origin.display(), "cache snapshot is not valid gzip data");
            return None;
        }
        let file: SnapshotFile = match serde_json::from_slice(&json) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %origin.display(), error = %e, "cache snapshot failed to parse");
                return None;
            }
        };
        if file.software != SOFTWARE {
            tracing::warn!(path = %origin.display(), "cache snapshot was not written by kiln");
            return None;
        }
        if file.format_version != FORMAT_VERSION {
            tracing::warn!(
                path = %origin.display(),
                found = file.format_version,
                expected = FORMAT_VERSION,
                "cache snapshot has an unknown format version"
            );
            return None;
        }
        Some(file.snapshot)
    }
}

/// Lookup indexes over a snapshot's entries.
///
/// File entries are keyed by output path; subbuild entries by function name
/// and argument digest. Entries whose setup failed are excluded; they can
/// never validate.
pub struct SnapshotIndex {
    /// File entries keyed by output path.
    pub files: HashMap<PathBuf, CacheEntry>,
    /// Subbuild entries keyed by function and arguments.
    pub subbuilds: HashMap<SubKey, CacheEntry>,
}
