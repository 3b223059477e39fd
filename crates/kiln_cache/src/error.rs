//! Error types for cache storage.

use std::path::PathBuf;

/// Errors that can occur while loading or committing cache snapshots.
///
/// Snapshot reads are fail-safe at the layer above: a corrupt or
/// incompatible snapshot is reported as empty, not as an error. This enum
/// covers the failures that cannot be absorbed that way, such as being
/// unable to write the new snapshot.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache state.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache path refers to an existing directory.
    #[error("the cache file is an existing directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A snapshot could not be serialized.
    #[error("snapshot serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::io(
            std::path::Path::new("/tmp/kiln.cache"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("kiln.cache"));
    }

    #[test]
    fn directory_error_display() {
        let err = CacheError::IsADirectory {
            path: PathBuf::from("/tmp/some_dir"),
        };
        assert!(err.to_string().contains("existing directory"));
    }

    #[test]
    fn serialization_error_display() {
        let err = CacheError::Serialization {
            reason: "bad value".to_string(),
        };
        assert!(err.to_string().contains("bad value"));
    }
}
