//! Error types for build execution.

use std::path::{Path, PathBuf};

use kiln_cache::CacheError;

/// Errors raised by the engine or propagated out of build functions.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A build function violated an engine rule: it wrote outside its
    /// `build_file`, produced the wrong path, returned a value that cannot
    /// be serialized, claimed an output path another operation owns, or
    /// invoked an operation that is already on the current call stack.
    ///
    /// Fatal to the current operation and propagated.
    #[error("programming error: {message}")]
    Programming {
        /// Description of the violated rule.
        message: String,
    },

    /// A build function failed. The failure propagates to the enclosing
    /// operations; if it reaches the top level, the build rolls back.
    #[error("build function failed: {message}")]
    UserFunction {
        /// Description of the failure.
        message: String,
    },

    /// An unexpected file system failure in an engine-internal operation:
    /// preparing directories, displacing files, or cache storage.
    ///
    /// Failures of *tracked reads* are not this variant: they are recorded
    /// in the operation's observation list (so a cache entry that observed
    /// the failure is valid exactly while the failure persists) and
    /// surface to the caller as [`BuildError::UserFunction`].
    #[error("file system error at {path}: {source}")]
    Fs {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache state on disk is inconsistent in a way that could not be
    /// absorbed by treating the cache as empty.
    #[error("cache corruption at {path}: {reason}")]
    CacheCorruption {
        /// The cache location.
        path: PathBuf,
        /// Description of the inconsistency.
        reason: String,
    },

    /// A tracked path changed between observation and use, and the change
    /// persisted through the retry. The build cannot vouch for the
    /// consistency of its outputs.
    #[error("tracked path changed during the build: {path}")]
    ConcurrentMutation {
        /// The path that changed.
        path: PathBuf,
    },

    /// The cache file was created for a different build name.
    #[error("the cache file belongs to the build named '{found}', not '{expected}'")]
    BuildNameMismatch {
        /// The build name the caller asked for.
        expected: String,
        /// The build name recorded in the cache file.
        found: String,
    },
}

impl BuildError {
    /// Creates a programming error with the given message.
    pub fn programming(message: impl Into<String>) -> Self {
        BuildError::Programming {
            message: message.into(),
        }
    }

    /// Creates a user-function error with the given message.
    pub fn user(message: impl Into<String>) -> Self {
        BuildError::UserFunction {
            message: message.into(),
        }
    }

    pub(crate) fn fs(path: &Path, source: std::io::Error) -> Self {
        BuildError::Fs {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Build functions commonly do their own I/O (writing the output file);
/// `?` on those calls produces a user-function error.
impl From<std::io::Error> for BuildError {
    fn from(source: std::io::Error) -> Self {
        BuildError::user(source.to_string())
    }
}

impl From<CacheError> for BuildError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io { path, source } => BuildError::Fs { path, source },
            CacheError::IsADirectory { path } => BuildError::Fs {
                path: path.clone(),
                source: std::io::Error::other(format!(
                    "the cache file is an existing directory, so we can't write to it: {}",
                    path.display()
                )),
            },
            CacheError::Serialization { reason } => BuildError::CacheCorruption {
                path: PathBuf::new(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programming_display() {
        let err = BuildError::programming("wrote outside build_file");
        assert_eq!(
            err.to_string(),
            "programming error: wrote outside build_file"
        );
    }

    #[test]
    fn user_function_display() {
        let err = BuildError::user("input malformed");
        assert!(err.to_string().contains("input malformed"));
    }

    #[test]
    fn io_error_converts_to_user_function() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BuildError = io.into();
        assert!(matches!(err, BuildError::UserFunction { .. }));
    }

    #[test]
    fn build_name_mismatch_display() {
        let err = BuildError::BuildNameMismatch {
            expected: "gzip".to_string(),
            found: "lint".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'lint'"));
        assert!(msg.contains("'gzip'"));
    }

    #[test]
    fn cache_io_converts_to_fs() {
        let err: BuildError = CacheError::Io {
            path: PathBuf::from("/c"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        }
        .into();
        assert!(matches!(err, BuildError::Fs { .. }));
    }
}
