//! Loading of `kiln.toml` configuration files.
//!
//! The configuration pins per-function versions, so a team can invalidate
//! a build function's cache entries by bumping a number in one place:
//!
//! ```toml
//! [versions]
//! gzip_file = 2
//! lint_file = 1
//! ```

use std::path::Path;

use serde::Deserialize;

use kiln_engine::Versions;

/// Errors that can occur when loading a `kiln.toml` file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Contents of a `kiln.toml` file.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    /// Per-function versions, as in `Engine::build_versioned`.
    #[serde(default)]
    pub versions: Versions,
}

/// Loads a configuration file from disk.
pub fn load_config(path: &Path) -> Result<CliConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versions_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "[versions]\ngzip_file = 2\nlint_file = 7\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.versions.get("gzip_file"), Some(&2));
        assert_eq!(config.versions.get("lint_file"), Some(&7));
    }

    #[test]
    fn empty_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.versions.is_empty());
    }

    #[test]
    fn missing_file_errors() {
        assert!(matches!(
            load_config(Path::new("/no/such/kiln.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "[versions\n").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
