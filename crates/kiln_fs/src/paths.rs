//! Path normalization.
//!
//! Every path handed to the engine is normalized before use: made absolute
//! against the current directory and lexically simplified. Normalization is
//! purely lexical; symlinks are not resolved, so a tracked path always means
//! the name the caller used, not wherever it happens to point.

use std::path::{Component, Path, PathBuf};

/// Returns the normalized absolute form of a path.
///
/// Relative paths are resolved against the current directory. `.` components
/// are dropped and `..` components are folded lexically, so
/// `/a/b/../c` becomes `/a/c` even if `/a/b` is a symlink.
pub fn normalize(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    Ok(out)
}

/// Returns the parent of a normalized path, or `None` at a filesystem root.
pub fn parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| *p != path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_unchanged() {
        let p = normalize(Path::new("/a/b/c")).unwrap();
        assert_eq!(p, PathBuf::from("/a/b/c"));
    }

    #[test]
    fn dot_components_removed() {
        let p = normalize(Path::new("/a/./b/.")).unwrap();
        assert_eq!(p, PathBuf::from("/a/b"));
    }

    #[test]
    fn parent_components_folded() {
        let p = normalize(Path::new("/a/b/../c")).unwrap();
        assert_eq!(p, PathBuf::from("/a/c"));
    }

    #[test]
    fn parent_beyond_root_stays_at_root() {
        let p = normalize(Path::new("/../../a")).unwrap();
        assert_eq!(p, PathBuf::from("/a"));
    }

    #[test]
    fn relative_path_becomes_absolute() {
        let p = normalize(Path::new("some/file.txt")).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("some/file.txt"));
    }

    #[test]
    fn parent_of_root_is_none() {
        assert_eq!(parent(Path::new("/")), None);
        assert_eq!(parent(Path::new("/a")), Some(Path::new("/")));
    }
}
