//! Lazy recursive directory traversal.

use std::path::PathBuf;

use kiln_cache::FileFact;

use crate::builder::Builder;

/// A lazy, depth-first traversal of a directory tree in the virtual file
/// system view, created by [`Builder::walk`].
///
/// Each yielded item is `(dir, subdirs, subfiles)`: the absolute path of
/// one directory, the sorted names of its child directories, and the
/// sorted names of its child regular files. A directory's listing is
/// recorded as a dependency at the moment its item is yielded, so only the
/// part of the tree actually consumed is tracked. The traversal is finite
/// (bounded by the tree) and not restartable; directories that are
/// symbolic links are reported but not descended into.
pub struct Walk<'b, 's> {
    builder: &'b Builder<'s>,
    stack: Vec<PathBuf>,
}

impl<'b, 's> Walk<'b, 's> {
    pub(crate) fn new(builder: &'b Builder<'s>, root: Option<PathBuf>) -> Self {
        Self {
            builder,
            stack: root.into_iter().collect(),
        }
    }
}

impl Iterator for Walk<'_, '_> {
    type Item = (PathBuf, Vec<String>, Vec<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.stack.pop()?;
        let session = self.builder.session();
        let (subdirs, subfiles) = session.walk_split(&dir, None);
        self.builder.record_fact(FileFact::WalkDir {
            path: dir.clone(),
            subdirs: subdirs.clone(),
            subfiles: subfiles.clone(),
        });

        // Reverse push keeps the traversal in lexicographic order.
        for name in subdirs.iter().rev() {
            let child = dir.join(name);
            if !session.probe.is_symlink(&child) {
                self.stack.push(child);
            }
        }
        Some((dir, subdirs, subfiles))
    }
}
