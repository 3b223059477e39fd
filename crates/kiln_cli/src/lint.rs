//! The lint sample: per-file lint results cached across runs.
//!
//! Lints every file with the given extension under a directory. Each
//! file's result is a subbuild keyed by its path, so a second run re-lints
//! only the files whose contents changed and reuses the cached output for
//! the rest.

use std::path::Path;

use serde_json::json;

use kiln_engine::{BuildError, Builder, Engine, Versions};
use kiln_fs::paths;

/// Longest line accepted before a lint complaint.
const MAX_LINE_LEN: usize = 100;

/// Lints the files under `dir` with extension `ext` and returns the
/// combined report, one line per finding.
pub fn lint_dir(
    engine: &Engine,
    dir: &Path,
    ext: &str,
    versions: Versions,
) -> Result<String, BuildError> {
    let dir = paths::normalize(dir).map_err(BuildError::from)?;
    let suffix = format!(".{ext}");

    engine.build_versioned("lint_dir", versions, |b| {
        let mut files = Vec::new();
        for (walked, _subdirs, subfiles) in b.walk(&dir)? {
            for name in subfiles {
                if name.ends_with(&suffix) {
                    files.push(walked.join(&name));
                }
            }
        }

        let mut output = String::new();
        for file in &files {
            let arg = file.to_string_lossy();
            let file_output: String =
                b.subbuild("lint_file", &[json!(arg)], |b| lint_file(b, file))?;
            output.push_str(&file_output);
        }
        Ok(output)
    })
}

/// Lints one file, returning its findings as report lines.
fn lint_file(b: &Builder, file: &Path) -> Result<String, BuildError> {
    let text = b.read_text(file)?;
    let mut output = String::new();
    let display = file.display();

    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        if line.chars().count() > MAX_LINE_LEN {
            output.push_str(&format!(
                "{display}:{lineno}: line longer than {MAX_LINE_LEN} characters\n"
            ));
        }
        if line.ends_with(' ') || line.ends_with('\t') {
            output.push_str(&format!("{display}:{lineno}: trailing whitespace\n"));
        }
        if line.contains('\t') {
            output.push_str(&format!("{display}:{lineno}: tab character\n"));
        }
    }
    if !text.is_empty() && !text.ends_with('\n') {
        output.push_str(&format!("{display}: no newline at end of file\n"));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_findings_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("clean.rs"), "fn main() {}\n").unwrap();
        std::fs::write(src.join("messy.rs"), "fn main() {\t}   \n").unwrap();
        std::fs::write(src.join("notes.txt"), "ignored   \n").unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        let report = lint_dir(&engine, &src, "rs", Versions::new()).unwrap();

        assert!(report.contains("messy.rs:1: trailing whitespace"));
        assert!(report.contains("messy.rs:1: tab character"));
        assert!(!report.contains("clean.rs"));
        assert!(!report.contains("notes.txt"));
    }

    #[test]
    fn long_lines_and_missing_newline_reported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let long = "x".repeat(MAX_LINE_LEN + 1);
        std::fs::write(src.join("long.rs"), long).unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        let report = lint_dir(&engine, &src, "rs", Versions::new()).unwrap();

        assert!(report.contains("long.rs:1: line longer than"));
        assert!(report.contains("no newline at end of file"));
    }

    #[test]
    fn second_run_reuses_unchanged_results() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("a.rs"), "fn a() {}  \n").unwrap();
        std::fs::write(src.join("b.rs"), "fn b() {}\n").unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        let first = lint_dir(&engine, &src, "rs", Versions::new()).unwrap();
        let second = lint_dir(&engine, &src, "rs", Versions::new()).unwrap();
        assert_eq!(first, second);
    }
}
