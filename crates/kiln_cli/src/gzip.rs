//! The gzip sample: compress a directory tree, one cached operation per
//! output file.
//!
//! For each file in the input directory this produces a compressed file in
//! the output directory with `.gz` appended, mirroring the input's
//! directory structure. On a second run, only files whose contents changed
//! are recompressed; outputs for removed inputs are deleted as orphans.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use serde_json::json;

use kiln_engine::{BuildError, Builder, Engine, Versions};
use kiln_fs::paths;

/// Compresses the files under `input_dir` into `output_dir`. Returns the
/// number of files in the tree.
pub fn gzip_dir(
    engine: &Engine,
    input_dir: &Path,
    output_dir: &Path,
    versions: Versions,
) -> Result<u64, BuildError> {
    let input_dir = paths::normalize(input_dir).map_err(BuildError::from)?;
    let output_dir = paths::normalize(output_dir).map_err(BuildError::from)?;

    engine.build_versioned("gzip_dir", versions, |b| {
        let mut count = 0u64;
        for (dir, _subdirs, subfiles) in b.walk(&input_dir)? {
            for name in subfiles {
                let input = dir.join(&name);
                let relative = input.strip_prefix(&input_dir).map_err(|_| {
                    BuildError::programming(format!(
                        "walked file {} is not under {}",
                        input.display(),
                        input_dir.display()
                    ))
                })?;
                let mut output = output_dir.join(relative).into_os_string();
                output.push(".gz");

                b.build_file(
                    &output,
                    "gzip_file",
                    &[json!(input.to_string_lossy())],
                    |b, out| gzip_file(b, out, &input),
                )?;
                count += 1;
            }
        }
        Ok(count)
    })
}

/// Compresses one input file to `out`.
fn gzip_file(b: &Builder, out: &Path, input: &Path) -> Result<(), BuildError> {
    let bytes = b.read_binary(input)?;
    let file = std::fs::File::create(out)?;
    let mut encoder = GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decompress(path: &Path) -> String {
        let data = std::fs::read(path).unwrap();
        let mut out = String::new();
        GzDecoder::new(&data[..]).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn compresses_a_tree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(input.join("sub")).unwrap();
        std::fs::write(input.join("a.txt"), "hello").unwrap();
        std::fs::write(input.join("sub/b.txt"), "world").unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        let count = gzip_dir(&engine, &input, &output, Versions::new()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(decompress(&output.join("a.txt.gz")), "hello");
        assert_eq!(decompress(&output.join("sub/b.txt.gz")), "world");
    }

    #[test]
    fn removed_input_removes_orphan_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), "hello").unwrap();
        std::fs::write(input.join("b.txt"), "bye").unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        gzip_dir(&engine, &input, &output, Versions::new()).unwrap();
        assert!(output.join("b.txt.gz").is_file());

        std::fs::remove_file(input.join("b.txt")).unwrap();
        let count = gzip_dir(&engine, &input, &output, Versions::new()).unwrap();
        assert_eq!(count, 1);
        assert!(output.join("a.txt.gz").is_file());
        assert!(!output.join("b.txt.gz").exists());
    }

    #[test]
    fn changed_input_recompressed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), "one").unwrap();

        let engine = Engine::new(dir.path().join("kiln.cache"));
        gzip_dir(&engine, &input, &output, Versions::new()).unwrap();
        assert_eq!(decompress(&output.join("a.txt.gz")), "one");

        std::fs::write(input.join("a.txt"), "two, longer").unwrap();
        gzip_dir(&engine, &input, &output, Versions::new()).unwrap();
        assert_eq!(decompress(&output.join("a.txt.gz")), "two, longer");
    }
}
