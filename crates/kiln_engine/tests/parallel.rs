//! Thread-parallel builds: independent operations run concurrently, and
//! identical operations are single-flight.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;

use serde_json::json;

use kiln_engine::{BuildError, Engine};

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn independent_build_files_run_on_many_threads() {
    const K: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    for i in 0..K {
        write(&dir.path().join(format!("in/{i}.txt")), &format!("input {i}"));
    }

    let engine = Engine::new(dir.path().join("kiln.cache"));
    let results: Vec<String> = engine
        .build("fan_out", |b| {
            let outputs: Vec<Result<String, BuildError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..K)
                    .map(|i| {
                        let out = out.join(format!("{i}.txt"));
                        let input = dir.path().join(format!("in/{i}.txt"));
                        scope.spawn(move || {
                            b.build_file(
                                &out,
                                "copy_file",
                                &[json!(input.to_string_lossy())],
                                |b, o| {
                                    let text = b.read_text(&input)?;
                                    std::fs::write(o, &text)?;
                                    Ok(text)
                                },
                            )
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            outputs.into_iter().collect()
        })
        .unwrap();

    assert_eq!(results.len(), K);
    for (i, text) in results.iter().enumerate() {
        assert_eq!(text, &format!("input {i}"));
        assert_eq!(
            std::fs::read_to_string(out.join(format!("{i}.txt"))).unwrap(),
            format!("input {i}")
        );
    }
}

#[test]
fn identical_operations_are_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out/shared.txt");
    write(&input, "shared input");

    let engine = Engine::new(dir.path().join("kiln.cache"));
    let runs = AtomicUsize::new(0);
    let barrier = Barrier::new(2);

    let (first, second) = engine
        .build("race", |b| {
            let call = || {
                barrier.wait();
                b.build_file(
                    &output,
                    "copy_file",
                    &[json!(input.to_string_lossy())],
                    |b, o| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        // Give the other caller time to arrive and block.
                        std::thread::sleep(std::time::Duration::from_millis(50));
                        let text = b.read_text(&input)?;
                        std::fs::write(o, &text)?;
                        Ok(text)
                    },
                )
            };
            let (first, second) = std::thread::scope(|scope| {
                let one = scope.spawn(&call);
                let two = scope.spawn(&call);
                (one.join().unwrap(), two.join().unwrap())
            });
            Ok((first?, second?))
        })
        .unwrap();

    assert_eq!(first, "shared input");
    assert_eq!(first, second, "both callers observe the same result");
    assert_eq!(
        runs.load(Ordering::SeqCst),
        1,
        "exactly one invocation occurs"
    );
}

#[test]
fn same_path_from_different_operations_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out/contested.txt");

    let engine = Engine::new(dir.path().join("kiln.cache"));
    let err = engine
        .build("contested", |b| {
            b.build_file(&output, "emit_one", &[], |_b, o| {
                std::fs::write(o, "one")?;
                Ok(())
            })?;
            b.build_file(&output, "emit_two", &[], |_b, o| {
                std::fs::write(o, "two")?;
                Ok(())
            })
        })
        .unwrap_err();

    assert!(matches!(err, BuildError::Programming { .. }));
}

#[test]
fn parallel_result_equals_serial_result() {
    const K: usize = 4;
    let serial_dir = tempfile::tempdir().unwrap();
    let parallel_dir = tempfile::tempdir().unwrap();

    let run = |root: &Path, parallel: bool| -> Vec<String> {
        for i in 0..K {
            write(&root.join(format!("in/{i}.txt")), &format!("data {i}"));
        }
        let out = root.join("out");
        let engine = Engine::new(root.join("kiln.cache"));
        engine
            .build("compare", |b| {
                let compress = |i: usize| -> Result<String, BuildError> {
                    let input = root.join(format!("in/{i}.txt"));
                    b.build_file(
                        out.join(format!("{i}.txt")),
                        "copy_file",
                        &[json!(input.to_string_lossy())],
                        |b, o| {
                            let text = b.read_text(&input)?;
                            std::fs::write(o, text.to_uppercase())?;
                            Ok(text)
                        },
                    )
                };
                if parallel {
                    std::thread::scope(|scope| {
                        let compress = &compress;
                        let handles: Vec<_> =
                            (0..K).map(|i| scope.spawn(move || compress(i))).collect();
                        handles.into_iter().map(|h| h.join().unwrap()).collect()
                    })
                } else {
                    (0..K).map(compress).collect()
                }
            })
            .unwrap()
    };

    let serial = run(serial_dir.path(), false);
    let parallel = run(parallel_dir.path(), true);
    assert_eq!(serial, parallel);

    for i in 0..K {
        assert_eq!(
            std::fs::read(serial_dir.path().join(format!("out/{i}.txt"))).unwrap(),
            std::fs::read(parallel_dir.path().join(format!("out/{i}.txt"))).unwrap()
        );
    }
}

#[test]
fn cycles_are_reported_as_programming_errors() {
    fn recurse(b: &kiln_engine::Builder) -> Result<i64, BuildError> {
        b.subbuild("recurse", &[], recurse)
    }

    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(dir.path().join("kiln.cache"));
    let err = engine
        .build("cyclic", |b| b.subbuild("recurse", &[], recurse))
        .unwrap_err();
    assert!(matches!(err, BuildError::Programming { .. }));
}
