//! Integration tests for the file-driven merge.
//!
//! These tests use the instrumentation and runtime fixtures under
//! `tests/fixtures` to exercise the public API.

use std::fs;
use std::path::PathBuf;

use opcost_merge::{MergeStats, run};
use opcost_schemas::InstrumentationDocument;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(name)
}

#[test]
fn merges_fixture_profiles() {
    let out = TempDir::new().unwrap();
    let output = out.path().join("merged.yaml");

    let stats = run(
        &fixture("histograms.yaml"),
        &fixture("runtime.yaml"),
        &output,
    )
    .expect("run() should succeed");
    assert_eq!(
        stats,
        MergeStats {
            matched_functions: 2,
            unmatched_functions: 1,
            blocks_labeled: 3,
        }
    );

    let merged: InstrumentationDocument =
        serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let per_function: Vec<(String, Vec<Option<f64>>)> = merged
        .functions()
        .map(|f| (f.name.clone(), f.blocks().map(|b| b.cycles).collect()))
        .collect();
    assert_eq!(
        per_function,
        vec![
            ("main".to_owned(), vec![Some(5200.0), Some(5200.0)]),
            // The last listed runtime block wins.
            ("partition".to_owned(), vec![Some(84.5)]),
            ("never_called".to_owned(), vec![Some(0.0)]),
        ]
    );

    // Block ids and histograms pass through untouched.
    let main = merged.functions().next().unwrap();
    let first = main.blocks().next().unwrap();
    assert_eq!(first.id, Some(94512));
    assert_eq!(
        first.histogram.entries().collect::<Vec<_>>(),
        vec![(12, 3), (31, 1)]
    );
}

#[test]
fn merged_output_uses_upstream_keys() {
    let out = TempDir::new().unwrap();
    let output = out.path().join("merged.yaml");
    run(
        &fixture("histograms.yaml"),
        &fixture("runtime.yaml"),
        &output,
    )
    .unwrap();

    let text = fs::read_to_string(&output).unwrap();
    for key in ["Instrumentation_data", "BasicBlocks", "OpCodes", "Cycles", "ID"] {
        assert!(text.contains(key), "missing key {key} in\n{text}");
    }
}

#[test]
fn missing_input_writes_nothing() {
    let out = TempDir::new().unwrap();
    let output = out.path().join("merged.yaml");

    let err = run(
        &fixture("histograms.yaml"),
        &fixture("no_such_runtime.yaml"),
        &output,
    )
    .unwrap_err();
    assert!(err.is_missing_file());
    assert_eq!(err.path(), Some(fixture("no_such_runtime.yaml").as_path()));

    let err = run(
        &fixture("no_such_histograms.yaml"),
        &fixture("runtime.yaml"),
        &output,
    )
    .unwrap_err();
    assert!(err.is_missing_file());
    assert!(!output.exists());
}

#[test]
fn swapped_inputs_fail_to_parse() {
    let out = TempDir::new().unwrap();
    let output = out.path().join("merged.yaml");

    // A runtime profile has no `Instrumentation_data` section.
    let err = run(
        &fixture("runtime.yaml"),
        &fixture("histograms.yaml"),
        &output,
    )
    .unwrap_err();
    assert!(err.is_deserialization());
    assert_eq!(err.path(), Some(fixture("runtime.yaml").as_path()));
    assert!(!output.exists());
}

#[test]
fn histogram_input_must_be_instrumentation_data() {
    let out = TempDir::new().unwrap();
    let output = out.path().join("merged.yaml");

    let err = run(&fixture("runtime.yaml"), &fixture("runtime.yaml"), &output)
        .unwrap_err();
    assert!(err.is_deserialization());
    assert_eq!(err.path(), Some(fixture("runtime.yaml").as_path()));
    assert!(!output.exists());
}
