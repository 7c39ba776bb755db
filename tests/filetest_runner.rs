//! FileCheck-style tests for `.dag` files.
//!
//! Every file under `tests/filetest` carries its own `; RUN:` and `; CHECK:`
//! directives and is validated through `dagsel::text::check`.

use dagsel::text::{TestRunner, TestSpec};
use std::fs;
use std::path::{Path, PathBuf};

fn filetest_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("filetest")
}

/// Discovers all .dag files in a directory recursively
fn discover_dag_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(discover_dag_files(&path));
            } else if path.extension().and_then(|s| s.to_str()) == Some("dag") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn run_filecheck_test(path: &Path) -> Result<(), String> {
    let _ = env_logger::builder().is_test(true).try_init();

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let spec = TestSpec::parse(&contents)
        .map_err(|e| format!("Failed to parse test spec from {}: {}", path.display(), e))?;
    TestRunner::new(false).run_test(&spec)
}

fn run_named(name: &str) {
    let path = filetest_dir().join(name);
    if let Err(e) = run_filecheck_test(&path) {
        panic!("Test {} failed: {}", name, e);
    }
}

#[test]
fn test_fence_filecheck() {
    run_named("fence.dag");
}

#[test]
fn test_fence_atomics_filecheck() {
    run_named("fence_atomics.dag");
}

#[test]
fn test_tls_filecheck() {
    run_named("tls.dag");
}

#[test]
fn test_tls_errors_filecheck() {
    run_named("tls_no_bulk_memory.dag");
    run_named("tls_model.dag");
}

#[test]
fn test_load_store_filecheck() {
    run_named("load_store.dag");
}

#[test]
fn test_asm_filecheck() {
    run_named("asm.dag");
    run_named("asm_unsupported.dag");
}

#[test]
fn test_module_filecheck() {
    run_named("module.dag");
    run_named("wasm64.dag");
}

/// Runs every discovered file, so new files are covered without a named test.
#[test]
fn test_all_filetests() {
    let files = discover_dag_files(&filetest_dir());
    assert!(!files.is_empty(), "no .dag files under {}", filetest_dir().display());

    let mut failures = Vec::new();
    for path in &files {
        if let Err(e) = run_filecheck_test(path) {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }
    println!("Ran {} filetests, {} failed", files.len(), failures.len());
    assert!(failures.is_empty(), "filetest failures:\n{}", failures.join("\n"));
}
