use std::fs;

use tempfile::TempDir;

use crate::utils::fs::{find_files, find_files_with_extension, list_files};

#[test]
fn find_files_recurses_with_a_predicate() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("top.unit"), "{}").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested/inner.unit"), "{}").unwrap();
    fs::write(tmp.path().join("nested/other.txt"), "x").unwrap();

    let found = find_files(tmp.path(), &|p: &std::path::Path| {
        p.extension().is_some_and(|e| e == "unit")
    })
    .unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn find_files_with_extension_ignores_case() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("LOUD.UNIT"), "{}").unwrap();
    fs::write(tmp.path().join("quiet.unit"), "{}").unwrap();

    let found = find_files_with_extension(tmp.path(), "unit").unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn missing_paths_yield_empty_results() {
    let found = find_files_with_extension("/no/such/place", "unit").unwrap();
    assert!(found.is_empty());
}

#[test]
fn list_files_is_flat_and_sorted() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("b.unit"), "{}").unwrap();
    fs::write(tmp.path().join("a.unit"), "{}").unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("sub/c.unit"), "{}").unwrap();

    let files = list_files(tmp.path()).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("a.unit"));
    assert!(files[1].ends_with("b.unit"));
}
