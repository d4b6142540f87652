use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::watcher::snapshot::DirectorySnapshot;

fn bump_mtime(path: &Path, ahead: Duration) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + ahead).unwrap();
}

#[test]
fn missing_directories_scan_empty() {
    let snapshot = DirectorySnapshot::scan(Path::new("/definitely/not/here")).unwrap();
    assert!(snapshot.is_empty());
}

#[test]
fn scan_sees_files_but_not_directories() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.unit"), "{}").unwrap();
    fs::create_dir(tmp.path().join("subdir")).unwrap();

    let snapshot = DirectorySnapshot::scan(tmp.path()).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains(&tmp.path().join("a.unit")));
}

#[test]
fn diff_partitions_removed_changed_and_new() {
    let tmp = TempDir::new().unwrap();
    let keep = tmp.path().join("keep.unit");
    let change = tmp.path().join("change.unit");
    let remove = tmp.path().join("remove.unit");
    for path in [&keep, &change, &remove] {
        fs::write(path, "{}").unwrap();
    }
    let before = DirectorySnapshot::scan(tmp.path()).unwrap();

    fs::remove_file(&remove).unwrap();
    bump_mtime(&change, Duration::from_secs(10));
    let fresh = tmp.path().join("fresh.unit");
    fs::write(&fresh, "{}").unwrap();
    let after = DirectorySnapshot::scan(tmp.path()).unwrap();

    let diff = before.diff(&after);
    assert_eq!(diff.removed, vec![remove]);
    assert_eq!(diff.changed, vec![change]);
    assert_eq!(diff.added, vec![fresh]);
}

#[test]
fn identical_snapshots_diff_empty() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.unit"), "{}").unwrap();
    let first = DirectorySnapshot::scan(tmp.path()).unwrap();
    let second = DirectorySnapshot::scan(tmp.path()).unwrap();
    assert!(first.diff(&second).is_empty());
}

#[test]
fn manual_updates_round_trip() {
    let mut snapshot = DirectorySnapshot::default();
    let path = Path::new("x.unit").to_path_buf();
    let stamp = SystemTime::now();
    snapshot.set(path.clone(), stamp);
    assert_eq!(snapshot.get(&path), Some(stamp));
    snapshot.remove(&path);
    assert!(snapshot.is_empty());
}
