use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::watcher::error::WatchError;

/// Remembered file list of the watched directory: path → modification
/// timestamp, files only, non-recursive.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    entries: HashMap<PathBuf, SystemTime>,
}

/// Disjoint change sets between two snapshots, each sorted for
/// deterministic processing order.
#[derive(Debug, Default)]
pub struct SnapshotDiff {
    pub removed: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub added: Vec<PathBuf>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.changed.is_empty() && self.added.is_empty()
    }
}

impl DirectorySnapshot {
    /// Snapshot a directory's current contents. A missing directory is an
    /// empty snapshot, not an error; it may appear between scans.
    pub fn scan(dir: &Path) -> Result<Self, WatchError> {
        let mut snapshot = DirectorySnapshot::default();
        if !dir.is_dir() {
            return Ok(snapshot);
        }
        let scan_error = |source: std::io::Error| WatchError::Scan {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(scan_error)? {
            let entry = entry.map_err(scan_error)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(scan_error)?;
            snapshot.entries.insert(path, modified);
        }
        Ok(snapshot)
    }

    /// Change sets of `next` relative to this snapshot.
    pub fn diff(&self, next: &DirectorySnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();
        for (path, modified) in &self.entries {
            match next.entries.get(path) {
                None => diff.removed.push(path.clone()),
                Some(next_modified) if next_modified != modified => {
                    diff.changed.push(path.clone());
                }
                Some(_) => {}
            }
        }
        for path in next.entries.keys() {
            if !self.entries.contains_key(path) {
                diff.added.push(path.clone());
            }
        }
        diff.removed.sort();
        diff.changed.sort();
        diff.added.sort();
        diff
    }

    pub fn get(&self, path: &Path) -> Option<SystemTime> {
        self.entries.get(path).copied()
    }

    pub fn set(&mut self, path: PathBuf, modified: SystemTime) {
        self.entries.insert(path, modified);
    }

    pub fn remove(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
