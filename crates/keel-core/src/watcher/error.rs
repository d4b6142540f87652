//! # Keel Core Watcher Errors
//!
//! Defines error types specific to the hot-reload watcher.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Hot-reload watcher is already running")]
    AlreadyRunning,

    #[error("Hot-reload watcher is not running")]
    NotRunning,

    #[error("Failed to scan watched directory '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
