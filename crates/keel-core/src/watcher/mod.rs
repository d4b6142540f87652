//! Hot deployment by polling.
//!
//! The watcher diffs the watched directory against a remembered snapshot
//! on a fixed interval and drives the coordinator accordingly: removed
//! and changed files are undeployed, changed and new files deployed.
//! Polling over filesystem events is a deliberate choice: one scan loop,
//! no platform notification backends.
pub mod error;
pub mod manager;
pub mod snapshot;

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::deployment::coordinator::{DeploymentCoordinator, PhaseFailureMode};
use crate::watcher::error::WatchError;
use crate::watcher::snapshot::DirectorySnapshot;

pub use manager::WatchManager;

/// What one scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub undeployed: usize,
    pub deployed: usize,
    pub failures: usize,
}

struct RunningState {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct WatcherInner {
    coordinator: Arc<DeploymentCoordinator>,
    dir: PathBuf,
    interval: Duration,
    floor: Duration,
    snapshot: Mutex<DirectorySnapshot>,
    running: StdMutex<Option<RunningState>>,
}

/// Polling hot-reload watcher with two states, idle and running.
#[derive(Clone)]
pub struct HotReloadWatcher {
    inner: Arc<WatcherInner>,
}

impl HotReloadWatcher {
    pub fn new(
        coordinator: Arc<DeploymentCoordinator>,
        dir: PathBuf,
        interval: Duration,
        floor: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                coordinator,
                dir,
                interval,
                floor,
                snapshot: Mutex::new(DirectorySnapshot::default()),
                running: StdMutex::new(None),
            }),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.inner.dir
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Transition idle → running; spawns the scan loop.
    pub fn start(&self) -> Result<(), WatchError> {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(WatchError::AlreadyRunning);
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let handle = tokio::spawn(run_loop(inner, stop_rx));
        *running = Some(RunningState {
            stop: stop_tx,
            handle,
        });
        log::info!("Hot-reload watcher started for {}", self.inner.dir.display());
        Ok(())
    }

    /// Transition running → idle; waits for the loop to wind down.
    pub async fn stop(&self) -> Result<(), WatchError> {
        let state = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(WatchError::NotRunning)?;
        let _ = state.stop.send(true);
        if let Err(e) = state.handle.await {
            log::warn!("Hot-reload loop ended abnormally: {e}");
        }
        log::info!("Hot-reload watcher stopped for {}", self.inner.dir.display());
        Ok(())
    }

    /// One scan, decoupled from the loop for deterministic driving.
    pub async fn scan_once(&self) -> Result<ScanSummary, WatchError> {
        scan_once_inner(&self.inner).await
    }
}

impl fmt::Debug for HotReloadWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotReloadWatcher")
            .field("dir", &self.inner.dir)
            .field("interval", &self.inner.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_loop(inner: Arc<WatcherInner>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        let began = Instant::now();
        match scan_once_inner(&inner).await {
            Ok(summary) if summary.failures > 0 => {
                log::warn!(
                    "Hot-reload scan finished with {} failure(s)",
                    summary.failures
                );
            }
            Ok(_) => {}
            Err(e) => log::warn!("Hot-reload scan failed: {e}"),
        }
        // Overrun ticks shorten the next sleep, but never below the floor,
        // so a slow scan cannot degenerate into a tight spin.
        let elapsed = began.elapsed();
        let sleep_for = inner
            .interval
            .checked_sub(elapsed)
            .unwrap_or(Duration::ZERO)
            .max(inner.floor);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

async fn scan_once_inner(inner: &WatcherInner) -> Result<ScanSummary, WatchError> {
    let mut snapshot = inner.snapshot.lock().await;
    let current = DirectorySnapshot::scan(&inner.dir)?;
    let diff = snapshot.diff(&current);
    if diff.is_empty() {
        return Ok(ScanSummary::default());
    }
    log::info!(
        "Hot-reload scan of {}: {} removed, {} changed, {} new",
        inner.dir.display(),
        diff.removed.len(),
        diff.changed.len(),
        diff.added.len()
    );

    let mut summary = ScanSummary::default();
    let mut redeploy: Vec<PathBuf> = Vec::new();

    for path in diff.removed.iter().chain(diff.changed.iter()) {
        match inner
            .coordinator
            .undeploy_with_mode(path, PhaseFailureMode::LogOnly)
            .await
        {
            Ok(()) => {
                summary.undeployed += 1;
                if diff.changed.contains(path) {
                    redeploy.push(path.clone());
                } else {
                    snapshot.remove(path);
                }
            }
            Err(e) => {
                log::warn!("Undeploy of {} failed: {e}", path.display());
                summary.failures += 1;
            }
        }
    }

    // Changed files whose undeploy failed are left out of this pass and
    // keep their old snapshot entry, so the next tick retries them.
    for path in redeploy.iter().chain(diff.added.iter()) {
        match inner
            .coordinator
            .deploy_with_mode(path, PhaseFailureMode::LogOnly)
            .await
        {
            Ok(()) => {
                summary.deployed += 1;
                if let Some(modified) = current.get(path) {
                    snapshot.set(path.clone(), modified);
                }
            }
            Err(e) => {
                log::warn!("Deploy of {} failed: {e}", path.display());
                summary.failures += 1;
            }
        }
    }
    Ok(summary)
}
