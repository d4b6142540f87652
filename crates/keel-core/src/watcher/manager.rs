use std::fmt::Debug;

use async_trait::async_trait;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::watcher::HotReloadWatcher;
use crate::watcher::error::WatchError;

/// Kernel component owning the hot-reload watcher lifecycle.
pub struct WatchManager {
    name: &'static str,
    watcher: HotReloadWatcher,
    enabled: bool,
}

impl WatchManager {
    pub fn new(watcher: HotReloadWatcher, enabled: bool) -> Self {
        Self {
            name: "WatchManager",
            watcher,
            enabled,
        }
    }

    pub fn watcher(&self) -> &HotReloadWatcher {
        &self.watcher
    }
}

impl Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("dir", &self.watcher.directory())
            .finish()
    }
}

#[async_trait]
impl KernelComponent for WatchManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.enabled {
            log::info!("Hot deployment disabled by configuration");
            return Ok(());
        }
        self.watcher.start()?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        match self.watcher.stop().await {
            Ok(()) => Ok(()),
            Err(WatchError::NotRunning) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
