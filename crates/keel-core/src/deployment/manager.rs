use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::deployment::coordinator::DeploymentCoordinator;
use crate::deployment::deployer::DylibDeployer;
use crate::deployment::order::ExtensionOrder;
use crate::deployment::unit_file::UnitFileDeployer;
use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::loader::arena::{LoaderArena, NodeId};
use crate::loader::dylib::DylibSource;
use crate::utils::fs as fs_utils;

/// Kernel component driving the deployment coordinator: registers the
/// built-in deployers, loads the library directory into the baseline
/// search path, deploys the system directory once at start, and sweeps
/// all deployments away at stop.
pub struct DeploymentManager {
    name: &'static str,
    coordinator: Arc<DeploymentCoordinator>,
    arena: Arc<LoaderArena>,
    baseline_node: NodeId,
    lib_dir: PathBuf,
    system_dir: PathBuf,
    extensions: ExtensionOrder,
}

impl DeploymentManager {
    pub fn new(
        coordinator: Arc<DeploymentCoordinator>,
        arena: Arc<LoaderArena>,
        baseline_node: NodeId,
        lib_dir: PathBuf,
        system_dir: PathBuf,
        extensions: ExtensionOrder,
    ) -> Self {
        Self {
            name: "DeploymentManager",
            coordinator,
            arena,
            baseline_node,
            lib_dir,
            system_dir,
            extensions,
        }
    }

    pub fn coordinator(&self) -> &Arc<DeploymentCoordinator> {
        &self.coordinator
    }

    /// Load every library in the library directory into the kernel
    /// baseline: local to the baseline node and published to the export
    /// pool.
    fn load_library_dir(&self) -> Result<usize> {
        if !self.lib_dir.is_dir() {
            log::debug!("Library directory {} absent; skipping", self.lib_dir.display());
            return Ok(0);
        }
        let mut count = 0;
        for extension in ["so", "dylib", "dll"] {
            for path in fs_utils::find_files_with_extension(&self.lib_dir, extension)
                .map_err(|e| crate::kernel::error::Error::Other(format!(
                    "Failed to scan library directory {}: {e}",
                    self.lib_dir.display()
                )))?
            {
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("library")
                    .to_string();
                let source = Arc::new(DylibSource::load(&id, &path)?);
                self.arena.replace_export(source.clone());
                self.arena.add_local_source(self.baseline_node, source)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

impl Debug for DeploymentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentManager")
            .field("name", &self.name)
            .field("lib_dir", &self.lib_dir)
            .field("system_dir", &self.system_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for DeploymentManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.coordinator.add_deployer(Arc::new(UnitFileDeployer));
        self.coordinator.add_deployer(Arc::new(DylibDeployer));
        let loaded = self.load_library_dir()?;
        if loaded > 0 {
            log::info!("Loaded {loaded} librarie(s) from {}", self.lib_dir.display());
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.system_dir.is_dir() {
            log::debug!("System directory {} absent; skipping", self.system_dir.display());
            return Ok(());
        }
        let mut files = fs_utils::list_files(&self.system_dir).map_err(|e| {
            crate::kernel::error::Error::Other(format!(
                "Failed to scan system directory {}: {e}",
                self.system_dir.display()
            ))
        })?;
        self.extensions.sort(&mut files);
        log::info!(
            "Deploying {} system file(s) from {}",
            files.len(),
            self.system_dir.display()
        );
        self.coordinator.deploy_all(&files).await
    }

    async fn stop(&self) -> Result<()> {
        self.coordinator.shutdown_sweep().await
    }
}
