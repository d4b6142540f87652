use std::any::TypeId;
use std::path::Path;
use std::sync::Arc;

use crate::activation::engine::ActivationEngine;
use crate::deployment::coordinator::DeploymentCoordinator;
use crate::deployment::manager::DeploymentManager;
use crate::kernel::component::{ComponentRegistry, KernelComponent};
use crate::kernel::config::KernelConfig;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::loader::arena::{LoadPolicy, LoaderArena, NodeId};
use crate::loader::source::{CodeSource, StaticSource};
use crate::units::factory::UnitFactory;
use crate::units::registry::UnitRegistry;
use crate::watcher::manager::WatchManager;
use crate::watcher::HotReloadWatcher;

/// One kernel session: owns the unit registry, the loader arena, the
/// activation engine, the deployment coordinator, and the hot-reload
/// watcher, and wires them together explicitly. There is no ambient
/// global state; everything reaches its collaborators through the Arcs
/// handed over here.
pub struct Kernel {
    config: KernelConfig,
    registry: Arc<UnitRegistry>,
    arena: Arc<LoaderArena>,
    baseline_source: Arc<StaticSource>,
    baseline_node: NodeId,
    engine: Arc<ActivationEngine>,
    coordinator: Arc<DeploymentCoordinator>,
    watcher: HotReloadWatcher,
    components: ComponentRegistry,
    component_order: Vec<TypeId>,
    booted: bool,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Result<Self> {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);

        let registry = Arc::new(UnitRegistry::new());
        let arena = Arc::new(LoaderArena::new());
        let baseline_source = Arc::new(StaticSource::new(constants::BASELINE_SOURCE_ID));
        let baseline_node = arena.add_node(
            constants::BASELINE_SOURCE_ID,
            LoadPolicy::ParentFirst,
            None,
            vec![baseline_source.clone() as Arc<dyn CodeSource>],
        );
        let engine = Arc::new(ActivationEngine::new(registry.clone(), arena.clone())?);
        let coordinator = Arc::new(DeploymentCoordinator::new(
            registry.clone(),
            engine.clone(),
            arena.clone(),
            baseline_node,
            config.policy(),
        ));
        let watcher = HotReloadWatcher::new(
            coordinator.clone(),
            config.deploy_dir(),
            config.watch_interval(),
            config.watch_floor(),
        );

        let mut components = ComponentRegistry::new();
        let mut component_order = Vec::new();

        let deployment_manager = Arc::new(DeploymentManager::new(
            coordinator.clone(),
            arena.clone(),
            baseline_node,
            config.lib_dir(),
            config.system_dir(),
            config.extension_order(),
        ));
        components.register_instance(deployment_manager);
        component_order.push(TypeId::of::<DeploymentManager>());

        let watch_manager = Arc::new(WatchManager::new(watcher.clone(), config.watch));
        components.register_instance(watch_manager);
        component_order.push(TypeId::of::<WatchManager>());

        Ok(Kernel {
            config,
            registry,
            arena,
            baseline_source,
            baseline_node,
            engine,
            coordinator,
            watcher,
            components,
            component_order,
            booted: false,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    pub fn arena(&self) -> &Arc<LoaderArena> {
        &self.arena
    }

    pub fn engine(&self) -> &Arc<ActivationEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<DeploymentCoordinator> {
        &self.coordinator
    }

    pub fn watcher(&self) -> &HotReloadWatcher {
        &self.watcher
    }

    pub fn baseline_node(&self) -> NodeId {
        self.baseline_node
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Register a unit factory with the kernel baseline, making it
    /// resolvable from every deployment's loader node.
    pub fn register_factory(&self, key: &str, factory: UnitFactory) -> Result<()> {
        self.baseline_source
            .register_factory(key, factory)
            .map_err(Error::from)
    }

    /// Get a kernel component by its concrete type.
    pub fn component<T: KernelComponent + 'static>(&self) -> Option<Arc<T>> {
        self.components.get_concrete::<T>()
    }

    /// Boot the kernel: initialize every component in registration order,
    /// then start them. The system directory deploys during start, before
    /// hot deployment opens.
    pub async fn boot(&mut self) -> Result<()> {
        if self.booted {
            return Err(Error::KernelLifecycle {
                phase: KernelLifecyclePhase::Bootstrap,
                component: None,
                message: "Kernel already booted".to_string(),
                source: None,
            });
        }

        for phase in [KernelLifecyclePhase::Initialize, KernelLifecyclePhase::Start] {
            for type_id in &self.component_order {
                let Some(component) = self.components.get_by_id(type_id) else {
                    return Err(Error::KernelLifecycle {
                        phase,
                        component: None,
                        message: format!("Component instance missing for {type_id:?}"),
                        source: None,
                    });
                };
                log::info!("{phase:?}: component {}", component.name());
                let outcome = match phase {
                    KernelLifecyclePhase::Initialize => component.initialize().await,
                    _ => component.start().await,
                };
                if let Err(e) = outcome {
                    return Err(Error::KernelLifecycle {
                        phase,
                        component: Some(component.name().to_string()),
                        message: "Component failed".to_string(),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }

        self.booted = true;
        log::info!("{} booted", constants::APP_NAME);
        Ok(())
    }

    /// Shut the kernel down: stop components in reverse order,
    /// best-effort. Every deployment is undeployed in reverse
    /// registration order by the deployment component's stop; the first
    /// error encountered anywhere is reported after the sweep completes.
    pub async fn shutdown(&mut self) -> Result<()> {
        log::info!("Shutting down {}", constants::APP_NAME);
        let mut first_error: Option<Error> = None;
        for type_id in self.component_order.iter().rev() {
            let Some(component) = self.components.get_by_id(type_id) else {
                continue;
            };
            log::info!("Stopping component {}", component.name());
            if let Err(e) = component.stop().await {
                log::error!("Component {} failed to stop: {e}", component.name());
                if first_error.is_none() {
                    first_error = Some(Error::KernelLifecycle {
                        phase: KernelLifecyclePhase::Shutdown,
                        component: Some(component.name().to_string()),
                        message: "Component failed to stop".to_string(),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }
        self.booted = false;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deploy a location through the coordinator.
    pub async fn deploy(&self, location: &Path) -> Result<()> {
        self.coordinator.deploy(location).await
    }

    /// Undeploy a location through the coordinator.
    pub async fn undeploy(&self, location: &Path) -> Result<()> {
        self.coordinator.undeploy(location).await
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("home", &self.config.home)
            .field("booted", &self.booted)
            .field("units", &self.registry.names())
            .finish_non_exhaustive()
    }
}
