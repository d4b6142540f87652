//! # Keel Core
//!
//! A micro-kernel that boots, wires, and tears down independently
//! described components ("units") inside one process. Dependency-aware
//! activation runs units concurrently wherever the dependency graph
//! allows; a family of module-load policies isolates what each
//! deployment's code can see; hot deployment adds and removes unit sets
//! at runtime.

pub mod activation;
pub mod deployment;
pub mod kernel;
pub mod loader;
pub mod units;
pub mod utils;
pub mod watcher;

// Re-export key public types for the binary and embedders
pub use activation::{ActivationEngine, BatchReport};
pub use deployment::{DeployContext, Deployer, DeploymentCoordinator, DeploymentRecord};
pub use kernel::error::{Error, Result};
pub use kernel::{Kernel, KernelConfig};
pub use loader::{CodeSource, LoadPolicy, LoaderArena, NodeId, StaticSource};
pub use units::{UnitDescriptor, UnitFactory, UnitRegistry, UnitState, ValueSpec};
pub use watcher::HotReloadWatcher;

#[cfg(test)]
mod tests;
