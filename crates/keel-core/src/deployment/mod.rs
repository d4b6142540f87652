pub mod coordinator;
pub mod deployer;
pub mod error;
pub mod manager;
pub mod order;
pub mod unit_file;

pub use coordinator::DeploymentCoordinator;
pub use deployer::{DeployContext, Deployer, DeploymentRecord, DylibDeployer};
pub use manager::DeploymentManager;
pub use order::ExtensionOrder;
pub use unit_file::UnitFileDeployer;

#[cfg(test)]
mod tests;
