pub mod capability;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod registry;

// Re-export the types most callers need
pub use capability::{CallbackId, CapabilityCallback, DeployPhase, PhaseListener};
pub use descriptor::{HookCallSpec, HookKind, PropertySpec, UnitDescriptor, ValueSpec};
pub use factory::{ResolvedValue, UnitFactory, UnitInstance};
pub use registry::{TeardownSpec, UnitRegistry, UnitState};

#[cfg(test)]
mod tests;
