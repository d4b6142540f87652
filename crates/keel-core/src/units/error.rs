//! # Keel Core Unit System Errors
//!
//! Defines error types specific to the unit system: registration
//! collisions, dependency resolution failures, construction and
//! lifecycle-hook failures.
use semver::{Version, VersionReq};
use thiserror::Error;

use crate::kernel::error::DynError;

#[derive(Debug, Error)]
pub enum UnitSystemError {
    /// The name is already taken; the existing registration wins.
    #[error("Unit already registered: {name}")]
    DuplicateUnit { name: String },

    /// The referenced name is not part of the batch and not registered,
    /// so the wait would never resolve.
    #[error("Unit '{unit}' depends on '{dependency}', which is neither part of the batch nor registered")]
    UnknownDependency { unit: String, dependency: String },

    /// A dependency terminated in an error state instead of starting.
    #[error("Dependency '{dependency}' of unit '{unit}' did not start")]
    DependencyFailed { unit: String, dependency: String },

    #[error("Dependency cycle detected: {}", .members.join(" -> "))]
    DependencyCycle { members: Vec<String> },

    /// Factory construction or property injection failed.
    #[error("Failed to construct unit '{unit}': {message}")]
    ConstructionFailure {
        unit: String,
        message: String,
        #[source]
        source: Option<DynError>,
    },

    /// A lifecycle, install, or uninstall hook that exists threw.
    #[error("Hook '{hook}' failed for unit '{unit}': {source}")]
    HookFailure {
        unit: String,
        hook: String,
        #[source]
        source: DynError,
    },

    #[error("Unit '{unit}' requires kernel API '{requirement}', but this kernel provides {provided}")]
    KernelRequirement {
        unit: String,
        requirement: VersionReq,
        provided: Version,
    },

    #[error("Unit not found: {name}")]
    NotFound { name: String },
}

impl UnitSystemError {
    /// Construction failure without an underlying cause.
    pub fn construction(unit: impl Into<String>, message: impl Into<String>) -> Self {
        UnitSystemError::ConstructionFailure {
            unit: unit.into(),
            message: message.into(),
            source: None,
        }
    }
}
