//! # Keel Core Deployment Errors
//!
//! Defines error types specific to the deployment coordinator and its
//! pluggable deployers.
use std::path::PathBuf;

use thiserror::Error;

use crate::kernel::error::{DynError, Error};

#[derive(Debug, Error)]
pub enum DeploymentError {
    /// A deployer threw; later deployers for the same location were not run.
    #[error("Deployer '{deployer}' failed for '{}': {source}", .location.display())]
    DeployerFailed {
        deployer: String,
        location: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Nothing is deployed from location: {}", .0.display())]
    NoMatchingRecord(PathBuf),

    #[error("Failed to read unit descriptors from '{}': {source}", .path.display())]
    DescriptorParse {
        path: PathBuf,
        #[source]
        source: DynError,
    },

    #[error("Descriptor file '{}': {message}", .path.display())]
    InvalidDescriptor { path: PathBuf, message: String },

    #[error("Phase hook '{phase}' failed for unit '{unit}': {message}")]
    PhaseHook {
        unit: String,
        phase: String,
        message: String,
    },
}
