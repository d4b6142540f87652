//! # Keel Core Kernel Errors
//!
//! Defines the top-level error type for the Keel kernel.
//!
//! [`Error`] aggregates the typed error enums of every subsystem (units,
//! activation, loader, deployment, watcher, configuration) and adds the
//! kernel's own lifecycle failures. Subsystem code returns its own enum;
//! `#[from]` conversions lift them into [`Error`] at the kernel boundary.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::activation::error::ActivationError;
use crate::deployment::error::DeploymentError;
use crate::kernel::config::ConfigError;
use crate::loader::error::LoaderError;
use crate::units::error::UnitSystemError;
use crate::watcher::error::WatchError;

/// Boxed error used at the seams where collaborator code (constructors,
/// lifecycle hooks, callbacks) reports failures.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the Keel kernel
#[derive(Debug, ThisError)]
pub enum Error {
    /// Typed unit system error
    #[error("Unit system error: {0}")]
    UnitSystem(#[from] UnitSystemError),

    /// Typed activation engine error
    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    /// Typed module loader error
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    /// Typed deployment error
    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    /// Typed hot-reload watcher error
    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    /// Typed configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase:?}: {message}")]
    KernelLifecycle {
        phase: KernelLifecyclePhase,
        component: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelLifecyclePhase {
    Bootstrap,
    Initialize,
    Start,
    Shutdown,
}

/// Shorthand for Result with the kernel error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
