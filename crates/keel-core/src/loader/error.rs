//! # Keel Core Loader Errors
//!
//! Defines error types specific to the module loader: delegate-chain
//! exhaustion, arena bookkeeping failures, and dynamic library loading
//! problems.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    /// Every delegate in the configured order was consulted and none held
    /// the symbol.
    #[error("No delegate of loader node '{node}' could resolve '{symbol}' (tried: {})", .tried.join(", "))]
    ResolveFailure {
        symbol: String,
        node: String,
        tried: Vec<String>,
    },

    #[error("Code source '{source_id}' already provides symbol '{symbol}'")]
    DuplicateSymbol { source_id: String, symbol: String },

    #[error("A code source with id '{id}' is already exported")]
    DuplicateExport { id: String },

    #[error("Unknown loader node id {0}")]
    NodeNotFound(usize),

    #[error("Failed to load library '{path}': {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Library '{path}' failed during unit registration: {message}")]
    RegistrationFailed { path: PathBuf, message: String },
}
