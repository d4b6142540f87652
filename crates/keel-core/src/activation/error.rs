//! # Keel Core Activation Errors
//!
//! Batch-level errors reported by the activation engine. Per-unit
//! failures are typed as [`UnitSystemError`](crate::units::error::UnitSystemError)
//! and carried in the batch report; this module aggregates them for the
//! caller-facing deploy result.
use std::sync::Arc;

use thiserror::Error;

use crate::kernel::error::Error;

#[derive(Debug, Error)]
pub enum ActivationError {
    /// One or more units in the batch failed. Successful units stay
    /// registered; the first underlying cause is referenced here.
    #[error("Activation batch failed: {failed} of {total} unit(s) failed; first error: {first}")]
    BatchFailed {
        total: usize,
        failed: usize,
        units: Vec<String>,
        first: Arc<Error>,
    },
}
