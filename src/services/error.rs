//! Error taxonomy for the route-generation pipeline
//!
//! Callers need to tell "impossible" (infeasible constraints) apart from
//! "took too long" (timeout) and from their own bugs (invalid input), so
//! each condition gets its own variant instead of a stringly anyhow error.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by clustering and routing.
///
/// Everything here is caught exactly once, at the job-processing boundary,
/// and recorded on the FAILED job row; nothing propagates past the worker
/// loop.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Caller's bug: empty input, non-positive counts. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The capacity caps cannot be satisfied for this location count and
    /// cluster count, detected before any clustering work begins.
    #[error("infeasible constraints: {0}")]
    Infeasible(String),

    /// A clustering/routing stage exceeded its time budget.
    #[error("{stage} exceeded timeout of {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// Data-integrity violation: clustering and routing require coordinates.
    #[error("location {0} is missing latitude")]
    MissingLatitude(Uuid),

    #[error("location {0} is missing longitude")]
    MissingLongitude(Uuid),

    /// Non-success status or malformed payload from an external service.
    #[error("routing service error: {0}")]
    Service(String),
}

impl GenerationError {
    pub fn timeout(stage: &'static str, timeout: Duration) -> Self {
        Self::Timeout { stage, timeout }
    }
}
