//! Error taxonomy shared across all scrim subsystems
//!
//! Every failure that can cross the control-plane boundary is classified here.
//! Validation failures (`InvalidArgument`) are raised before any mutation
//! begins, so an invalid request never partially applies. Host negotiation
//! failures unrelated to caller input surface as `Internal`.

use thiserror::Error;

/// Boundary-visible error kinds for registry, router, and surface operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScrimError {
    /// Malformed or unrecognized enum value / id shape
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on an unknown or already-closed layer id
    #[error("layer {0} not found")]
    NotFound(u64),

    /// Request the target layer's current policy cannot satisfy
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Id space exhaustion; practically unreachable and treated as fatal
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Host negotiation failure unrelated to caller input
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScrimError {
    /// Wire-level status string for the control protocol
    pub fn status(&self) -> &'static str {
        match self {
            ScrimError::InvalidArgument(_) => "invalid_argument",
            ScrimError::NotFound(_) => "not_found",
            ScrimError::FailedPrecondition(_) => "failed_precondition",
            ScrimError::ResourceExhausted(_) => "resource_exhausted",
            ScrimError::Internal(_) => "internal",
        }
    }
}

/// Convenience alias used throughout the core modules
pub type ScrimResult<T> = Result<T, ScrimError>;
