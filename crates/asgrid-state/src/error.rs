//! Error types for plan persistence.

use thiserror::Error;

/// Result type alias for persistence operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while saving or loading a plan.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("missing property: {0}")]
    MissingProperty(String),

    #[error("invalid property {key}={value}: {reason}")]
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },

    #[error("plan is not ready to persist: {0}")]
    Incomplete(String),

    #[error(transparent)]
    Placement(#[from] asgrid_placement::PlacementError),
}
