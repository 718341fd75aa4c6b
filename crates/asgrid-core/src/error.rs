//! Error types for asgrid core types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building instances or validating a plan request.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid base port {base} for instance {name}: block must fit in 1..=65535")]
    InvalidPortBlock { name: String, base: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
