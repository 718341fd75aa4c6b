//! Planner error types.

use thiserror::Error;

use crate::oracle::ProbeError;
use crate::topology::TopologyPhase;

/// Errors that abort a planning run.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid cluster configuration: {0}")]
    Config(String),

    #[error("invalid custom instance entries: {}", .0.join(", "))]
    InvalidOverrides(Vec<String>),

    #[error(
        "not enough nodes available for instance deployment (required: {required}, available: {available}, label: {label})"
    )]
    NotEnoughNodes {
        required: usize,
        available: usize,
        label: String,
    },

    #[error("no free port on {node} starting at {start} after {attempts} attempts ({label})")]
    PortsExhausted {
        node: String,
        start: u16,
        attempts: u32,
        label: String,
    },

    #[error("instance {0} has no node assigned")]
    Unassigned(String),

    #[error("cannot {operation} while topology is {phase:?}")]
    Phase {
        operation: &'static str,
        phase: TopologyPhase,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Core(#[from] asgrid_core::CoreError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
