//! Narrow interfaces to the fleet the planner runs against.
//!
//! The planner never changes remote state. It asks whether a node is usable,
//! whether a port is free on it, and where the server bundle lives there.

use std::io::ErrorKind;
use std::net::TcpListener;

use thiserror::Error;
use tracing::debug;

use asgrid_core::NodeId;

/// A liveness or port check that errored instead of answering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("probe of node {node} failed: {reason}")]
pub struct ProbeError {
    pub node: NodeId,
    pub reason: String,
}

impl ProbeError {
    pub fn new(node: &str, reason: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}

/// Liveness view over the worker pool, supplied by the fleet manager.
pub trait NodeLiveness {
    fn is_online(&self, node: &str) -> Result<bool, ProbeError>;

    /// Number of execution slots the node offers.
    fn executor_slots(&self, node: &str) -> Result<u32, ProbeError>;

    fn labels(&self, node: &str) -> Result<Vec<String>, ProbeError>;
}

/// Remote "is this port bindable" check.
pub trait PortProbe {
    fn is_port_free(&self, node: &str, port: u16) -> Result<bool, ProbeError>;
}

/// Where the server bundle is (or will be) installed on a node.
pub trait Installer {
    fn installed_home_dir(&self, node: &str) -> String;
}

impl<T: NodeLiveness + ?Sized> NodeLiveness for &T {
    fn is_online(&self, node: &str) -> Result<bool, ProbeError> {
        (**self).is_online(node)
    }

    fn executor_slots(&self, node: &str) -> Result<u32, ProbeError> {
        (**self).executor_slots(node)
    }

    fn labels(&self, node: &str) -> Result<Vec<String>, ProbeError> {
        (**self).labels(node)
    }
}

impl<T: PortProbe + ?Sized> PortProbe for &T {
    fn is_port_free(&self, node: &str, port: u16) -> Result<bool, ProbeError> {
        (**self).is_port_free(node, port)
    }
}

impl<T: Installer + ?Sized> Installer for &T {
    fn installed_home_dir(&self, node: &str) -> String {
        (**self).installed_home_dir(node)
    }
}

/// Same installation directory on every node.
#[derive(Debug, Clone)]
pub struct FixedHome(pub String);

impl Installer for FixedHome {
    fn installed_home_dir(&self, _node: &str) -> String {
        self.0.clone()
    }
}

/// Port probe for the machine the planner runs on.
///
/// A port counts as free when a listener can bind it on all interfaces.
/// Questions about any other node are answered with an error.
#[derive(Debug, Clone)]
pub struct LocalPortProbe {
    node: NodeId,
}

impl LocalPortProbe {
    pub fn new(node: impl Into<NodeId>) -> Self {
        Self { node: node.into() }
    }
}

impl PortProbe for LocalPortProbe {
    fn is_port_free(&self, node: &str, port: u16) -> Result<bool, ProbeError> {
        if node != self.node {
            return Err(ProbeError::new(node, "local probe cannot reach remote node"));
        }
        match TcpListener::bind(("0.0.0.0", port)) {
            Ok(_listener) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::AddrInUse | ErrorKind::PermissionDenied | ErrorKind::AddrNotAvailable
                ) =>
            {
                debug!(%node, port, error = %e, "port not bindable");
                Ok(false)
            }
            Err(e) => Err(ProbeError::new(node, e.to_string())),
        }
    }
}
