//! Shared types used across asgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Identifier of a worker node in the fleet.
pub type NodeId = String;

/// Admin listener of the DAS; also recorded as `das_port` in persisted plans.
pub const DAS_ADMIN_PORT: u16 = 4848;

/// HTTP listener of the DAS.
pub const DAS_HTTP_PORT: u16 = 8080;

/// Distance between the base ports of consecutive generated instances.
pub const INSTANCE_PORT_STRIDE: u32 = 0x100;

/// Number of ports each instance owns.
pub const PORTS_PER_INSTANCE: usize = 8;

// ── Ports ─────────────────────────────────────────────────────────

/// One of the eight listeners an instance needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Http,
    HttpSsl,
    Iiop,
    IiopSsl,
    IiopSslMutualauth,
    JmxSystemConnector,
    JmsProvider,
    Asadmin,
}

impl PortKind {
    /// All ports in declaration order. Generation and probing follow this order.
    pub const ALL: [PortKind; PORTS_PER_INSTANCE] = [
        PortKind::Http,
        PortKind::HttpSsl,
        PortKind::Iiop,
        PortKind::IiopSsl,
        PortKind::IiopSslMutualauth,
        PortKind::JmxSystemConnector,
        PortKind::JmsProvider,
        PortKind::Asadmin,
    ];

    /// Key used in persisted plans (`instance<i>.<key>`).
    pub fn property_key(self) -> &'static str {
        match self {
            PortKind::Http => "HTTP_LISTENER_PORT",
            PortKind::HttpSsl => "HTTP_SSL_LISTENER_PORT",
            PortKind::Iiop => "IIOP_LISTENER_PORT",
            PortKind::IiopSsl => "IIOP_SSL_LISTENER_PORT",
            PortKind::IiopSslMutualauth => "IIOP_SSL_MUTUALAUTH_PORT",
            PortKind::JmxSystemConnector => "JMX_SYSTEM_CONNECTOR_PORT",
            PortKind::JmsProvider => "JMS_PROVIDER_PORT",
            PortKind::Asadmin => "ASADMIN_LISTENER_PORT",
        }
    }

    /// Human-readable label for diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            PortKind::Http => "http_listener_port",
            PortKind::HttpSsl => "http_ssl_listener_port",
            PortKind::Iiop => "iiop_listener_port",
            PortKind::IiopSsl => "iiop_ssl_listener_port",
            PortKind::IiopSslMutualauth => "iiop_ssl_mutualauth_port",
            PortKind::JmxSystemConnector => "jmx_system_connector_port",
            PortKind::JmsProvider => "jms_provider_port",
            PortKind::Asadmin => "asadmin_listener_port",
        }
    }
}

/// The eight ports of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    pub http: u16,
    pub http_ssl: u16,
    pub iiop: u16,
    pub iiop_ssl: u16,
    pub iiop_ssl_mutualauth: u16,
    pub jmx_system_connector: u16,
    pub jms_provider: u16,
    pub asadmin: u16,
}

impl PortSet {
    /// Consecutive ports `base..base+7` in declaration order.
    ///
    /// Returns `None` when `base` is zero or the block runs past 65535.
    pub fn from_base(base: u32) -> Option<Self> {
        let last = base.checked_add(PORTS_PER_INSTANCE as u32 - 1)?;
        if base == 0 || last > u32::from(u16::MAX) {
            return None;
        }
        let b = base as u16;
        Some(Self {
            http: b,
            http_ssl: b + 1,
            iiop: b + 2,
            iiop_ssl: b + 3,
            iiop_ssl_mutualauth: b + 4,
            jmx_system_connector: b + 5,
            jms_provider: b + 6,
            asadmin: b + 7,
        })
    }

    /// Ports listed in declaration order.
    pub fn from_ports(ports: [u16; PORTS_PER_INSTANCE]) -> Self {
        let [http, http_ssl, iiop, iiop_ssl, iiop_ssl_mutualauth, jmx_system_connector, jms_provider, asadmin] =
            ports;
        Self {
            http,
            http_ssl,
            iiop,
            iiop_ssl,
            iiop_ssl_mutualauth,
            jmx_system_connector,
            jms_provider,
            asadmin,
        }
    }

    pub fn get(&self, kind: PortKind) -> u16 {
        match kind {
            PortKind::Http => self.http,
            PortKind::HttpSsl => self.http_ssl,
            PortKind::Iiop => self.iiop,
            PortKind::IiopSsl => self.iiop_ssl,
            PortKind::IiopSslMutualauth => self.iiop_ssl_mutualauth,
            PortKind::JmxSystemConnector => self.jmx_system_connector,
            PortKind::JmsProvider => self.jms_provider,
            PortKind::Asadmin => self.asadmin,
        }
    }

    pub fn set(&mut self, kind: PortKind, port: u16) {
        let slot = match kind {
            PortKind::Http => &mut self.http,
            PortKind::HttpSsl => &mut self.http_ssl,
            PortKind::Iiop => &mut self.iiop,
            PortKind::IiopSsl => &mut self.iiop_ssl,
            PortKind::IiopSslMutualauth => &mut self.iiop_ssl_mutualauth,
            PortKind::JmxSystemConnector => &mut self.jmx_system_connector,
            PortKind::JmsProvider => &mut self.jms_provider,
            PortKind::Asadmin => &mut self.asadmin,
        };
        *slot = port;
    }

    /// `(kind, port)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (PortKind, u16)> + '_ {
        PortKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, port)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}={}", kind.property_key(), port)?;
        }
        Ok(())
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// One logical server instance: identity, placement, and ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    /// Assigned node, `None` until node assignment runs.
    pub node: Option<NodeId>,
    /// Installation home on the assigned node.
    pub home_dir: Option<String>,
    /// First port of the block before probing.
    pub base_port: u16,
    pub ports: PortSet,
}

impl InstanceSpec {
    /// Build an unplaced instance whose ports run `base..base+7`.
    pub fn generated(name: impl Into<String>, base: u32) -> CoreResult<Self> {
        let name = name.into();
        let Some(ports) = PortSet::from_base(base) else {
            return Err(CoreError::InvalidPortBlock { name, base });
        };
        Ok(Self {
            name,
            node: None,
            home_dir: None,
            base_port: ports.http,
            ports,
        })
    }

    /// Rebuild an instance verbatim from a persisted record.
    pub fn restored(
        name: impl Into<String>,
        node: impl Into<NodeId>,
        home_dir: impl Into<String>,
        ports: PortSet,
    ) -> Self {
        Self {
            name: name.into(),
            node: Some(node.into()),
            home_dir: Some(home_dir.into()),
            base_port: ports.http,
            ports,
        }
    }

    pub fn node_name(&self) -> &str {
        self.node.as_deref().unwrap_or("")
    }

    /// `"<name> on <node>"`, with the port list appended when `verbose`.
    pub fn describe(&self, verbose: bool) -> String {
        if verbose {
            format!("{} on {}: {}", self.name, self.node_name(), self.ports)
        } else {
            format!("{} on {}", self.name, self.node_name())
        }
    }
}
