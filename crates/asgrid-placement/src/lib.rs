//! asgrid planner — turns a cluster request into a placed, port-resolved topology.
//!
//! This crate decides which node runs which instance and which ports each
//! instance listens on. It does NOT install or start anything; it only talks
//! to the fleet through the narrow traits in [`oracle`].
//!
//! # Components
//!
//! - **`selector`** — label/liveness filtering and shuffled node choice
//! - **`ports`** — probe-until-free port allocation with a per-node claim ledger
//! - **`overrides`** — user `name=port` overrides merged onto generated instances
//! - **`cluster_map`** — insertion-ordered instance lookup table
//! - **`topology`** — the planning run itself (generate, assign, resolve)

pub mod cluster_map;
pub mod error;
pub mod oracle;
pub mod overrides;
pub mod ports;
pub mod selector;
pub mod topology;

pub use cluster_map::ClusterMap;
pub use error::{PlacementError, PlacementResult};
pub use oracle::{FixedHome, Installer, LocalPortProbe, NodeLiveness, PortProbe, ProbeError};
pub use overrides::{OverrideReport, OverrideSet, RejectedOverride, merge_overrides, parse_overrides};
pub use ports::{PortAllocator, PortLedger, ProbePolicy, update_per_port_availability};
pub use selector::NodeSelector;
pub use topology::{ClusterTopology, TopologyPhase};
