//! asgrid-state — persistence for cluster plans.
//!
//! A finished [`ClusterTopology`](asgrid_placement::ClusterTopology) is written
//! as flat `key=value` text (`cluster.props`) plus a legacy one-line instance
//! list for ant scripts (`ant/cluster.properties`). Reading `cluster.props`
//! back yields an equivalent topology without touching the fleet.
//!
//! # Architecture
//!
//! Storage goes through the [`Workspace`] trait, so the medium (local
//! directory, remote copy, memory) is the caller's choice. [`PlanStore`]
//! encodes everything before writing anything, so a failed encode leaves no
//! file behind.

pub mod ant;
pub mod codec;
pub mod error;
pub mod store;
pub mod workspace;

#[cfg(test)]
mod testutil;

pub use ant::encode_ant_properties;
pub use codec::{decode, encode};
pub use error::{StateError, StateResult};
pub use store::{ANT_PROPS_FILE, CLUSTER_PROPS_FILE, PlanStore};
pub use workspace::{DirWorkspace, MemoryWorkspace, Workspace};
