//! asgrid-core — shared types for application-server cluster planning.
//!
//! Holds the instance value object ([`InstanceSpec`]) with its fixed block
//! of eight named ports, and the planning request ([`PlanConfig`]) parsed
//! from `asgrid.toml`, plus the `key=value` text reader shared by
//! override parsing and plan files.

pub mod config;
pub mod error;
pub mod props;
pub mod types;

pub use config::{ClusterSection, PlanConfig, ProbeSection};
pub use error::{CoreError, CoreResult};
pub use props::Properties;
pub use types::*;
