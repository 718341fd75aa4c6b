//! Cluster topology — one planning run from request to resolved plan.
//!
//! A run moves strictly forward:
//! `Empty → Generated → Overridden → NodesSelected → Assigned → PortsResolved → Persisted`.
//! Restoring a saved plan lands directly in `Persisted`.
//!
//! Node 1 is always the DAS node (the machine doing the planning). It hosts
//! instance 1 and is never filtered out by label selection. Instances are
//! spread over `num_nodes` nodes round-robin in insertion order.

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info, warn};

use asgrid_core::{DAS_ADMIN_PORT, DAS_HTTP_PORT, INSTANCE_PORT_STRIDE, InstanceSpec, NodeId, PlanConfig};

use crate::cluster_map::ClusterMap;
use crate::error::{PlacementError, PlacementResult};
use crate::oracle::{Installer, NodeLiveness, PortProbe};
use crate::overrides::{OverrideReport, merge_overrides, parse_overrides};
use crate::ports::{PortAllocator, update_per_port_availability};
use crate::selector::NodeSelector;

/// Ledger owner for the DAS listeners; the allocator scopes it to its run.
const DAS_OWNER: &str = "@das";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TopologyPhase {
    Empty,
    Generated,
    Overridden,
    NodesSelected,
    Assigned,
    PortsResolved,
    Persisted,
}

/// The full plan: which instance runs on which node with which ports.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    cluster_name: String,
    /// Nodes the plan uses, DAS included.
    num_nodes: usize,
    base_port: u32,
    node_label: String,
    das_node: NodeId,
    /// DAS first, then selected workers.
    nodes: Vec<NodeId>,
    instances: ClusterMap,
    phase: TopologyPhase,
}

impl ClusterTopology {
    /// Start a planning run with `das_node` reserved as node 1.
    pub fn new(config: &PlanConfig, das_node: impl Into<NodeId>) -> PlacementResult<Self> {
        config.validate()?;
        let das_node = das_node.into();
        if das_node.is_empty() {
            return Err(PlacementError::Config("DAS node name is empty".into()));
        }
        Ok(Self {
            cluster_name: config.cluster.name.clone(),
            num_nodes: config.cluster.num_nodes as usize,
            base_port: config.cluster.base_port,
            node_label: config.cluster.node_label.clone(),
            nodes: vec![das_node.clone()],
            das_node,
            instances: ClusterMap::new(),
            phase: TopologyPhase::Empty,
        })
    }

    /// Rebuild a plan from persisted records without probing anything.
    ///
    /// The nodes are assumed to still be online; whoever creates the cluster
    /// finds out if they are not.
    pub fn restored(
        cluster_name: impl Into<String>,
        num_nodes: usize,
        das_node: impl Into<NodeId>,
        instances: Vec<InstanceSpec>,
    ) -> PlacementResult<Self> {
        let das_node = das_node.into();
        if instances.is_empty() {
            return Err(PlacementError::Config("restored plan has no instances".into()));
        }
        if num_nodes == 0 {
            return Err(PlacementError::Config("restored plan has no nodes".into()));
        }

        let mut nodes = vec![das_node.clone()];
        let mut map = ClusterMap::new();
        for instance in instances {
            let Some(node) = instance.node.clone() else {
                return Err(PlacementError::Unassigned(instance.name));
            };
            if !nodes.contains(&node) {
                nodes.push(node);
            }
            if map.contains(&instance.name) {
                return Err(PlacementError::Config(format!(
                    "duplicate instance name {}",
                    instance.name
                )));
            }
            map.upsert(instance);
        }

        let base_port = map.iter().next().map_or(0, |i| u32::from(i.base_port));
        debug!(nodes = ?nodes, "restored plan, assuming nodes are still online");

        Ok(Self {
            cluster_name: cluster_name.into(),
            num_nodes,
            base_port,
            node_label: String::new(),
            das_node,
            nodes,
            instances: map,
            phase: TopologyPhase::Persisted,
        })
    }

    fn expect_phase(&self, expected: TopologyPhase, operation: &'static str) -> PlacementResult<()> {
        if self.phase != expected {
            return Err(PlacementError::Phase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    // ── Instance map ──────────────────────────────────────────────

    /// `prefix1..prefixN`, each block `0x100` above the previous one.
    pub fn create_auto_assigned_cluster_map(
        &self,
        prefix: &str,
        count: u32,
    ) -> PlacementResult<ClusterMap> {
        let mut map = ClusterMap::new();
        for i in 1..=count {
            let name = format!("{prefix}{i}");
            let base = (i - 1)
                .checked_mul(INSTANCE_PORT_STRIDE)
                .and_then(|offset| offset.checked_add(self.base_port))
                .ok_or_else(|| {
                    PlacementError::Config(format!("port block for {name} overflows"))
                })?;
            map.upsert(InstanceSpec::generated(name, base)?);
        }
        Ok(map)
    }

    pub fn generate_instances(&mut self, prefix: &str, count: u32) -> PlacementResult<()> {
        self.expect_phase(TopologyPhase::Empty, "generate instances")?;
        self.instances = self.create_auto_assigned_cluster_map(prefix, count)?;
        self.phase = TopologyPhase::Generated;
        Ok(())
    }

    /// Merge user overrides onto the generated map and clamp `num_nodes`.
    ///
    /// Any rejected entry fails the whole merge and leaves the map as it was.
    pub fn apply_overrides(&mut self, text: &str, verbose: bool) -> PlacementResult<OverrideReport> {
        self.expect_phase(TopologyPhase::Generated, "apply overrides")?;

        let mut staged = self.instances.clone();
        let report = merge_overrides(&mut staged, &parse_overrides(text), verbose);
        if !report.is_clean() {
            return Err(PlacementError::InvalidOverrides(
                report.rejected.iter().map(ToString::to_string).collect(),
            ));
        }
        if staged.is_empty() {
            return Err(PlacementError::Config("cluster has no instances".into()));
        }

        self.instances = staged;
        // One node per instance at most.
        if self.num_nodes > self.instances.len() {
            info!(
                requested = self.num_nodes,
                instances = self.instances.len(),
                "limiting node count to instance count"
            );
            self.num_nodes = self.instances.len();
        }
        self.phase = TopologyPhase::Overridden;
        Ok(report)
    }

    /// Generate `count` instances and merge `overrides`, all or nothing.
    pub fn init_cluster_map(
        &mut self,
        prefix: &str,
        count: u32,
        overrides: &str,
    ) -> PlacementResult<OverrideReport> {
        let mut staged = self.clone();
        staged.generate_instances(prefix, count)?;
        let report = staged.apply_overrides(overrides, false)?;
        *self = staged;
        Ok(report)
    }

    // ── Nodes ─────────────────────────────────────────────────────

    /// Pick `num_nodes - 1` workers to join the DAS node.
    ///
    /// On shortage nothing is changed.
    pub fn select_cluster_nodes<R, L>(
        &mut self,
        selector: &mut NodeSelector<R>,
        pool: &[NodeId],
        liveness: &L,
    ) -> PlacementResult<()>
    where
        R: Rng,
        L: NodeLiveness,
    {
        self.expect_phase(TopologyPhase::Overridden, "select nodes")?;

        let candidates: Vec<NodeId> = pool
            .iter()
            .filter(|n| **n != self.das_node)
            .cloned()
            .collect();
        let selected =
            selector.select_nodes(self.num_nodes - 1, &self.node_label, &candidates, liveness)?;

        if selected.len() + 1 < self.num_nodes {
            warn!(
                required = self.num_nodes,
                available = selected.len() + 1,
                label = %self.node_label,
                "not enough nodes available for instance deployment"
            );
            return Err(PlacementError::NotEnoughNodes {
                required: self.num_nodes,
                available: selected.len() + 1,
                label: self.node_label.clone(),
            });
        }

        self.nodes.extend(selected);
        self.phase = TopologyPhase::NodesSelected;
        Ok(())
    }

    /// Bind every instance to a selected node, round-robin from DAS.
    pub fn assign_instances_to_nodes<I: Installer>(&mut self, installer: &I) -> PlacementResult<()> {
        self.expect_phase(TopologyPhase::NodesSelected, "assign nodes")?;

        for (i, instance) in self.instances.iter_mut().enumerate() {
            let node = self.nodes[i % self.num_nodes].clone();
            instance.home_dir = Some(installer.installed_home_dir(&node));
            info!(instance = %instance.name, %node, "instance assigned");
            instance.node = Some(node);
        }

        self.phase = TopologyPhase::Assigned;
        Ok(())
    }

    /// Select nodes, then assign instances to them.
    pub fn assign_cluster_nodes_to_instances<R, L, I>(
        &mut self,
        selector: &mut NodeSelector<R>,
        pool: &[NodeId],
        liveness: &L,
        installer: &I,
    ) -> PlacementResult<()>
    where
        R: Rng,
        L: NodeLiveness,
        I: Installer,
    {
        self.select_cluster_nodes(selector, pool, liveness)?;
        self.assign_instances_to_nodes(installer)
    }

    // ── Ports ─────────────────────────────────────────────────────

    /// Check the DAS admin and HTTP ports are free on the DAS node and claim them.
    pub fn verify_das_port_availability<P: PortProbe>(
        &self,
        allocator: &PortAllocator<P>,
    ) -> PlacementResult<bool> {
        for (port, label) in [
            (DAS_ADMIN_PORT, "DAS_ADMIN_PORT"),
            (DAS_HTTP_PORT, "DAS_HTTP_PORT"),
        ] {
            if !allocator.claim_exact(&self.das_node, port, DAS_OWNER, label)? {
                info!(node = %self.das_node, port, %label, "DAS port is not available");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Move every instance's ports to ones actually free on its node.
    ///
    /// On failure the instance claims this run made are released again.
    pub fn update_cluster_map_per_port_availability<P: PortProbe>(
        &mut self,
        allocator: &PortAllocator<P>,
    ) -> PlacementResult<()> {
        self.expect_phase(TopologyPhase::Assigned, "resolve ports")?;

        let mut staged = self.instances.clone();
        for instance in staged.iter_mut() {
            if let Err(e) = update_per_port_availability(instance, allocator) {
                let released: usize = self
                    .instances
                    .iter()
                    .filter_map(|i| {
                        i.node.as_deref().map(|node| allocator.release(node, &i.name))
                    })
                    .sum();
                warn!(instance = %instance.name, released, error = %e, "port resolution aborted");
                return Err(e);
            }
            debug!(instance = %instance.describe(true), "ports resolved");
        }

        self.instances = staged;
        self.phase = TopologyPhase::PortsResolved;
        Ok(())
    }

    /// Assign nodes, then resolve ports.
    pub fn update_cluster_map<R, L, I, P>(
        &mut self,
        selector: &mut NodeSelector<R>,
        pool: &[NodeId],
        liveness: &L,
        installer: &I,
        allocator: &PortAllocator<P>,
    ) -> PlacementResult<()>
    where
        R: Rng,
        L: NodeLiveness,
        I: Installer,
        P: PortProbe,
    {
        self.assign_cluster_nodes_to_instances(selector, pool, liveness, installer)?;
        self.update_cluster_map_per_port_availability(allocator)
    }

    /// Record that the plan has been written out.
    pub fn mark_persisted(&mut self) -> PlacementResult<()> {
        match self.phase {
            TopologyPhase::PortsResolved | TopologyPhase::Persisted => {
                self.phase = TopologyPhase::Persisted;
                Ok(())
            }
            phase => Err(PlacementError::Phase {
                operation: "persist",
                phase,
            }),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn base_port(&self) -> u32 {
        self.base_port
    }

    pub fn node_label(&self) -> &str {
        &self.node_label
    }

    pub fn das_node(&self) -> &str {
        &self.das_node
    }

    pub fn das_admin_port(&self) -> u16 {
        DAS_ADMIN_PORT
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Node by 1-based host number; node 1 is the DAS.
    pub fn cluster_node(&self, host_num: usize) -> Option<&NodeId> {
        if host_num == 0 || host_num > self.num_nodes {
            debug!(host_num, "invalid host number");
            return None;
        }
        self.nodes.get(host_num - 1)
    }

    pub fn instances(&self) -> &ClusterMap {
        &self.instances
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceSpec> {
        self.instances.get(name)
    }

    pub fn phase(&self) -> TopologyPhase {
        self.phase
    }

    /// Distinct nodes actually hosting instances.
    pub fn used_nodes(&self) -> HashSet<&str> {
        self.instances.iter().filter_map(|i| i.node.as_deref()).collect()
    }

    pub fn list_instances(&self) {
        for instance in &self.instances {
            info!("{}", instance.describe(true));
        }
    }
}
