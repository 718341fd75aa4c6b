//! Fakes shared by unit tests.

use std::collections::HashSet;

use asgrid_core::{NodeId, PlanConfig};
use asgrid_placement::{
    ClusterTopology, FixedHome, NodeLiveness, NodeSelector, PortAllocator, PortProbe, ProbeError,
};

/// Nine labeled workers `w1..w9`, all online.
pub struct Fleet;

impl Fleet {
    pub fn pool() -> Vec<NodeId> {
        (1..=9).map(|i| format!("w{i}")).collect()
    }
}

impl NodeLiveness for Fleet {
    fn is_online(&self, _node: &str) -> Result<bool, ProbeError> {
        Ok(true)
    }
    fn executor_slots(&self, _node: &str) -> Result<u32, ProbeError> {
        Ok(2)
    }
    fn labels(&self, _node: &str) -> Result<Vec<String>, ProbeError> {
        Ok(vec!["gf".to_string()])
    }
}

pub struct BusyPorts(pub HashSet<(String, u16)>);

impl PortProbe for BusyPorts {
    fn is_port_free(&self, node: &str, port: u16) -> Result<bool, ProbeError> {
        Ok(!self.0.contains(&(node.to_string(), port)))
    }
}

/// A port-resolved plan for cluster `c1` with DAS node `das`.
pub fn planned(num_nodes: u32, num_instances: u32, overrides: &str) -> ClusterTopology {
    let mut config = PlanConfig::scaffold("c1");
    config.cluster.num_nodes = num_nodes;
    config.cluster.num_instances = num_instances;
    config.cluster.node_label = "gf".to_string();

    let mut topo = ClusterTopology::new(&config, "das").unwrap();
    topo.init_cluster_map("in", num_instances, overrides).unwrap();

    let allocator = PortAllocator::new(BusyPorts(HashSet::new()));
    let mut selector = NodeSelector::seeded(u64::from(num_nodes * 100 + num_instances));
    topo.update_cluster_map(
        &mut selector,
        &Fleet::pool(),
        &Fleet,
        &FixedHome("/opt/glassfish3".into()),
        &allocator,
    )
    .unwrap();
    topo
}
