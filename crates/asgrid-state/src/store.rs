//! PlanStore — saves and reloads plans through a [`Workspace`].

use tracing::info;

use asgrid_placement::ClusterTopology;

use crate::ant::encode_ant_properties;
use crate::codec::{decode, encode};
use crate::error::StateResult;
use crate::workspace::Workspace;

/// Plan file read back on later runs.
pub const CLUSTER_PROPS_FILE: &str = "cluster.props";

/// Instance list for ant scripts.
pub const ANT_PROPS_FILE: &str = "ant/cluster.properties";

pub struct PlanStore<W> {
    workspace: W,
}

impl<W: Workspace> PlanStore<W> {
    pub fn new(workspace: W) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    /// Write both plan files and mark the topology persisted.
    ///
    /// Both files are rendered before either is written.
    pub fn save(&self, topology: &mut ClusterTopology) -> StateResult<()> {
        let props = encode(topology)?;
        let ant = encode_ant_properties(topology)?;

        self.workspace.write_text(CLUSTER_PROPS_FILE, &props)?;
        info!(file = CLUSTER_PROPS_FILE, "created");
        self.workspace.write_text(ANT_PROPS_FILE, &ant)?;
        info!(file = ANT_PROPS_FILE, "created");

        topology.mark_persisted()?;
        info!(
            cluster = %topology.cluster_name(),
            nodes = topology.num_nodes(),
            instances = topology.instances().len(),
            "cluster plan persisted"
        );
        topology.list_instances();
        Ok(())
    }

    /// Rebuild a plan from `file_name` without probing the fleet.
    pub fn load(&self, file_name: &str) -> StateResult<ClusterTopology> {
        info!(file = file_name, "reading properties file");
        let text = self.workspace.read_text(file_name)?;
        let topology = decode(&text)?;
        info!(
            cluster = %topology.cluster_name(),
            instances = topology.instances().len(),
            "cluster plan loaded"
        );
        Ok(topology)
    }

    pub fn load_default(&self) -> StateResult<ClusterTopology> {
        self.load(CLUSTER_PROPS_FILE)
    }
}
