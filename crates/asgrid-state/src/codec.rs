//! `cluster.props` — the persisted form of a plan.
//!
//! ```text
//! cluster_name=c1
//! cluster_numNodes=2
//! cluster_numInstances=2
//! das_node=das
//! das_port=4848
//! instance1.name=in1
//! instance1.node=das
//! instance1.s1as.home=/opt/glassfish3
//! instance1.HTTP_LISTENER_PORT=10000
//! ...
//! instance1.ASADMIN_LISTENER_PORT=10007
//! instance2.name=in2
//! ...
//! ```
//!
//! Instances are numbered from 1 in insertion order. Loading requires every
//! key; one missing or invalid value fails the whole load.

use tracing::warn;

use asgrid_core::{InstanceSpec, PORTS_PER_INSTANCE, PortKind, PortSet, Properties};
use asgrid_placement::{ClusterTopology, TopologyPhase};

use crate::error::{StateError, StateResult};

/// Render a resolved plan. Refuses plans whose ports are not resolved yet.
pub fn encode(topology: &ClusterTopology) -> StateResult<String> {
    if topology.phase() < TopologyPhase::PortsResolved {
        return Err(StateError::Incomplete(format!(
            "topology is {:?}, ports not resolved",
            topology.phase()
        )));
    }

    let mut lines = vec![
        format!("cluster_name={}", topology.cluster_name()),
        format!("cluster_numNodes={}", topology.num_nodes()),
        format!("cluster_numInstances={}", topology.instances().len()),
        format!("das_node={}", topology.das_node()),
        format!("das_port={}", topology.das_admin_port()),
    ];

    for (i, instance) in topology.instances().iter().enumerate() {
        let id = format!("instance{}", i + 1);
        let (Some(node), Some(home)) = (&instance.node, &instance.home_dir) else {
            return Err(StateError::Incomplete(format!(
                "instance {} is not placed",
                instance.name
            )));
        };
        lines.push(format!("{id}.name={}", instance.name));
        lines.push(format!("{id}.node={node}"));
        lines.push(format!("{id}.s1as.home={home}"));
        for (kind, port) in instance.ports.iter() {
            lines.push(format!("{id}.{}={port}", kind.property_key()));
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// Rebuild a plan from `cluster.props` text.
pub fn decode(text: &str) -> StateResult<ClusterTopology> {
    let props = Properties::parse(text);

    let cluster_name = required_str(&props, "cluster_name")?;
    let num_nodes = required_int(&props, "cluster_numNodes")?;
    let num_instances = required_int(&props, "cluster_numInstances")?;
    let das_node = required_str(&props, "das_node")?;
    required_port(&props, "das_port")?;

    let mut instances = Vec::new();
    for i in 1..=num_instances {
        let id = format!("instance{i}");
        let name = required_str(&props, &format!("{id}.name"))?;
        let node = required_str(&props, &format!("{id}.node"))?;
        let home = required_str(&props, &format!("{id}.s1as.home"))?;

        let mut ports = [0u16; PORTS_PER_INSTANCE];
        for (slot, kind) in ports.iter_mut().zip(PortKind::ALL) {
            *slot = required_port(&props, &format!("{id}.{}", kind.property_key()))?;
        }

        instances.push(InstanceSpec::restored(name, node, home, PortSet::from_ports(ports)));
    }

    Ok(ClusterTopology::restored(
        cluster_name,
        num_nodes as usize,
        das_node,
        instances,
    )?)
}

fn required_str(props: &Properties, key: &str) -> StateResult<String> {
    match props.get(key) {
        Some(value) => Ok(value.trim().to_string()),
        None => {
            warn!(property = key, "couldn't load property");
            Err(StateError::MissingProperty(key.to_string()))
        }
    }
}

/// Integer property that must be at least 1.
fn required_int(props: &Properties, key: &str) -> StateResult<u32> {
    let raw = required_str(props, key)?;
    let invalid = |reason: &str| {
        warn!(property = key, value = %raw, reason, "invalid property");
        StateError::InvalidProperty {
            key: key.to_string(),
            value: raw.clone(),
            reason: reason.to_string(),
        }
    };
    let value: u32 = raw.parse().map_err(|_| invalid("not an integer"))?;
    if value < 1 {
        return Err(invalid("must be >= 1"));
    }
    Ok(value)
}

fn required_port(props: &Properties, key: &str) -> StateResult<u16> {
    let value = required_int(props, key)?;
    u16::try_from(value).map_err(|_| StateError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
        reason: "port out of range".to_string(),
    })
}
