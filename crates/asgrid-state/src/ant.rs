//! `ant/cluster.properties` — the single-line instance list older ant
//! scripts read.
//!
//! Each entry is
//! `node:http:http_ssl:iiop_ssl:iiop:jmx:iiop_ssl_mutualauth:jms:asadmin:name`
//! (note iiop_ssl before iiop, and jmx before mutualauth).

use asgrid_placement::{ClusterTopology, TopologyPhase};

use crate::error::{StateError, StateResult};

pub fn encode_ant_properties(topology: &ClusterTopology) -> StateResult<String> {
    if topology.phase() < TopologyPhase::PortsResolved {
        return Err(StateError::Incomplete(format!(
            "topology is {:?}, ports not resolved",
            topology.phase()
        )));
    }

    // Instance 1 always runs on the DAS node.
    let das_home = topology
        .instances()
        .iter()
        .find(|i| i.node_name() == topology.das_node())
        .and_then(|i| i.home_dir.as_deref())
        .ok_or_else(|| StateError::Incomplete("no installation home on the DAS node".into()))?;

    let entries: Vec<String> = topology
        .instances()
        .iter()
        .map(|i| {
            let p = &i.ports;
            format!(
                "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
                i.node_name(),
                p.http,
                p.http_ssl,
                p.iiop_ssl,
                p.iiop,
                p.jmx_system_connector,
                p.iiop_ssl_mutualauth,
                p.jms_provider,
                p.asadmin,
                i.name
            )
        })
        .collect();

    Ok(format!(
        "s1as.home={das_home}\ncluster.name={}\ninstancelist={}\n",
        topology.cluster_name(),
        entries.join(",")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::planned;

    #[test]
    fn renders_legacy_field_order() {
        let topo = planned(1, 2, "");
        let text = encode_ant_properties(&topo).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "s1as.home=/opt/glassfish3");
        assert_eq!(lines[1], "cluster.name=c1");
        assert_eq!(
            lines[2],
            "instancelist=das:10000:10001:10003:10002:10005:10004:10006:10007:in1,\
             das:10256:10257:10259:10258:10261:10260:10262:10263:in2"
        );
    }

    #[test]
    fn refuses_unresolved_plan() {
        let config = asgrid_core::PlanConfig::scaffold("c1");
        let topo = ClusterTopology::new(&config, "das").unwrap();
        assert!(encode_ant_properties(&topo).is_err());
    }
}
