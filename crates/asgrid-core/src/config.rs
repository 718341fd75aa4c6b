//! asgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub cluster: ClusterSection,
    #[serde(default)]
    pub probe: ProbeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    pub name: String,
    /// Requested node count, DAS included. Clamped to the instance count.
    pub num_nodes: u32,
    pub num_instances: u32,
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,
    #[serde(default = "default_base_port")]
    pub base_port: u32,
    /// Label a worker must carry to host instances.
    pub node_label: String,
    /// Free-form `name=port` overrides.
    #[serde(default)]
    pub custom_instances: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSection {
    /// Ports tried per listener before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_instance_prefix() -> String {
    "instance".to_string()
}

fn default_base_port() -> u32 {
    10000
}

fn default_max_attempts() -> u32 {
    1000
}

impl PlanConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PlanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject requests no plan can satisfy.
    pub fn validate(&self) -> CoreResult<()> {
        let c = &self.cluster;
        if c.name.trim().is_empty() {
            return Err(CoreError::InvalidConfig("cluster name is empty".into()));
        }
        if c.num_nodes == 0 {
            return Err(CoreError::InvalidConfig(
                "num_nodes must be at least 1".into(),
            ));
        }
        if c.base_port == 0 || c.base_port > u32::from(u16::MAX) {
            return Err(CoreError::InvalidConfig(format!(
                "base_port {} is outside 1..=65535",
                c.base_port
            )));
        }
        if c.node_label.trim().is_empty() {
            return Err(CoreError::InvalidConfig("node_label is empty".into()));
        }
        if self.probe.max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "probe.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Scaffold a single-node request with default ports.
    pub fn scaffold(name: &str) -> Self {
        PlanConfig {
            cluster: ClusterSection {
                name: name.to_string(),
                num_nodes: 1,
                num_instances: 1,
                instance_prefix: default_instance_prefix(),
                base_port: default_base_port(),
                node_label: "gfcluster".to_string(),
                custom_instances: String::new(),
            },
            probe: ProbeSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = PlanConfig::scaffold("c1");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("c1"));
        assert!(toml_str.contains("gfcluster"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[cluster]
name = "c1"
num_nodes = 3
num_instances = 2
node_label = "gf"
"#;
        let config = PlanConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.cluster.instance_prefix, "instance");
        assert_eq!(config.cluster.base_port, 10000);
        assert_eq!(config.probe.max_attempts, 1000);
        assert!(config.cluster.custom_instances.is_empty());
    }

    #[test]
    fn test_parse_overrides_block() {
        let toml_str = r#"
[cluster]
name = "c1"
num_nodes = 1
num_instances = 2
node_label = "gf"
custom_instances = """
custom1=20000
"""

[probe]
max_attempts = 10
"#;
        let config = PlanConfig::from_toml_str(toml_str).unwrap();
        assert!(config.cluster.custom_instances.contains("custom1=20000"));
        assert_eq!(config.probe.max_attempts, 10);
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let toml_str = r#"
[cluster]
name = "c1"
num_nodes = 0
num_instances = 2
node_label = "gf"
"#;
        assert!(PlanConfig::from_toml_str(toml_str).is_err());
    }
}
