//! User overrides: `name=port` lines merged onto the generated instances.
//!
//! Each valid line regenerates that instance's eight ports from the given
//! base. Unknown names add an instance, known names replace it in place.
//! A value that is not a usable base port is rejected and skipped; whether
//! a rejection is fatal is the caller's call.

use std::fmt;

use tracing::{debug, info, warn};

use asgrid_core::{InstanceSpec, Properties};

use crate::cluster_map::ClusterMap;

/// An override line whose value could not be used as a base port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    pub name: String,
    pub value: String,
}

impl fmt::Display for RejectedOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Parsed override text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    pub instances: Vec<InstanceSpec>,
    pub rejected: Vec<RejectedOverride>,
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub rejected: Vec<RejectedOverride>,
}

impl OverrideReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub fn parse_overrides(text: &str) -> OverrideSet {
    let mut set = OverrideSet::default();

    for (name, value) in Properties::parse(text).iter() {
        let instance = value
            .parse::<u32>()
            .ok()
            .and_then(|base| InstanceSpec::generated(name, base).ok());
        match instance {
            Some(instance) => set.instances.push(instance),
            None => {
                warn!(%name, %value, "invalid custom instance entry");
                set.rejected.push(RejectedOverride {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    set
}

/// Apply `set` to `map`. Valid entries are applied even when others were rejected.
pub fn merge_overrides(map: &mut ClusterMap, set: &OverrideSet, verbose: bool) -> OverrideReport {
    let mut report = OverrideReport {
        rejected: set.rejected.clone(),
        ..Default::default()
    };

    for instance in &set.instances {
        let name = instance.name.clone();
        let base = instance.base_port;
        if map.upsert(instance.clone()) {
            if verbose {
                info!(instance = %name, base_port = base, "Updated");
            } else {
                debug!(instance = %name, base_port = base, "Updated");
            }
            report.updated.push(name);
        } else {
            if verbose {
                info!(instance = %name, base_port = base, "Added");
            } else {
                debug!(instance = %name, base_port = base, "Added");
            }
            report.added.push(name);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(names: &[(&str, u32)]) -> ClusterMap {
        let mut map = ClusterMap::new();
        for (name, base) in names {
            map.upsert(InstanceSpec::generated(*name, *base).unwrap());
        }
        map
    }

    #[test]
    fn new_name_is_added_with_regenerated_ports() {
        let mut map = generated(&[("inst1", 10000), ("inst2", 10256)]);
        let before = map.clone();

        let report = merge_overrides(&mut map, &parse_overrides("custom1=20000\n"), false);

        assert_eq!(report.added, vec!["custom1".to_string()]);
        assert!(report.updated.is_empty());
        assert!(report.is_clean());
        assert_eq!(map.len(), 3);
        let custom = map.get("custom1").unwrap();
        let ports: Vec<u16> = custom.ports.iter().map(|(_, p)| p).collect();
        assert_eq!(ports, (20000..=20007).collect::<Vec<u16>>());
        assert_eq!(map.get("inst1"), before.get("inst1"));
        assert_eq!(map.get("inst2"), before.get("inst2"));
    }

    #[test]
    fn known_name_is_updated_in_place() {
        let mut map = generated(&[("inst1", 10000), ("inst2", 10256)]);
        let report = merge_overrides(&mut map, &parse_overrides("inst1=30000"), true);

        assert_eq!(report.updated, vec!["inst1".to_string()]);
        assert_eq!(map.get("inst1").unwrap().ports.http, 30000);
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["inst1", "inst2"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let text = "# extra capacity\ncustom1=20000\ninst2=15000\n";
        let mut once = generated(&[("inst1", 10000), ("inst2", 10256)]);
        merge_overrides(&mut once, &parse_overrides(text), false);

        let mut twice = once.clone();
        merge_overrides(&mut twice, &parse_overrides(text), false);

        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_values_are_rejected_and_skipped() {
        let set = parse_overrides("good=20000\nbad=twenty\nhigh=65530\n");
        assert_eq!(set.instances.len(), 1);
        assert_eq!(set.rejected.len(), 2);
        assert_eq!(set.rejected[0].to_string(), "bad=twenty");

        let mut map = ClusterMap::new();
        let report = merge_overrides(&mut map, &set, false);
        assert!(!report.is_clean());
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["good"]);
    }

    #[test]
    fn empty_text_changes_nothing() {
        let mut map = generated(&[("inst1", 10000)]);
        let report = merge_overrides(&mut map, &parse_overrides(""), false);
        assert_eq!(report, OverrideReport::default());
        assert_eq!(map.len(), 1);
    }
}
