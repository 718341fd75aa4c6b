//! Instance lookup table that remembers insertion order.
//!
//! Lookups are by name; iteration follows insertion order, which drives
//! round-robin node assignment and the indices of persisted records.
//! Replacing an instance keeps its original position.

use std::collections::HashMap;

use asgrid_core::InstanceSpec;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMap {
    instances: Vec<InstanceSpec>,
    index: HashMap<String, usize>,
}

impl ClusterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name. Returns `true` if an entry was replaced.
    pub fn upsert(&mut self, instance: InstanceSpec) -> bool {
        match self.index.get(&instance.name) {
            Some(&i) => {
                self.instances[i] = instance;
                true
            }
            None => {
                self.index.insert(instance.name.clone(), self.instances.len());
                self.instances.push(instance);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&InstanceSpec> {
        self.index.get(name).map(|&i| &self.instances[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InstanceSpec> {
        self.instances.iter()
    }

    /// Names must not change through this iterator.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, InstanceSpec> {
        self.instances.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(|i| i.name.as_str())
    }
}

impl<'a> IntoIterator for &'a ClusterMap {
    type Item = &'a InstanceSpec;
    type IntoIter = std::slice::Iter<'a, InstanceSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
