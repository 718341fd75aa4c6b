//! Port allocation — nearest free port at or above a candidate.
//!
//! A port is handed out only if no other owner claimed it on the same node
//! during planning AND the node reports it free. The check and the claim
//! happen under one per-node lock in the [`PortLedger`], so two instances
//! (or two planning runs sharing a ledger) can never both receive the same
//! "free" port on a node.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use asgrid_core::{InstanceSpec, NodeId, PortKind, ProbeSection};

use crate::error::{PlacementError, PlacementResult};
use crate::oracle::PortProbe;

/// Bounds on probe-until-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Consecutive ports tried for one listener before giving up.
    pub max_attempts: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self { max_attempts: 1000 }
    }
}

impl From<&ProbeSection> for ProbePolicy {
    fn from(section: &ProbeSection) -> Self {
        Self {
            max_attempts: section.max_attempts,
        }
    }
}

type NodeClaims = BTreeMap<u16, String>;

/// Ports claimed during planning, per node, with their owner.
#[derive(Debug, Clone, Default)]
pub struct PortLedger {
    nodes: Arc<Mutex<HashMap<NodeId, Arc<Mutex<NodeClaims>>>>>,
}

impl PortLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims table for `node`, created on first use.
    fn node_mut(&self, node: &str) -> Arc<Mutex<NodeClaims>> {
        let mut nodes = lock(&self.nodes);
        nodes.entry(node.to_string()).or_default().clone()
    }

    fn node(&self, node: &str) -> Option<Arc<Mutex<NodeClaims>>> {
        lock(&self.nodes).get(node).cloned()
    }

    /// Owner of `port` on `node`, if claimed.
    pub fn owner(&self, node: &str, port: u16) -> Option<String> {
        let claims = self.node(node)?;
        let claims = lock(&claims);
        claims.get(&port).cloned()
    }

    /// Claimed ports on `node`, ascending.
    pub fn claimed_on(&self, node: &str) -> Vec<u16> {
        let Some(claims) = self.node(node) else {
            return Vec::new();
        };
        let claims = lock(&claims);
        claims.keys().copied().collect()
    }

    /// Nodes with at least one claim, sorted.
    pub fn nodes(&self) -> Vec<NodeId> {
        let nodes = lock(&self.nodes);
        let mut ids: Vec<NodeId> = nodes
            .iter()
            .filter(|(_, claims)| !lock::<NodeClaims>(claims).is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop every claim `owner` holds on `node`.
    pub fn release_owner(&self, node: &str, owner: &str) -> usize {
        let Some(claims) = self.node(node) else {
            return 0;
        };
        let mut claims = lock(&claims);
        let before = claims.len();
        claims.retain(|_, o| o != owner);
        before - claims.len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the map half-written.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Finds free ports on nodes through a [`PortProbe`].
///
/// Every claim is recorded as `<run>/<owner>`, so allocators sharing a
/// ledger never release or reuse each other's ports.
pub struct PortAllocator<P> {
    probe: P,
    ledger: PortLedger,
    policy: ProbePolicy,
    run_id: String,
}

impl<P: PortProbe> PortAllocator<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            ledger: PortLedger::new(),
            policy: ProbePolicy::default(),
            run_id: format!("run-{}", NEXT_RUN.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Share claims with other allocators (e.g. concurrent planning runs).
    pub fn with_ledger(mut self, ledger: PortLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_policy(mut self, policy: ProbePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the generated run id. Allocators sharing a ledger need distinct ids.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn ledger(&self) -> &PortLedger {
        &self.ledger
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Ledger key for `owner` within this run.
    pub fn claim_key(&self, owner: &str) -> String {
        format!("{}/{owner}", self.run_id)
    }

    /// First free port at or above `candidate` on `node`, claimed for `owner`.
    ///
    /// `label` only names the listener in diagnostics.
    pub fn next_available(
        &self,
        node: &str,
        candidate: u16,
        owner: &str,
        label: &str,
    ) -> PlacementResult<u16> {
        let key = self.claim_key(owner);
        let claims = self.ledger.node_mut(node);
        let mut claims = lock(&claims);

        let mut port = u32::from(candidate);
        let mut attempts = 0;
        while attempts < self.policy.max_attempts && port <= u32::from(u16::MAX) {
            let p = port as u16;
            attempts += 1;
            if !claims.contains_key(&p) && self.probe.is_port_free(node, p)? {
                claims.insert(p, key);
                if p == candidate {
                    debug!(%node, port = p, %label, "port available");
                } else {
                    warn!(%node, requested = candidate, port = p, %label, "preferred port busy, moved");
                }
                return Ok(p);
            }
            debug!(%node, port = p, %label, "port busy");
            port += 1;
        }

        Err(PlacementError::PortsExhausted {
            node: node.to_string(),
            start: candidate,
            attempts,
            label: label.to_string(),
        })
    }

    /// Claim exactly `port` for `owner` if nobody else holds it and it is free.
    pub fn claim_exact(
        &self,
        node: &str,
        port: u16,
        owner: &str,
        label: &str,
    ) -> PlacementResult<bool> {
        let key = self.claim_key(owner);
        let claims = self.ledger.node_mut(node);
        let mut claims = lock(&claims);

        if let Some(holder) = claims.get(&port) {
            if *holder != key {
                debug!(%node, port, %label, %holder, "port already claimed");
                return Ok(false);
            }
        }
        if !self.probe.is_port_free(node, port)? {
            debug!(%node, port, %label, "port busy");
            return Ok(false);
        }
        claims.insert(port, key);
        Ok(true)
    }

    /// Drop the claims `owner` holds on `node` in this run.
    pub fn release(&self, node: &str, owner: &str) -> usize {
        self.ledger.release_owner(node, &self.claim_key(owner))
    }
}

/// Probe the instance's eight ports, in declaration order, on its node.
///
/// Claims the instance made earlier on that node are dropped first, so
/// re-running on an already resolved instance yields the same ports.
pub fn update_per_port_availability<P: PortProbe>(
    instance: &mut InstanceSpec,
    allocator: &PortAllocator<P>,
) -> PlacementResult<()> {
    let Some(node) = instance.node.clone() else {
        return Err(PlacementError::Unassigned(instance.name.clone()));
    };
    allocator.release(&node, &instance.name);

    for kind in PortKind::ALL {
        let label = format!("{} {}:{}", instance.name, node, kind.label());
        let port = allocator.next_available(&node, instance.ports.get(kind), &instance.name, &label)?;
        instance.ports.set(kind, port);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::oracle::ProbeError;

    /// Everything is free except the listed (node, port) pairs.
    struct BusyPorts(HashSet<(String, u16)>);

    impl BusyPorts {
        fn new(busy: &[(&str, u16)]) -> Self {
            Self(busy.iter().map(|(n, p)| (n.to_string(), *p)).collect())
        }
    }

    impl PortProbe for BusyPorts {
        fn is_port_free(&self, node: &str, port: u16) -> Result<bool, ProbeError> {
            Ok(!self.0.contains(&(node.to_string(), port)))
        }
    }

    struct Broken;

    impl PortProbe for Broken {
        fn is_port_free(&self, node: &str, _port: u16) -> Result<bool, ProbeError> {
            Err(ProbeError::new(node, "channel closed"))
        }
    }

    #[test]
    fn free_candidate_returned_unchanged() {
        let alloc = PortAllocator::new(BusyPorts::new(&[])).with_run_id("plan-a");
        assert_eq!(alloc.next_available("n1", 10000, "in1", "http").unwrap(), 10000);
        assert_eq!(alloc.ledger().owner("n1", 10000).as_deref(), Some("plan-a/in1"));
    }

    #[test]
    fn busy_candidate_moves_up() {
        let alloc = PortAllocator::new(BusyPorts::new(&[("n1", 10000), ("n1", 10001)]));
        assert_eq!(alloc.next_available("n1", 10000, "in1", "http").unwrap(), 10002);
        // Busy on n1 only.
        assert_eq!(alloc.next_available("n2", 10000, "in2", "http").unwrap(), 10000);
    }

    #[test]
    fn claimed_ports_are_not_handed_out_twice() {
        let alloc = PortAllocator::new(BusyPorts::new(&[]));
        assert_eq!(alloc.next_available("n1", 10000, "in1", "http").unwrap(), 10000);
        assert_eq!(alloc.next_available("n1", 10000, "in2", "http").unwrap(), 10001);
        assert_eq!(alloc.next_available("n2", 10000, "in3", "http").unwrap(), 10000);
    }

    #[test]
    fn shared_ledger_spans_allocators() {
        let ledger = PortLedger::new();
        let a = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger.clone());
        let b = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger.clone());
        assert_eq!(a.next_available("n1", 5000, "run-a", "http").unwrap(), 5000);
        assert_eq!(b.next_available("n1", 5000, "run-b", "http").unwrap(), 5001);
        assert_eq!(ledger.claimed_on("n1"), vec![5000, 5001]);
    }

    #[test]
    fn bounded_attempts() {
        let busy: Vec<(&str, u16)> = (100..110).map(|p| ("n1", p)).collect();
        let alloc = PortAllocator::new(BusyPorts::new(&busy))
            .with_policy(ProbePolicy { max_attempts: 5 });
        let err = alloc.next_available("n1", 100, "in1", "http").unwrap_err();
        assert!(matches!(err, PlacementError::PortsExhausted { attempts: 5, start: 100, .. }));
    }

    #[test]
    fn port_space_ceiling() {
        let alloc = PortAllocator::new(BusyPorts::new(&[("n1", 65535)]));
        assert!(alloc.next_available("n1", 65535, "in1", "http").is_err());
    }

    #[test]
    fn probe_error_aborts() {
        let alloc = PortAllocator::new(Broken);
        let err = alloc.next_available("n1", 100, "in1", "http").unwrap_err();
        assert!(matches!(err, PlacementError::Probe(_)));
    }

    #[test]
    fn release_owner_frees_only_own_claims() {
        let alloc = PortAllocator::new(BusyPorts::new(&[]));
        alloc.next_available("n1", 100, "in1", "http").unwrap();
        alloc.next_available("n1", 200, "in2", "http").unwrap();
        assert_eq!(alloc.release("n1", "in1"), 1);
        assert_eq!(alloc.ledger().claimed_on("n1"), vec![200]);
    }

    #[test]
    fn same_instance_name_in_two_runs_keeps_both_claims() {
        let ledger = PortLedger::new();
        let a = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger.clone());
        let b = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger.clone());
        assert_ne!(a.run_id(), b.run_id());

        let mut first = placed("in1", "n1", 10000);
        let mut second = placed("in1", "n1", 10000);
        update_per_port_availability(&mut first, &a).unwrap();
        update_per_port_availability(&mut second, &b).unwrap();

        let all: HashSet<u16> = first
            .ports
            .iter()
            .chain(second.ports.iter())
            .map(|(_, p)| p)
            .collect();
        assert_eq!(all.len(), 16);
        assert_eq!(second.ports.http, 10008);

        // Re-resolving in run b leaves run a's claims alone.
        update_per_port_availability(&mut second, &b).unwrap();
        assert_eq!(a.release("n1", "in1"), 8);
        assert_eq!(ledger.claimed_on("n1").len(), 8);
    }

    #[test]
    fn claim_exact_is_scoped_to_the_run() {
        let ledger = PortLedger::new();
        let a = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger.clone());
        let b = PortAllocator::new(BusyPorts::new(&[])).with_ledger(ledger);
        assert!(a.claim_exact("das", 4848, "@das", "DAS_ADMIN_PORT").unwrap());
        assert!(!b.claim_exact("das", 4848, "@das", "DAS_ADMIN_PORT").unwrap());
    }

    #[test]
    fn read_only_queries_do_not_create_nodes() {
        let ledger = PortLedger::new();
        assert_eq!(ledger.owner("ghost", 80), None);
        assert!(ledger.claimed_on("ghost").is_empty());
        assert_eq!(ledger.release_owner("ghost", "x"), 0);
        assert!(lock(&ledger.nodes).is_empty());
        assert!(ledger.nodes().is_empty());
    }

    #[test]
    fn claim_exact_respects_other_owners() {
        let alloc = PortAllocator::new(BusyPorts::new(&[("das", 8080)]));
        assert!(alloc.claim_exact("das", 4848, "das", "DAS_ADMIN_PORT").unwrap());
        assert!(alloc.claim_exact("das", 4848, "das", "DAS_ADMIN_PORT").unwrap());
        assert!(!alloc.claim_exact("das", 4848, "other", "x").unwrap());
        assert!(!alloc.claim_exact("das", 8080, "das", "DAS_HTTP_PORT").unwrap());
    }

    fn placed(name: &str, node: &str, base: u32) -> InstanceSpec {
        let mut inst = InstanceSpec::generated(name, base).unwrap();
        inst.node = Some(node.to_string());
        inst
    }

    #[test]
    fn instance_ports_resolved_in_order() {
        let alloc = PortAllocator::new(BusyPorts::new(&[("n1", 10002)]));
        let mut inst = placed("in1", "n1", 10000);
        update_per_port_availability(&mut inst, &alloc).unwrap();

        let ports: Vec<u16> = inst.ports.iter().map(|(_, p)| p).collect();
        // iiop moves past the busy port and pushes the rest of the block up.
        assert_eq!(ports, vec![10000, 10001, 10003, 10004, 10005, 10006, 10007, 10008]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let alloc = PortAllocator::new(BusyPorts::new(&[("n1", 10001)]));
        let mut inst = placed("in1", "n1", 10000);
        update_per_port_availability(&mut inst, &alloc).unwrap();
        let first = inst.ports;
        update_per_port_availability(&mut inst, &alloc).unwrap();
        assert_eq!(inst.ports, first);
    }

    #[test]
    fn overlapping_instances_on_one_node_do_not_collide() {
        let alloc = PortAllocator::new(BusyPorts::new(&[]));
        let mut a = placed("a", "n1", 10000);
        let mut b = placed("b", "n1", 10004);
        update_per_port_availability(&mut a, &alloc).unwrap();
        update_per_port_availability(&mut b, &alloc).unwrap();

        let all: HashSet<u16> = a.ports.iter().chain(b.ports.iter()).map(|(_, p)| p).collect();
        assert_eq!(all.len(), 16);
        assert_eq!(b.ports.http, 10008);
    }

    #[test]
    fn unassigned_instance_is_an_error() {
        let alloc = PortAllocator::new(BusyPorts::new(&[]));
        let mut inst = InstanceSpec::generated("in1", 10000).unwrap();
        assert!(matches!(
            update_per_port_availability(&mut inst, &alloc),
            Err(PlacementError::Unassigned(_))
        ));
    }
}
