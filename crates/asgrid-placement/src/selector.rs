//! Node selection — which workers may host instances.
//!
//! Keeps online nodes with at least one execution slot that carry the
//! requested label (ASCII case-insensitive), then shuffles them so repeated
//! runs spread over the pool. The random source is injected; production
//! uses [`NodeSelector::from_entropy`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use asgrid_core::NodeId;

use crate::error::PlacementResult;
use crate::oracle::NodeLiveness;

pub struct NodeSelector<R = StdRng> {
    rng: R,
}

impl NodeSelector<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic shuffles, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> NodeSelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// All eligible nodes in `pool`, shuffled.
    ///
    /// Ineligible nodes are skipped silently; only a failing liveness
    /// check is an error.
    pub fn available_nodes<L: NodeLiveness>(
        &mut self,
        label: &str,
        pool: &[NodeId],
        liveness: &L,
    ) -> PlacementResult<Vec<NodeId>> {
        let mut eligible = Vec::new();

        for node in pool {
            if !liveness.is_online(node)? {
                debug!(%node, "skipped: node is offline");
                continue;
            }
            if liveness.executor_slots(node)? == 0 {
                debug!(%node, "skipped: no executors");
                continue;
            }
            let labels = liveness.labels(node)?;
            match labels.iter().find(|l| l.eq_ignore_ascii_case(label)) {
                Some(matched) => {
                    debug!(%node, label = %matched, "node is available");
                    eligible.push(node.clone());
                }
                None => debug!(%node, %label, "ignored: no label matched"),
            }
        }

        eligible.shuffle(&mut self.rng);
        Ok(eligible)
    }

    /// At most `required_count` eligible nodes in random order.
    ///
    /// Returning fewer than requested is not an error here; the caller
    /// decides whether the shortfall is fatal.
    pub fn select_nodes<L: NodeLiveness>(
        &mut self,
        required_count: usize,
        label: &str,
        pool: &[NodeId],
        liveness: &L,
    ) -> PlacementResult<Vec<NodeId>> {
        if required_count == 0 {
            return Ok(Vec::new());
        }
        let mut nodes = self.available_nodes(label, pool, liveness)?;
        nodes.truncate(required_count);
        Ok(nodes)
    }
}
