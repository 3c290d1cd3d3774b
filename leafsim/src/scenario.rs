//! Scenario builder for common test setups.

use leaftree::{Duration, NodeId, Policy};

use crate::sim::Simulator;
use crate::topology::Topology;

#[derive(Debug, Clone, Copy)]
enum Shape {
    FullyConnected,
    Chain,
    Star,
}

/// Builds a simulator with `count` nodes. Node ids are `1..=count`; node 1
/// is the sink (and the hub/chain head where the shape has one).
pub struct ScenarioBuilder {
    count: usize,
    seed: u64,
    shape: Shape,
    snapshot_interval: Duration,
}

impl ScenarioBuilder {
    /// A fully connected network of `count` nodes.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            seed: 1,
            shape: Shape::FullyConnected,
            snapshot_interval: Duration::from_millis(500),
        }
    }

    /// Set the simulation seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Connect the nodes in a chain: 1 - 2 - ... - count.
    pub fn chain_topology(mut self) -> Self {
        self.shape = Shape::Chain;
        self
    }

    /// Connect every node only to node 1.
    pub fn star_topology(mut self) -> Self {
        self.shape = Shape::Star;
        self
    }

    /// Set the automatic snapshot interval.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Build the simulator and return it with the node ids.
    pub fn build<P: Policy>(self) -> (Simulator<P>, Vec<NodeId>) {
        let ids: Vec<NodeId> = (1..=self.count as NodeId).collect();
        let topology = match self.shape {
            Shape::FullyConnected => Topology::fully_connected(&ids),
            Shape::Chain => Topology::chain(&ids),
            Shape::Star => Topology::star(&ids),
        };

        let mut sim = Simulator::new(self.seed)
            .with_topology(topology)
            .with_snapshot_interval(self.snapshot_interval);

        sim.add_sink(ids[0]);
        for &id in &ids[1..] {
            sim.add_node(id);
        }

        (sim, ids)
    }
}
