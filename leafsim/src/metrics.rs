//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use leaftree::{NodeId, Timestamp};

/// A snapshot of every node's tree position at a point in time.
#[derive(Debug, Clone)]
pub struct NetSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Elected parent per node (`None` for the sink and undefined nodes).
    pub parent: HashMap<NodeId, Option<NodeId>>,
    /// Published hop distance per node.
    pub distance: HashMap<NodeId, u8>,
    /// Published children count per node.
    pub children: HashMap<NodeId, u8>,
    /// Whether each node currently has a parent and no children.
    pub is_leaf: HashMap<NodeId, bool>,
    /// Whether each node is in the undefined state.
    pub undefined: HashMap<NodeId, bool>,
    /// Whether each node's gossip link is open.
    pub online: HashMap<NodeId, bool>,
    /// The sink's id, if one is present.
    pub sink: Option<NodeId>,
}

impl NetSnapshot {
    /// Create a new empty snapshot.
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            parent: HashMap::new(),
            distance: HashMap::new(),
            children: HashMap::new(),
            is_leaf: HashMap::new(),
            undefined: HashMap::new(),
            online: HashMap::new(),
            sink: None,
        }
    }

    /// Record one node's state.
    #[allow(clippy::too_many_arguments)]
    pub fn record_node(
        &mut self,
        id: NodeId,
        sink: bool,
        parent: Option<NodeId>,
        distance: u8,
        children: u8,
        is_leaf: bool,
        undefined: bool,
        online: bool,
    ) {
        if sink {
            self.sink = Some(id);
        }
        self.parent.insert(id, parent);
        self.distance.insert(id, distance);
        self.children.insert(id, children);
        self.is_leaf.insert(id, is_leaf);
        self.undefined.insert(id, undefined);
        self.online.insert(id, online);
    }

    /// True when every node has a tree position.
    pub fn all_defined(&self) -> bool {
        self.undefined.values().all(|&u| !u)
    }

    /// Nodes currently in the leaf role.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .is_leaf
            .iter()
            .filter(|(_, &leaf)| leaf)
            .map(|(&id, _)| id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Interior nodes: defined, not leaves. Includes the sink.
    pub fn backbone(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .is_leaf
            .iter()
            .filter(|(id, &leaf)| {
                !leaf && !self.undefined.get(*id).copied().unwrap_or(true)
            })
            .map(|(&id, _)| id)
            .collect();
        out.sort_unstable();
        out
    }

    /// The elected parent of a node.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parent.get(&id).copied().flatten()
    }

    /// The published distance of a node.
    pub fn distance_of(&self, id: NodeId) -> Option<u8> {
        self.distance.get(&id).copied()
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Datagram transmissions routed through the topology.
    pub messages_sent: u64,
    /// Datagrams dropped by link loss or inactive links.
    pub messages_dropped: u64,
    /// Datagrams dropped because the destination port was closed.
    pub messages_unheard: u64,
    /// Datagrams delivered to a node.
    pub messages_delivered: u64,
    /// Snapshots taken at intervals.
    pub snapshots: Vec<NetSnapshot>,
}

impl SimMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot.
    pub fn add_snapshot(&mut self, snapshot: NetSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Get the latest snapshot.
    pub fn latest_snapshot(&self) -> Option<&NetSnapshot> {
        self.snapshots.last()
    }

    /// First time every node had a tree position, if that ever happened.
    pub fn definition_time(&self) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.all_defined())
            .map(|s| s.time)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether the event queue drained before the time limit.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// True when every node had a tree position at the final snapshot.
    pub fn converged(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_defined())
    }

    /// The final snapshot.
    pub fn final_snapshot(&self) -> Option<&NetSnapshot> {
        self.metrics.latest_snapshot()
    }
}
