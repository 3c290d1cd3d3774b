//! Network topology and link properties.

use hashbrown::HashMap;
use leaftree::{Duration, NodeId};

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Packet loss rate (0.0 to 1.0), applied per datagram per direction.
    pub loss_rate: f64,
    /// Propagation delay.
    pub delay: Duration,
    /// Whether the link is currently active.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    /// Create a new link with default properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Network topology defining connectivity between nodes.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Links between pairs of nodes (bidirectional).
    links: HashMap<(NodeId, NodeId), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fully connected topology for the given nodes.
    pub fn fully_connected(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Create a chain topology (each node hears only its neighbors).
    pub fn chain(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for window in nodes.windows(2) {
            topo.add_link(window[0], window[1], Link::default());
        }
        topo
    }

    /// Create a star topology (first node is the hub).
    pub fn star(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        if nodes.is_empty() {
            return topo;
        }
        let hub = nodes[0];
        for &spoke in nodes.iter().skip(1) {
            topo.add_link(hub, spoke, Link::default());
        }
        topo
    }

    /// Add a bidirectional link between two nodes.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    /// Get a link between two nodes.
    pub fn get_link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    /// Get a mutable link between two nodes.
    pub fn get_link_mut(&mut self, a: NodeId, b: NodeId) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// Check if two nodes are connected (link exists and is active).
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Get all nodes a given node can currently reach.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for (&(a, b), link) in &self.links {
            if link.active {
                if a == node {
                    result.push(b);
                } else if b == node {
                    result.push(a);
                }
            }
        }
        result
    }

    /// Disable every link touching a node.
    pub fn isolate(&mut self, node: NodeId) {
        for (&(a, b), link) in self.links.iter_mut() {
            if a == node || b == node {
                link.active = false;
            }
        }
    }

    /// Re-enable all links.
    pub fn restore(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    /// Set the loss rate on every link.
    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    /// Canonical pair ordering for consistent link storage.
    fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain() {
        let topo = Topology::chain(&[1, 2, 3, 4]);

        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(2, 3));
        assert!(topo.is_connected(3, 4));
        assert!(!topo.is_connected(1, 3));
        assert!(!topo.is_connected(1, 4));
    }

    #[test]
    fn test_star() {
        let topo = Topology::star(&[1, 2, 3, 4]);

        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(1, 3));
        assert!(topo.is_connected(1, 4));
        assert!(!topo.is_connected(2, 3));
    }

    #[test]
    fn test_fully_connected() {
        let nodes = [1, 2, 3];
        let topo = Topology::fully_connected(&nodes);
        for &a in &nodes {
            for &b in &nodes {
                if a != b {
                    assert!(topo.is_connected(a, b));
                }
            }
        }
    }

    #[test]
    fn test_isolate_and_restore() {
        let mut topo = Topology::fully_connected(&[1, 2, 3]);
        topo.isolate(2);

        assert!(!topo.is_connected(1, 2));
        assert!(!topo.is_connected(2, 3));
        assert!(topo.is_connected(1, 3));
        assert!(topo.neighbors(2).is_empty());

        topo.restore();
        assert!(topo.is_connected(1, 2));
    }

    #[test]
    fn test_neighbors() {
        let topo = Topology::star(&[1, 2, 3, 4]);
        let mut hub = topo.neighbors(1);
        hub.sort_unstable();
        assert_eq!(hub, vec![2, 3, 4]);
        assert_eq!(topo.neighbors(2), vec![1]);
    }
}
