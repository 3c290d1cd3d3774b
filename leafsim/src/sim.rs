//! Discrete event simulator for leaftree networks.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use leaftree::{Delivery, Duration, EnergyClass, Event as NodeEvent, MaxLeaf, NodeId, Policy, Timestamp};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{NetSnapshot, SimMetrics, SimulationResult};
use crate::node::{SimFrame, SimNode};
use crate::topology::Topology;

/// Discrete event simulator.
///
/// Events are processed in `(time, sequence)` order: datagram deliveries,
/// node timers, application sends, and scenario actions. Node timers are
/// scheduled from each node's own `next_timer()`, so sub-second relay
/// deadlines and second-scale controller periods coexist without polling.
pub struct Simulator<P: Policy = MaxLeaf> {
    /// All nodes in the simulation.
    nodes: HashMap<NodeId, SimNode<P>>,
    /// Network topology.
    topology: Topology,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// RNG state for packet loss decisions.
    rng_state: u64,
    /// Simulation seed (also feeds per-node RNG seeds).
    seed: u64,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
    /// Earliest pending timer event per node.
    timer_scheduled: HashMap<NodeId, Timestamp>,
    /// Payloads that reached a sink, in delivery order.
    sink_log: Vec<(NodeId, Delivery)>,
    /// Protocol events per node, in emission order.
    event_log: Vec<(NodeId, NodeEvent)>,
}

impl<P: Policy> Simulator<P> {
    /// Create a new simulator with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            next_seq: 0,
            rng_state: seed,
            seed,
            metrics: SimMetrics::new(),
            snapshot_interval: None,
            next_snapshot: None,
            timer_scheduled: HashMap::new(),
            sink_log: Vec::new(),
            event_log: Vec::new(),
        }
    }

    /// Set the network topology. Do this before adding nodes so their
    /// initial broadcasts are routed.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Record a snapshot every `interval` of simulated time.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add the sink node.
    pub fn add_sink(&mut self, id: NodeId) -> NodeId {
        self.add(id, true)
    }

    /// Add a sensor node.
    pub fn add_node(&mut self, id: NodeId) -> NodeId {
        self.add(id, false)
    }

    fn add(&mut self, id: NodeId, sink: bool) -> NodeId {
        let mut node = SimNode::new(id, sink, self.seed, self.current_time);
        node.inner_mut().initialize(self.current_time);
        self.nodes.insert(id, node);
        self.collect_outgoing(id);
        self.schedule_node_timer(id);
        id
    }

    /// Get a reference to a node.
    pub fn node(&self, id: &NodeId) -> Option<&SimNode<P>> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut SimNode<P>> {
        self.nodes.get_mut(id)
    }

    /// All node ids, sorted.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Set a node's energy class (energy-aware policies).
    pub fn set_energy(&mut self, id: NodeId, energy: EnergyClass) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set_energy(energy);
        }
    }

    /// Current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// The topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The topology, mutable.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Collected metrics.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Every payload delivered at a sink so far.
    pub fn sink_log(&self) -> &[(NodeId, Delivery)] {
        &self.sink_log
    }

    /// Every protocol event emitted so far.
    pub fn event_log(&self) -> &[(NodeId, NodeEvent)] {
        &self.event_log
    }

    /// Have a node submit a payload right now.
    pub fn send_from(&mut self, id: NodeId, payload: &[u8]) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.send(payload, now);
        }
        self.collect_outgoing(id);
        self.schedule_node_timer(id);
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run the simulation until the given time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while let Some(event) = self.event_queue.peek() {
            if event.time > end_time {
                break;
            }

            let event = match self.event_queue.pop() {
                Some(e) => e,
                None => break,
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    /// Run the simulation for a duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::DatagramDelivery {
                to,
                port,
                src,
                data,
            } => {
                self.deliver_datagram(to, port, src, data);
            }
            Event::TimerFire { node } => {
                self.fire_timer(node);
            }
            Event::AppSend { from, payload } => {
                self.send_from(from, &payload);
            }
            Event::ScenarioAction(action) => {
                self.execute_action(action);
            }
        }
    }

    fn deliver_datagram(&mut self, to: NodeId, port: u16, src: NodeId, data: Vec<u8>) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };

        // A closed port is a powered-down transceiver: nothing is heard.
        if !node.is_port_open(port) {
            self.metrics.messages_unheard += 1;
            return;
        }

        node.handle_datagram(port, src, &data, now);
        self.metrics.messages_delivered += 1;

        self.collect_outgoing(to);
        self.schedule_node_timer(to);
    }

    fn fire_timer(&mut self, id: NodeId) {
        if self.timer_scheduled.get(&id) == Some(&self.current_time) {
            self.timer_scheduled.remove(&id);
        }

        let now = self.current_time;
        match self.nodes.get_mut(&id) {
            Some(node) => node.handle_timer(now),
            None => return,
        }

        self.collect_outgoing(id);
        self.schedule_node_timer(id);
    }

    /// Schedule the next timer event for a node, keeping at most one
    /// pending entry per node. Superseded entries fire as no-ops.
    fn schedule_node_timer(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let at = node.next_timer().max(self.current_time);

        match self.timer_scheduled.get(&id) {
            Some(&t) if t >= self.current_time && t <= at => {}
            _ => {
                self.timer_scheduled.insert(id, at);
                self.schedule(at, Event::TimerFire { node: id });
            }
        }
    }

    /// Drain a node's transmissions and application outputs, routing the
    /// transmissions through the topology.
    fn collect_outgoing(&mut self, sender: NodeId) {
        let (frames, deliveries, events) = match self.nodes.get_mut(&sender) {
            Some(node) => (
                node.take_outgoing(),
                node.take_deliveries(),
                node.take_events(),
            ),
            None => return,
        };

        for delivery in deliveries {
            self.sink_log.push((sender, delivery));
        }
        for event in events {
            self.event_log.push((sender, event));
        }
        for frame in frames {
            self.route_frame(sender, frame);
        }
    }

    fn route_frame(&mut self, sender: NodeId, frame: SimFrame) {
        self.metrics.messages_sent += 1;

        match frame.dest {
            None => {
                for neighbor in self.topology.neighbors(sender) {
                    let Some((loss, delay)) = self.link_properties(sender, neighbor) else {
                        continue;
                    };
                    if loss > 0.0 && self.random_f64() < loss {
                        self.metrics.messages_dropped += 1;
                        continue;
                    }
                    let at = self.current_time + delay;
                    self.schedule(
                        at,
                        Event::DatagramDelivery {
                            to: neighbor,
                            port: frame.port,
                            src: sender,
                            data: frame.data.clone(),
                        },
                    );
                }
            }
            Some(dest) => {
                let Some((loss, delay)) = self.link_properties(sender, dest) else {
                    // Out of range: the hop-level retry logic deals with it.
                    self.metrics.messages_dropped += 1;
                    return;
                };
                if loss > 0.0 && self.random_f64() < loss {
                    self.metrics.messages_dropped += 1;
                    return;
                }
                let at = self.current_time + delay;
                self.schedule(
                    at,
                    Event::DatagramDelivery {
                        to: dest,
                        port: frame.port,
                        src: sender,
                        data: frame.data,
                    },
                );
            }
        }
    }

    fn link_properties(&self, a: NodeId, b: NodeId) -> Option<(f64, Duration)> {
        self.topology
            .get_link(a, b)
            .filter(|link| link.active)
            .map(|link| (link.loss_rate, link.delay))
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        match action {
            ScenarioAction::Isolate { node } => {
                self.topology.isolate(node);
            }
            ScenarioAction::RestoreLinks => {
                self.topology.restore();
            }
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::SetGlobalLossRate { rate } => {
                self.topology.set_global_loss_rate(rate);
            }
            ScenarioAction::TakeSnapshot => {
                self.take_snapshot();
            }
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record the network's current state.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = NetSnapshot::new(self.current_time);
        for (&id, node) in &self.nodes {
            snapshot.record_node(
                id,
                node.is_sink(),
                node.parent_id(),
                node.distance(),
                node.children_count(),
                node.is_leaf(),
                node.is_undefined(),
                node.is_online(),
            );
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Generate a random f64 in [0, 1) for loss decisions.
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Link;

    #[test]
    fn test_simulator_creation() {
        let sim: Simulator = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
    }

    #[test]
    fn test_two_nodes_form_tree() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, Link::new());

        let mut sim: Simulator = Simulator::new(42).with_topology(topo);
        sim.add_sink(1);
        sim.add_node(2);

        let result = sim.run_for(Duration::from_secs(10));
        assert!(result.converged());

        let node = sim.node(&2).unwrap();
        assert_eq!(node.parent_id(), Some(1));
        assert_eq!(node.distance(), 1);
        assert!(node.is_leaf());
        assert!(sim.node(&1).unwrap().is_sink());
    }

    #[test]
    fn test_payload_reaches_sink() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, Link::new());

        let mut sim: Simulator = Simulator::new(42).with_topology(topo);
        sim.add_sink(1);
        sim.add_node(2);
        sim.run_for(Duration::from_secs(10));

        sim.send_from(2, b"reading");
        sim.run_for(Duration::from_secs(2));

        assert_eq!(sim.sink_log().len(), 1);
        let (sink, delivery) = &sim.sink_log()[0];
        assert_eq!(*sink, 1);
        assert_eq!(delivery.from, 2);
        assert_eq!(delivery.payload, b"reading");
    }

    #[test]
    fn test_lossy_link_drops_messages() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, Link::new().with_loss_rate(0.5));

        let mut sim: Simulator = Simulator::new(42)
            .with_topology(topo)
            .with_snapshot_interval(Duration::from_millis(500));
        sim.add_sink(1);
        sim.add_node(2);
        sim.run_for(Duration::from_secs(20));

        assert!(sim.metrics().messages_dropped > 0);
        // Gossip is redundant enough that the tree still forms.
        assert!(sim.metrics().definition_time().is_some());
    }

    #[test]
    fn test_sleeping_node_does_not_hear() {
        let mut topo = Topology::new();
        topo.add_link(1, 2, Link::new());

        let mut sim: Simulator = Simulator::new(42).with_topology(topo);
        sim.add_sink(1);
        sim.add_node(2);
        sim.run_for(Duration::from_secs(12));

        // By now node 2 is a settled leaf and spends periods offline,
        // during which sink broadcasts go unheard.
        assert!(sim.metrics().messages_unheard > 0);
    }
}
