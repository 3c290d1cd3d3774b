//! SimNode wrapper and simulated platform implementations.

use std::cell::Cell;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};

use leaftree::debug::{DebugEmitter, DebugEvent};
use leaftree::{
    Clock, Datagram, DefaultConfig, Delivery, EnergyClass, Event, MaxLeaf, Node, NodeId, Policy,
    Radio, Random, Timestamp,
};

use leaftree::types::DatagramChannel;

/// A frame transmitted by a simulated radio.
#[derive(Debug, Clone)]
pub struct SimFrame {
    /// Port the frame was sent on.
    pub port: u16,
    /// `None` for broadcasts, the destination id for unicasts.
    pub dest: Option<NodeId>,
    /// Frame payload.
    pub data: Vec<u8>,
}

/// Simulated radio: records transmissions, tracks open ports.
///
/// The open-port set is what makes sleep observable: the simulator drops
/// datagrams addressed to a closed port, exactly like a powered-down
/// transceiver.
pub struct SimRadio {
    mtu: usize,
    open_ports: Vec<u16>,
    sent: Vec<SimFrame>,
    incoming: DatagramChannel,
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            mtu: 128,
            open_ports: Vec::new(),
            sent: Vec::new(),
            incoming: DatagramChannel::new(),
        }
    }

    /// Whether a port is currently open.
    pub fn is_open(&self, port: u16) -> bool {
        self.open_ports.contains(&port)
    }

    /// Drain all frames transmitted since the last call.
    pub fn take_sent(&mut self) -> Vec<SimFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SimRadioError;

impl Radio for SimRadio {
    type Error = SimRadioError;

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn open(&mut self, port: u16) {
        if !self.open_ports.contains(&port) {
            self.open_ports.push(port);
        }
    }

    fn close(&mut self, port: u16) {
        self.open_ports.retain(|&p| p != port);
    }

    fn broadcast(&mut self, port: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.push(SimFrame {
            port,
            dest: None,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn unicast(&mut self, port: u16, dest: NodeId, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.push(SimFrame {
            port,
            dest: Some(dest),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn incoming(&self) -> &DatagramChannel {
        &self.incoming
    }
}

/// Simulated clock: time is set externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _deadline: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Simulated random source (deterministic LCG).
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let range = max - min;
        if range == 0 {
            return min;
        }
        min + (self.state % range)
    }
}

/// Debug emitter that prints events to stderr with node identification.
pub struct PrintEmitter {
    node_id: NodeId,
}

impl PrintEmitter {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

impl DebugEmitter for PrintEmitter {
    fn emit(&mut self, event: DebugEvent) {
        eprintln!("node {:5}: {:?}", self.node_id, event);
    }
}

/// Debug emitter that collects events into a shared Vec.
///
/// Uses `std::sync::Mutex`; simulation only, not for embedded targets.
pub struct VecEmitter {
    events: Arc<Mutex<Vec<DebugEvent>>>,
}

impl VecEmitter {
    pub fn new(events: Arc<Mutex<Vec<DebugEvent>>>) -> Self {
        Self { events }
    }
}

impl DebugEmitter for VecEmitter {
    fn emit(&mut self, event: DebugEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner<P> = Node<SimRadio, SimRandom, SimClock, P, DefaultConfig>;

/// Wrapper around a protocol node for simulation.
pub struct SimNode<P: Policy = MaxLeaf> {
    inner: SimNodeInner<P>,
}

impl<P: Policy> SimNode<P> {
    /// Create a node. The RNG is seeded from the node id so neighboring
    /// nodes diverge immediately.
    pub fn new(id: NodeId, sink: bool, seed: u64, created_at: Timestamp) -> Self {
        let radio = SimRadio::new();
        let random = SimRandom::with_seed(seed ^ (id as u64).wrapping_mul(0x9E3779B97F4A7C15));
        let clock = SimClock::at(created_at);

        let inner = if sink {
            Node::sink(radio, random, clock, id)
        } else {
            Node::new(radio, random, clock, id)
        };

        Self { inner }
    }

    /// Get a reference to the inner node.
    pub fn inner(&self) -> &SimNodeInner<P> {
        &self.inner
    }

    /// Get a mutable reference to the inner node.
    pub fn inner_mut(&mut self) -> &mut SimNodeInner<P> {
        &mut self.inner
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    pub fn is_sink(&self) -> bool {
        self.inner.is_sink()
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.inner.parent_id()
    }

    pub fn distance(&self) -> u8 {
        self.inner.distance()
    }

    pub fn children_count(&self) -> u8 {
        self.inner.children_count()
    }

    pub fn is_leaf(&self) -> bool {
        self.inner.is_leaf()
    }

    pub fn is_undefined(&self) -> bool {
        self.inner.is_undefined()
    }

    /// Whether the gossip link is open.
    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    pub fn neighbor_count(&self) -> usize {
        self.inner.neighbor_count()
    }

    pub fn set_energy(&mut self, energy: EnergyClass) {
        self.inner.set_energy_state(energy);
    }

    /// Whether a datagram sent to `port` would currently be heard.
    pub fn is_port_open(&self, port: u16) -> bool {
        self.inner.radio().is_open(port)
    }

    pub fn handle_datagram(&mut self, port: u16, src: NodeId, data: &[u8], now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_datagram(port, src, data, now);
    }

    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(now);
    }

    pub fn next_timer(&self) -> Timestamp {
        self.inner.next_timer()
    }

    /// Submit an application payload for the sink.
    pub fn send(&mut self, payload: &[u8], now: Timestamp) {
        self.inner.clock().set(now);
        let _ = self.inner.send(payload);
    }

    /// Drain frames transmitted since the last call.
    pub fn take_outgoing(&mut self) -> Vec<SimFrame> {
        self.inner.radio_mut().take_sent()
    }

    /// Drain payloads delivered to this node as the sink.
    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(d) = self.inner.deliveries().try_receive() {
            out.push(d);
        }
        out
    }

    /// Drain protocol events.
    pub fn take_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(e) = self.inner.events().try_receive() {
            out.push(e);
        }
        out
    }

    /// Install a debug emitter on the inner node.
    pub fn set_debug_emitter(&self, emitter: Box<dyn DebugEmitter>) {
        self.inner.set_debug_emitter(emitter);
    }

    /// Construct a datagram as this node's radio would receive it.
    pub fn make_datagram(port: u16, src: NodeId, data: Vec<u8>) -> Datagram {
        Datagram { port, src, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaftree::DefaultConfig;
    use leaftree::NodeConfig;

    #[test]
    fn test_simnode_initialize_broadcasts() {
        let mut node: SimNode = SimNode::new(2, false, 42, Timestamp::ZERO);
        node.inner_mut().initialize(Timestamp::ZERO);

        let frames = node.take_outgoing();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].port, DefaultConfig::GOSSIP_PORT);
        assert!(node.is_port_open(DefaultConfig::GOSSIP_PORT));
        assert!(node.is_port_open(DefaultConfig::DATA_PORT));
        assert!(node.is_port_open(DefaultConfig::ACK_PORT));
    }

    #[test]
    fn test_sim_random_diverges_by_seed() {
        // Same simulation seed, different ids: node RNG streams diverge
        // from the first draw.
        let mut a = SimRandom::with_seed(42 ^ 2u64.wrapping_mul(0x9E3779B97F4A7C15));
        let mut b = SimRandom::with_seed(42 ^ 3u64.wrapping_mul(0x9E3779B97F4A7C15));
        let big = 1u64 << 48;
        assert_ne!(a.gen_range(0, big), b.gen_range(0, big));
    }

    #[test]
    fn test_simclock_external_control() {
        let clock = SimClock::at(Timestamp::ZERO);
        clock.set(Timestamp::from_secs(5));
        assert_eq!(clock.now(), Timestamp::from_secs(5));
    }
}
