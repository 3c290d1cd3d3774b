//! Node implementation - state, API surface, and event dispatch.
//!
//! A `Node` owns the three subsystems (gossip table, election policy,
//! relay) plus the platform handles injected at construction. It is driven
//! either by calling the synchronous handlers directly — simulation and
//! bare-metal loops do this — or through the async `run()` method:
//!
//! - `handle_datagram` for every received datagram,
//! - `handle_timer` whenever `next_timer()` passes,
//! - `send` / the send channel for application payloads.
//!
//! The controller's period logic lives in `tree.rs`.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use crate::config::{DefaultConfig, NodeConfig};
use crate::debug::{DebugEmitter, DebugEvent};
use crate::gossip::{GossipEvent, Neighborhood};
use crate::policy::{MaxLeaf, Policy, Record};
use crate::relay::{AckOutcome, DataOutcome, Relay, RelayPoll};
use crate::time::Timestamp;
use crate::traits::{Clock, Radio, Random};
use crate::types::{
    Datagram, DeliveryChannel, Delivery, EnergyClass, Error, Event, EventChannel, NodeId,
    SendChannel, PARENT_NONE,
};

/// Whether this node is the network's sink or an ordinary sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The distinguished root all payloads flow toward. Never sleeps,
    /// never elects, publishes the root record unconditionally.
    Sink,
    /// A sensor node that elects a parent and may become a sleeping leaf.
    Sensor,
}

/// A protocol node.
///
/// Generic over:
/// - `L`: radio implementation
/// - `R`: random number generator (seed from the node id)
/// - `C`: clock source
/// - `P`: election policy (defaults to [`MaxLeaf`])
/// - `Cfg`: protocol tuning (defaults to [`DefaultConfig`])
pub struct Node<L, R, C, P: Policy = MaxLeaf, Cfg: NodeConfig = DefaultConfig> {
    // Platform handles (injected)
    pub(crate) radio: L,
    pub(crate) random: R,
    pub(crate) clock: C,

    pub(crate) _config: PhantomData<Cfg>,

    // Identity
    pub(crate) id: NodeId,
    pub(crate) role: Role,
    pub(crate) energy: EnergyClass,

    // Subsystems
    pub(crate) record: P::Record,
    pub(crate) gossip: Neighborhood<P::Record>,
    pub(crate) relay: Relay<Cfg>,

    // Period state
    pub(crate) stay_active: u8,
    pub(crate) period_divisor: u8,
    pub(crate) next_period: Timestamp,

    // Application-facing channels
    pub(crate) outbox: SendChannel,
    pub(crate) deliveries: DeliveryChannel,
    pub(crate) events: EventChannel,

    // Tracing
    debug: RefCell<Option<Box<dyn DebugEmitter>>>,
}

impl<L, R, C, P, Cfg> Node<L, R, C, P, Cfg>
where
    L: Radio,
    R: Random,
    C: Clock,
    P: Policy,
    Cfg: NodeConfig,
{
    /// Create a sensor node.
    pub fn new(radio: L, random: R, clock: C, id: NodeId) -> Self {
        Self::with_role(radio, random, clock, id, Role::Sensor)
    }

    /// Create the sink node. There must be exactly one on the link.
    pub fn sink(radio: L, random: R, clock: C, id: NodeId) -> Self {
        Self::with_role(radio, random, clock, id, Role::Sink)
    }

    fn with_role(radio: L, random: R, clock: C, id: NodeId, role: Role) -> Self {
        let record = match role {
            Role::Sink => P::sink_record(EnergyClass::Undefined),
            Role::Sensor => P::undefined_record(0, EnergyClass::Undefined),
        };
        let mut gossip = Neighborhood::new(Cfg::GOSSIP_PORT, Cfg::MAX_NEIGHBOR_AGE);
        gossip.set_change_predicate(<P::Record as Record>::tree_shape_changed);

        Self {
            radio,
            random,
            clock,
            _config: PhantomData,
            id,
            role,
            energy: EnergyClass::Undefined,
            record,
            gossip,
            relay: Relay::new(),
            stay_active: 0,
            period_divisor: 1,
            next_period: Timestamp::ZERO,
            outbox: SendChannel::new(),
            deliveries: DeliveryChannel::new(),
            events: EventChannel::new(),
            debug: RefCell::new(None),
        }
    }

    /// Bring the node up: open the links, publish the initial record, and
    /// schedule the first period.
    ///
    /// Call once before driving the handlers; `run()` does it for you.
    pub fn initialize(&mut self, now: Timestamp) {
        self.gossip.set_online(&mut self.radio);
        self.relay.init(&mut self.radio);
        let record = self.record.clone();
        self.gossip.broadcast(&mut self.radio, &record);
        self.next_period = now + self.period_length();
    }

    // --- Identity and state accessors ---

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this node is the sink.
    pub fn is_sink(&self) -> bool {
        self.role == Role::Sink
    }

    /// The currently published record.
    pub fn record(&self) -> &P::Record {
        &self.record
    }

    /// The elected parent, if any. The sink has none.
    pub fn parent_id(&self) -> Option<NodeId> {
        match self.record.parent_id() {
            PARENT_NONE => None,
            p if p == crate::types::PARENT_ROOT => None,
            p => Some(p),
        }
    }

    /// True while no parent is elected. An undefined node is not yet part
    /// of the tree; applications may want to hold off reading sensors.
    pub fn is_undefined(&self) -> bool {
        self.record.parent_id() == PARENT_NONE
    }

    /// True when this node has a parent and no children: it may sleep.
    pub fn is_leaf(&self) -> bool {
        !self.is_undefined() && self.role == Role::Sensor && self.record.children_count() == 0
    }

    /// The published hop distance toward the sink.
    pub fn distance(&self) -> u8 {
        self.record.distance()
    }

    /// The published children count.
    pub fn children_count(&self) -> u8 {
        self.record.children_count()
    }

    /// Number of live gossip neighbors.
    pub fn neighbor_count(&self) -> usize {
        self.gossip.len()
    }

    /// The gossip table, for inspection.
    pub fn neighborhood(&self) -> &Neighborhood<P::Record> {
        &self.gossip
    }

    /// Whether the gossip link is currently open.
    pub fn is_online(&self) -> bool {
        self.gossip.is_online()
    }

    /// The relay, for inspection.
    pub fn relay(&self) -> &Relay<Cfg> {
        &self.relay
    }

    /// This node's energy class.
    pub fn energy(&self) -> EnergyClass {
        self.energy
    }

    /// Publish a new energy class from the next period on.
    ///
    /// Energy classes should change seldom: a change can move whole
    /// subtrees.
    pub fn set_energy_state(&mut self, energy: EnergyClass) {
        self.energy = energy;
    }

    /// Get the radio reference.
    pub fn radio(&self) -> &L {
        &self.radio
    }

    /// Get the radio mutably (simulators drain sent frames through this).
    pub fn radio_mut(&mut self) -> &mut L {
        &mut self.radio
    }

    /// Get a reference to the clock.
    /// Useful for simulation where the clock is advanced externally.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    // --- Application-facing channels ---

    /// Channel for submitting payloads from async contexts; drained by
    /// `run()`. Synchronous callers use [`Node::send`] directly.
    pub fn sends(&self) -> &SendChannel {
        &self.outbox
    }

    /// Channel of payloads that reached this node as the sink.
    pub fn deliveries(&self) -> &DeliveryChannel {
        &self.deliveries
    }

    /// Channel of protocol events (delivery timeouts, parent changes).
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Install a debug emitter for protocol tracing.
    pub fn set_debug_emitter(&self, emitter: Box<dyn DebugEmitter>) {
        *self.debug.borrow_mut() = Some(emitter);
    }

    pub(crate) fn emit(&self, event: DebugEvent) {
        if let Some(emitter) = self.debug.borrow_mut().as_mut() {
            emitter.emit(event);
        }
    }

    // --- Sending ---

    /// Queue a payload for delivery to the sink.
    ///
    /// The payload is copied; delivery is per-hop reliable only. A node
    /// without a parent holds the payload until one is elected. The sink
    /// consumes payloads and never produces them.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.len() + 1 > self.radio.mtu() {
            return Err(Error::MessageTooLarge);
        }
        let now = self.clock.now();
        self.relay
            .enqueue(&mut self.radio, &mut self.random, payload, now);
        Ok(())
    }

    // --- Event dispatch ---

    /// The next instant `handle_timer` has work to do.
    pub fn next_timer(&self) -> Timestamp {
        match self.relay.next_deadline() {
            Some(d) => d.min(self.next_period),
            None => self.next_period,
        }
    }

    /// Handle a received datagram, demultiplexed by port.
    pub fn handle_datagram(&mut self, port: u16, src: NodeId, data: &[u8], now: Timestamp) {
        if port == Cfg::GOSSIP_PORT {
            match self.gossip.handle_datagram(src, data, now) {
                Ok(event) => {
                    if event.is_some() {
                        self.stay_active = Cfg::STAY_ACTIVE_PERIODS;
                    }
                    self.emit(DebugEvent::RecordHeard {
                        from: src,
                        is_new: matches!(event, Some(GossipEvent::New(_))),
                        changed: matches!(event, Some(GossipEvent::Changed(_))),
                    });
                }
                Err(_) => {
                    self.emit(DebugEvent::RecordDecodeFailed {
                        from: src,
                        len: data.len(),
                    });
                }
            }
        } else if port == Cfg::DATA_PORT {
            let is_sink = self.role == Role::Sink;
            match self.relay.on_data(&mut self.radio, src, data, is_sink) {
                DataOutcome::Deliver {
                    from,
                    seqno,
                    payload,
                } => {
                    self.emit(DebugEvent::SinkDelivered { from, seqno });
                    let _ = self.deliveries.try_send(Delivery { from, payload });
                }
                DataOutcome::Forward {
                    from,
                    seqno,
                    payload,
                } => {
                    self.emit(DebugEvent::Forwarded { from, seqno });
                    self.relay
                        .enqueue(&mut self.radio, &mut self.random, &payload, now);
                }
                DataOutcome::Duplicate { from, seqno } => {
                    self.emit(DebugEvent::DuplicateDropped { from, seqno });
                }
                DataOutcome::Malformed { from } => {
                    self.emit(DebugEvent::RecordDecodeFailed {
                        from,
                        len: data.len(),
                    });
                }
            }
        } else if port == Cfg::ACK_PORT {
            match self.relay.on_ack(&mut self.radio, &mut self.random, now) {
                AckOutcome::Popped => self.emit(DebugEvent::AckReceived { from: src }),
                AckOutcome::Unexpected => self.emit(DebugEvent::UnexpectedAck { from: src }),
            }
        } else {
            self.emit(DebugEvent::OrphanDatagram { port, from: src });
        }
    }

    /// Handle timer work: relay deadlines and the controller period.
    pub fn handle_timer(&mut self, now: Timestamp) {
        if let Some(deadline) = self.relay.next_deadline() {
            if now >= deadline {
                match self.relay.poll(&mut self.radio, &mut self.random, now) {
                    Some(RelayPoll::Sent { dest, seqno, tries }) => {
                        self.emit(DebugEvent::FrameSent { dest, seqno, tries });
                    }
                    Some(RelayPoll::TimedOut {
                        parent,
                        tries,
                        abandoned,
                    }) => {
                        self.emit(DebugEvent::SendTimeout { parent, tries });
                        if abandoned {
                            self.emit(DebugEvent::SendAbandoned { parent, tries });
                        }
                        let _ = self.events.try_send(Event::DeliveryTimeout { parent, tries });
                    }
                    None => {}
                }
            }
        }

        if now >= self.next_period {
            self.tick(now);
        }
    }

    /// Run the node forever on an async executor.
    ///
    /// Waits on received datagrams, application sends, and the next timer
    /// deadline; everything else is the synchronous handlers.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select3, Either3};

        let now = self.clock.now();
        self.initialize(now);

        loop {
            let wake = self.next_timer();
            let result = select3(
                self.radio.incoming().receive(),
                self.outbox.receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            match result {
                Either3::First(datagram) => {
                    let Datagram { port, src, data } = datagram;
                    let now = self.clock.now();
                    self.handle_datagram(port, src, &data, now);
                }
                Either3::Second(payload) => {
                    let payload: Vec<u8> = payload;
                    let _ = self.send(&payload);
                }
                Either3::Third(()) => {
                    let now = self.clock.now();
                    self.handle_timer(now);
                }
            }
        }
    }
}

impl<L, R, C, P, Cfg> fmt::Display for Node<L, R, C, P, Cfg>
where
    P: Policy,
    Cfg: NodeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {}: tree[parent={}, distance={}, children={}] neighbors[{}] relay[queued={}, {}]",
            self.id,
            self.record.parent_id(),
            self.record.distance(),
            self.record.children_count(),
            self.gossip.len(),
            self.relay.queue_len(),
            if self.gossip.is_online() {
                "online"
            } else {
                "offline"
            },
        )
    }
}
