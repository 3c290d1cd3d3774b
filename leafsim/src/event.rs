//! Event types and ordering for the discrete event simulation.

use std::cmp::Ordering;

use leaftree::{NodeId, Timestamp};

/// Unique sequence number for deterministic ordering of same-time events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Disable every link touching a node (the node falls silent).
    Isolate { node: NodeId },
    /// Re-enable all links.
    RestoreLinks,
    /// Disable a specific link.
    DisableLink { a: NodeId, b: NodeId },
    /// Enable a specific link.
    EnableLink { a: NodeId, b: NodeId },
    /// Set the loss rate on a specific link.
    SetLossRate { a: NodeId, b: NodeId, rate: f64 },
    /// Set the loss rate on every link.
    SetGlobalLossRate { rate: f64 },
    /// Take a network snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Deliver a datagram to a node's port.
    DatagramDelivery {
        to: NodeId,
        port: u16,
        src: NodeId,
        data: Vec<u8>,
    },
    /// Fire a node's timer.
    TimerFire { node: NodeId },
    /// A node's application submits a payload for the sink.
    AppSend { from: NodeId, payload: Vec<u8> },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Implement ordering for min-heap (BinaryHeap is max-heap, so we reverse).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap: earliest time first, then lowest
        // sequence number.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
