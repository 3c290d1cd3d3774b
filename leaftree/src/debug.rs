//! Debug events for protocol tracing.
//!
//! Every diagnostic the protocol produces goes through here: install a
//! `DebugEmitter` to collect or print them. Without an emitter, events are
//! dropped at zero cost beyond construction.

use crate::time::Timestamp;
use crate::types::NodeId;

/// Trait for receiving debug events from a node.
/// Implemented by test harnesses to collect/print events.
pub trait DebugEmitter: Send {
    /// Called when a debug event is emitted.
    fn emit(&mut self, event: DebugEvent);
}

/// Debug events emitted by the node for protocol tracing.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    /// A gossip record arrived and was stored.
    RecordHeard {
        from: NodeId,
        is_new: bool,
        changed: bool,
    },
    /// A gossip datagram failed to decode and was dropped.
    RecordDecodeFailed { from: NodeId, len: usize },
    /// A neighbor entry aged out.
    NeighborExpired { id: NodeId },
    /// The expired neighbor was the current parent; state reset to undefined.
    ParentLost { id: NodeId },
    /// The election adopted a parent.
    Elected {
        parent: NodeId,
        distance: u8,
        children: u8,
    },
    /// Several equally good parents; deferring one period to desynchronize.
    ElectionDeferred,
    /// No usable parent candidate this period.
    NoCandidate { children: u8 },
    /// The gossip link went online or offline.
    SleepChanged { online: bool },
    /// A controller period ran.
    PeriodTick { timestamp: Timestamp },
    /// The head-of-queue frame was transmitted toward the parent.
    FrameSent {
        dest: NodeId,
        seqno: u8,
        tries: u8,
    },
    /// The in-flight frame was acknowledged.
    AckReceived { from: NodeId },
    /// An acknowledgement arrived with nothing in flight.
    UnexpectedAck { from: NodeId },
    /// The in-flight frame timed out.
    SendTimeout { parent: NodeId, tries: u8 },
    /// The frame exhausted its retries and was dropped.
    SendAbandoned { parent: NodeId, tries: u8 },
    /// A received payload was a duplicate and was not propagated.
    DuplicateDropped { from: NodeId, seqno: u8 },
    /// A received payload was re-enqueued toward this node's parent.
    Forwarded { from: NodeId, seqno: u8 },
    /// A payload reached the sink's delivery channel.
    SinkDelivered { from: NodeId, seqno: u8 },
    /// A datagram arrived on a port no subsystem owns.
    OrphanDatagram { port: u16, from: NodeId },
}
