//! Core types and constants for the leaftree protocol.

use alloc::vec::Vec;
use core::fmt;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

/// 16-bit node identifier, unique on the link.
///
/// Hardware link addresses map to ids big-endian: `id = (addr[0] << 8) | addr[1]`.
pub type NodeId = u16;

/// Reserved id meaning "no parent / undefined state".
pub const PARENT_NONE: NodeId = 0;

/// Parent sentinel published by the sink ("I am root").
pub const PARENT_ROOT: NodeId = 0xFFFF;

/// Distance sentinel for nodes without a tree position.
pub const DISTANCE_UNDEFINED: u8 = 0xFF;

/// Children sentinel published by the sink.
pub const CHILDREN_ROOT: u8 = 0xFF;

/// The single-byte acknowledgement frame.
pub const ACK_BYTE: u8 = b'A';

/// Coarse battery classification published by the energy-aware variants.
///
/// Lower value means more remaining energy. `Undefined` nodes are never
/// used as parents; they are counted as potential children instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum EnergyClass {
    #[default]
    Undefined = 0,
    High = 1,
    Mid = 2,
    Low = 3,
}

impl EnergyClass {
    /// Decode a wire byte. Unknown values map to `Undefined` (gossip is
    /// best-effort and must not reject a whole record over one bad field).
    pub fn from_wire(v: u8) -> Self {
        match v {
            1 => EnergyClass::High,
            2 => EnergyClass::Mid,
            3 => EnergyClass::Low,
            _ => EnergyClass::Undefined,
        }
    }

    /// Edge weight used by the weighted-distance variant.
    pub fn weight(self) -> u16 {
        self as u16
    }
}

/// A datagram handed to the node by the radio layer.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Port the datagram arrived on.
    pub port: u16,
    /// Sender id decoded from the link address.
    pub src: NodeId,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

/// A payload that reached the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The immediate child the final hop came from (not the originator;
    /// the wire frame carries no origin field).
    pub from: NodeId,
    /// The application payload, seqno stripped.
    pub payload: Vec<u8>,
}

/// Protocol events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A queued payload timed out waiting for an acknowledgement.
    /// Fired on every timeout, with the retry count so far; after
    /// `MAX_TRIES` the payload is dropped.
    DeliveryTimeout { parent: NodeId, tries: u8 },
    /// The elected parent changed. `PARENT_NONE` means the node fell back
    /// to the undefined state.
    ParentChanged { parent: NodeId },
}

/// Error type for node operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Payload plus framing exceeds the radio MTU.
    MessageTooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MessageTooLarge => write!(f, "message too large"),
        }
    }
}

// Channel aliases for the application-facing queues. NoopRawMutex: the
// protocol runs single-threaded cooperative, there is no preemption to
// guard against.

/// Incoming datagrams from the radio (used by the async run loop).
pub type DatagramChannel = Channel<NoopRawMutex, Datagram, 8>;
/// Application payload submissions.
pub type SendChannel = Channel<NoopRawMutex, Vec<u8>, 4>;
/// Payload deliveries at the sink.
pub type DeliveryChannel = Channel<NoopRawMutex, Delivery, 4>;
/// Protocol events.
pub type EventChannel = Channel<NoopRawMutex, Event, 8>;
