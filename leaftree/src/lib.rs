//! leaftree - self-stabilizing maximum-leaf spanning tree for sensor meshes
//!
//! A wireless multi-hop network continuously maintains a spanning tree
//! rooted at a sink node and relays application payloads toward it, hop by
//! acknowledged hop. The tree is grown to maximize the number of leaves:
//! leaves power their radios down, while the interior backbone stays
//! online. Energy-aware variants additionally steer energy-poor nodes
//! toward the leaf role.
//!
//! # Key Properties
//!
//! - Nodes agree on parents purely through periodic one-hop gossip
//! - Self-stabilizing: converges from any state once the graph is stable
//! - Leaves sleep, wake on any observed change, and refresh their view of
//!   the parent before sleeping again
//! - Per-hop reliability: ACKs, bounded retries, duplicate suppression
//!
//! # Example
//!
//! ```no_run
//! use leaftree::{Node, Radio, Clock, Random};
//!
//! // Implement Radio, Clock and Random for your platform...
//!
//! // let mut node = Node::new(radio, random, clock, id);
//! //
//! // Either drive it from your main loop:
//! // node.initialize(clock.now());
//! // loop {
//! //     node.handle_datagram(port, src, &data, now);   // per reception
//! //     node.handle_timer(now);                        // when next_timer() passes
//! // }
//! //
//! // ...or spawn `node.run()` on an async executor.
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (NodeId, EnergyClass, events, errors)
//! - [`wire`] - Wire format helpers
//! - [`traits`] - Radio, Clock, Random platform traits
//! - [`config`] - Compile-time tuning (`NodeConfig`)
//! - [`gossip`] - Neighborhood table with freshness eviction
//! - [`policy`] - Records and the four parent-election variants
//! - [`relay`] - Reliable unicast toward the parent
//! - [`node`] - The `Node` tying it all together
//! - [`debug`] - Protocol tracing events

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod debug;
pub mod gossip;
pub mod node;
pub mod policy;
pub mod relay;
pub mod time;
pub mod traits;
mod tree;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{BriskConfig, DefaultConfig, NodeConfig};
pub use gossip::{GossipEvent, Neighbor, Neighborhood};
pub use node::{Node, Role};
pub use policy::{
    Ballot, EnergyAware, EnergyLayers, EnergyRecord, EnergyWeighted, LayeredRecord, MaxLeaf,
    Policy, Record, TreeRecord,
};
pub use relay::{History, Relay};
pub use time::{Duration, Timestamp};
pub use traits::{Clock, Radio, Random};
pub use types::{
    Datagram, Delivery, EnergyClass, Error, Event, NodeId, CHILDREN_ROOT, DISTANCE_UNDEFINED,
    PARENT_NONE, PARENT_ROOT,
};
