//! leafsim - Discrete event network simulator for leaftree protocol testing.
//!
//! This crate provides a deterministic, discrete-event simulator for
//! exercising the leaftree protocol at network scale without real-time
//! delays.
//!
//! # Features
//!
//! - **Discrete event simulation**: no real-time delays, deterministic
//!   `(time, sequence)` event ordering
//! - **Many nodes in one process**: every node is an ordinary `leaftree::Node`
//!   with simulated radio, clock, and RNG (seeded from the node id)
//! - **Configurable topology**: chain, star, fully connected, or custom
//!   links with per-link loss and delay
//! - **Sleep is observable**: datagrams to a closed port are dropped, so a
//!   leaf with its radio off really is unreachable
//! - **Scenario actions**: isolate nodes, flip links, inject loss mid-run
//! - **Metrics**: periodic snapshots of parents, distances, roles, and
//!   radio state; sink delivery log
//!
//! # Example
//!
//! ```
//! use leafsim::ScenarioBuilder;
//! use leaftree::{Duration, MaxLeaf};
//!
//! // 1 sink + 4 sensors in a chain, run for 15 simulated seconds.
//! let (mut sim, nodes) = ScenarioBuilder::new(5)
//!     .with_seed(42)
//!     .chain_topology()
//!     .build::<MaxLeaf>();
//! let result = sim.run_for(Duration::from_secs(15));
//! assert!(result.converged());
//! # let _ = nodes;
//! ```

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use leaftree::{Duration, NodeId, Timestamp};
pub use metrics::{NetSnapshot, SimMetrics, SimulationResult};
pub use node::{SimFrame, SimNode};
pub use scenario::ScenarioBuilder;
pub use sim::Simulator;
pub use topology::{Link, Topology};
