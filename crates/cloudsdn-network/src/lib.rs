//! SDN control plane of a simulated cloud datacenter.
//!
//! The crate models a multi-level switch hierarchy (root, aggregate and edge
//! switches above hosts), builds per-element routing tables from a physical
//! topology, deploys per-user virtual links into forwarding tables with
//! bandwidth-constrained channel admission, and simulates time-accurate
//! packet delivery on top of the [`cloudsdn_core`] discrete-event engine.

#![warn(missing_docs)]

pub mod config;
pub mod control;
pub mod element;
pub mod events;
pub mod host;
pub mod packet;
pub mod physical;
mod pipeline;
pub mod simulation;
pub mod stats;
pub mod switch;
pub mod topology;
pub mod virtual_topology;

pub use config::SimulationConfig;
pub use control::controller::Controller;
pub use control::tables::{FlowKey, ForwardingTable, RoutingTable};
pub use element::{ElementId, ElementKind, NetworkElement};
pub use physical::{Bandwidth, Channel, LinkId, PhysicalLink};
pub use simulation::SdnSimulation;
pub use topology::{NodeId, PhysicalTopology, TopologyError, TopologyLink};
pub use virtual_topology::{VirtualLink, VirtualTopology};
