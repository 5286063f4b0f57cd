//! Network elements: hosts and switches of the datacenter fabric.

use cloudsdn_core::Id;

use crate::control::tables::{ForwardingTable, RoutingTable};

/// Index of a network element within the datacenter arena.
pub type ElementId = usize;

/// Hierarchy level of root switches.
pub const ROOT_LEVEL: u32 = 0;
/// Hierarchy level of aggregate switches.
pub const AGGREGATE_LEVEL: u32 = 1;
/// Hierarchy level of edge switches.
pub const EDGE_LEVEL: u32 = 2;
/// Pseudo-level of hosts, below edge switches.
pub const HOST_LEVEL: u32 = 3;

/// Kind of a network element.
///
/// The three switch kinds differ only in behavior (how packets are resolved
/// and forwarded), not in table structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ElementKind {
    /// Physical machine connected to an edge switch.
    Host,
    /// Switch connecting hosts (level 2).
    EdgeSwitch,
    /// Switch connecting edge switches (level 1).
    AggregateSwitch,
    /// Top-level switch (level 0).
    RootSwitch,
}

impl ElementKind {
    /// Returns the hierarchy level of this element kind.
    /// Numerically smaller levels are higher in the hierarchy.
    pub fn level(&self) -> u32 {
        match self {
            ElementKind::RootSwitch => ROOT_LEVEL,
            ElementKind::AggregateSwitch => AGGREGATE_LEVEL,
            ElementKind::EdgeSwitch => EDGE_LEVEL,
            ElementKind::Host => HOST_LEVEL,
        }
    }

    /// Returns whether this kind is one of the switch kinds.
    pub fn is_switch(&self) -> bool {
        !matches!(self, ElementKind::Host)
    }
}

/// Common state shared by all network elements.
///
/// Every element owns exactly one routing table and one forwarding table for
/// its entire lifetime. The tables are created at element construction and
/// mutated only by the controller and by packet processing.
pub struct NetworkElement {
    /// Element name used for logging and diagnostics.
    pub name: String,
    /// Simulation component serving this element.
    pub component: Id,
    /// Element kind.
    pub kind: ElementKind,
    /// Number of ports.
    pub ports: u32,
    /// Bandwidth in Mb/s: NIC capacity for hosts, downlink capacity for switches.
    pub bandwidth: f64,
    /// Routing table: destination element -> physical links.
    pub routing: RoutingTable,
    /// Forwarding table: flow key -> next hop element.
    pub forwarding: ForwardingTable,
    /// The last time the element was processing packets.
    pub last_busy_time: f64,
}

impl NetworkElement {
    /// Creates an element with empty tables.
    pub fn new(name: &str, component: Id, kind: ElementKind, ports: u32, bandwidth: f64) -> Self {
        Self {
            name: name.to_owned(),
            component,
            kind,
            ports,
            bandwidth,
            routing: RoutingTable::new(),
            forwarding: ForwardingTable::new(),
            last_busy_time: 0.,
        }
    }

    /// Returns the hierarchy level of this element.
    pub fn level(&self) -> u32 {
        self.kind.level()
    }

    /// Returns the time interval the element has been idle,
    /// or 0 if it is processing packets right now.
    pub fn idle_interval(&self, time: f64) -> f64 {
        (time - self.last_busy_time).max(0.)
    }

    /// Returns whether the element was idle at the given time.
    pub fn is_idle(&self, time: f64) -> bool {
        self.idle_interval(time) > 0.
    }
}
