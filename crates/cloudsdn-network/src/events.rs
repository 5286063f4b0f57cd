//! Simulation events of the packet pipeline.

use serde::Serialize;

use crate::packet::Packet;

/// A packet moving upward in the switch hierarchy
/// (from a host or from a lower-level switch).
#[derive(Clone, Serialize)]
pub struct PacketUp {
    /// The packet being forwarded.
    pub packet: Packet,
}

/// A packet moving downward in the switch hierarchy
/// (toward the destination host).
#[derive(Clone, Serialize)]
pub struct PacketDown {
    /// The packet being forwarded.
    pub packet: Packet,
}

/// A packet arriving at its destination host.
#[derive(Clone, Serialize)]
pub struct PacketToHost {
    /// The packet being delivered.
    pub packet: Packet,
}

/// Self-scheduled event triggering transmission of the buffered packets.
///
/// An element cancels its pending event of this type before scheduling a new
/// one, so multiple packets arriving in the same tick are sent in one pass.
#[derive(Clone, Serialize)]
pub struct ForwardPackets {}

/// Request to submit data of the given flow at the source host.
#[derive(Clone, Serialize)]
pub struct SendData {
    /// Source VM id.
    pub src_vm: u32,
    /// Destination VM id.
    pub dst_vm: u32,
    /// Flow id assigned at virtual-link creation.
    pub flow_id: u64,
    /// Data size in bytes.
    pub size: u64,
}

/// Self-scheduled state-history sampling tick, emitted once per scheduling
/// interval when state history is enabled.
#[derive(Clone, Serialize)]
pub struct StateHistoryTick {}
