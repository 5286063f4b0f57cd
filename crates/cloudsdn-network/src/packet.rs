//! Packets traveling through the switch hierarchy.

use serde::Serialize;

use crate::control::tables::FlowKey;

/// A unit of traffic belonging to one flow.
#[derive(Clone, Debug, Serialize)]
pub struct Packet {
    /// Flow the packet belongs to.
    pub flow: FlowKey,
    /// Packet size in bytes.
    pub size: u64,
    /// Time the packet was submitted by the sending VM.
    pub send_time: f64,
}

impl Packet {
    /// Creates a packet.
    pub fn new(flow: FlowKey, size: u64, send_time: f64) -> Self {
        Self { flow, size, send_time }
    }

    /// Returns the packet size in bits.
    pub fn size_bits(&self) -> f64 {
        self.size as f64 * 8.
    }
}

/// A record of a completed packet delivery, kept by the receiving host.
#[derive(Clone, Debug, Serialize)]
pub struct DeliveredPacket {
    /// The delivered packet.
    pub packet: Packet,
    /// Time the packet reached the destination VM's host.
    pub delivery_time: f64,
}
