//! Shared packet transmission logic of hosts and switches.

use std::cell::RefCell;
use std::rc::Rc;

use cloudsdn_core::{log_error, SimulationContext};
use indexmap::IndexMap;

use crate::config::SimulationConfig;
use crate::control::controller::Controller;
use crate::element::{ElementId, ElementKind};
use crate::events::{PacketDown, PacketToHost, PacketUp};
use crate::packet::Packet;
use crate::physical::LinkId;

/// Direction of a transmission relative to the switch hierarchy: a neighbor
/// at a numerically smaller level is up, at a larger level is down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Direction {
    Up,
    Down,
}

/// What was sent where, for state-history accounting.
pub(crate) struct TransmitRecord {
    pub link: LinkId,
    pub flow_id: u64,
    pub direction: Direction,
}

/// Transmits the buffered outbound packets of one element.
///
/// For every next hop and flow, resolves the channel admitted onto the
/// physical link used at this hop and computes the transfer delay from the
/// admitted per-flow rate. When the per-packet delay is below the scheduling
/// interval all packets arrive after that single delay; otherwise every
/// packet forms its own batch scheduled at a successive step, which produces
/// the step-wise traffic pattern observable in the state history.
pub(crate) fn transmit(
    ctx: &SimulationContext,
    controller: &Rc<RefCell<Controller>>,
    config: &SimulationConfig,
    element: ElementId,
    queues: IndexMap<ElementId, Vec<Packet>>,
) -> Vec<TransmitRecord> {
    let mut records = Vec::new();
    for (next_hop, packets) in queues {
        let mut flows: IndexMap<u64, Vec<Packet>> = IndexMap::new();
        for packet in packets {
            flows.entry(packet.flow.flow_id).or_default().push(packet);
        }
        for (flow_id, packets) in flows {
            let controller = controller.borrow();
            let link_id = match controller.link_to_next_hop(element, next_hop) {
                Some(link_id) => link_id,
                None => {
                    log_error!(
                        ctx,
                        "no physical link toward {}: destination unreachable, {} packets of flow {} dropped",
                        controller.element(next_hop).name,
                        packets.len(),
                        flow_id
                    );
                    continue;
                }
            };
            let link = controller.link(link_id);
            let rate = match link.channel(flow_id) {
                Some(channel) => channel.rate_bps(),
                None => {
                    log_error!(
                        ctx,
                        "no channel admitted for flow {} on the link toward {}, {} packets dropped",
                        flow_id,
                        controller.element(next_hop).name,
                        packets.len()
                    );
                    continue;
                }
            };
            let latency = link.latency();
            let dst_component = controller.element(next_hop).component;
            let my_level = controller.element(element).level();
            let next_level = controller.element(next_hop).level();
            let next_is_host = controller.element(next_hop).kind == ElementKind::Host;
            drop(controller);

            let direction = if next_level < my_level { Direction::Up } else { Direction::Down };
            for (seq, packet) in packets.into_iter().enumerate() {
                let transfer = packet.size_bits() / rate;
                let delay = if transfer < config.scheduling_interval {
                    transfer
                } else {
                    (seq as f64 + 1.) * transfer
                };
                if next_is_host {
                    ctx.emit(PacketToHost { packet }, dst_component, latency + delay);
                } else if direction == Direction::Up {
                    ctx.emit(PacketUp { packet }, dst_component, latency + delay);
                } else {
                    ctx.emit(PacketDown { packet }, dst_component, latency + delay);
                }
            }
            records.push(TransmitRecord {
                link: link_id,
                flow_id,
                direction,
            });
        }
    }
    records
}
