//! Host component: flow origination and final packet delivery.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use cloudsdn_core::{cast, log_debug, log_error, Event, EventHandler, EventId, SimulationContext};
use indexmap::IndexMap;
use sugars::{rc, refcell};

use crate::config::SimulationConfig;
use crate::control::controller::Controller;
use crate::control::tables::FlowKey;
use crate::element::ElementId;
use crate::events::{ForwardPackets, PacketToHost, SendData};
use crate::packet::{DeliveredPacket, Packet};
use crate::pipeline::transmit;

/// Simulation component serving one host element.
///
/// Originates the traffic of flows whose source VM runs on this host and
/// keeps the records of packets delivered to its VMs.
pub struct NetworkHost {
    element: ElementId,
    controller: Rc<RefCell<Controller>>,
    buffer: IndexMap<ElementId, Vec<Packet>>,
    pending_forward: Option<EventId>,
    delivered: Vec<DeliveredPacket>,
    config: Rc<SimulationConfig>,
    ctx: SimulationContext,
}

impl NetworkHost {
    /// Creates a host component.
    pub fn new(
        element: ElementId,
        controller: Rc<RefCell<Controller>>,
        config: Rc<SimulationConfig>,
        ctx: SimulationContext,
    ) -> Rc<RefCell<Self>> {
        rc!(refcell!(Self {
            element,
            controller,
            buffer: IndexMap::new(),
            pending_forward: None,
            delivered: Vec::new(),
            config,
            ctx,
        }))
    }

    /// Returns the element this component serves.
    pub fn element_id(&self) -> ElementId {
        self.element
    }

    /// Returns the records of packets delivered to VMs of this host,
    /// in delivery order.
    pub fn delivered(&self) -> &[DeliveredPacket] {
        &self.delivered
    }

    fn send_data(&mut self, src_vm: u32, dst_vm: u32, flow_id: u64, size: u64) {
        let now = self.ctx.time();
        let key = FlowKey::new(src_vm, dst_vm, flow_id);
        let packet = Packet::new(key, size, now);

        let mut controller = self.controller.borrow_mut();
        controller.mark_busy(self.element, now);
        if controller.host_of_vm(src_vm) != Some(self.element) {
            log_error!(self.ctx, "VM {} is not running on this host, packet not sent", src_vm);
            return;
        }
        let next_hop = match controller.next_hop(self.element, &key) {
            Some(next_hop) => next_hop,
            None => {
                log_error!(
                    self.ctx,
                    "no forwarding rule for flow {}: destination unreachable, packet dropped",
                    key
                );
                return;
            }
        };

        if next_hop == self.element {
            // intra-host virtual link, deliver through the loopback channel
            let rate = controller
                .element(self.element)
                .routing
                .resolve(Some(self.element))
                .and_then(|link| controller.link(link).channel(flow_id))
                .map(|channel| channel.rate_bps());
            match rate {
                Some(rate) => {
                    let delay = packet.size_bits() / rate;
                    drop(controller);
                    self.ctx.emit_self(PacketToHost { packet }, delay);
                }
                None => {
                    log_error!(self.ctx, "no loopback channel admitted for flow {}, packet dropped", key);
                }
            }
            return;
        }
        drop(controller);
        self.enqueue(next_hop, packet);
    }

    fn enqueue(&mut self, next_hop: ElementId, packet: Packet) {
        self.buffer.entry(next_hop).or_default().push(packet);
        if let Some(event_id) = self.pending_forward.take() {
            self.ctx.cancel_event(event_id);
        }
        self.pending_forward = Some(self.ctx.emit_self(ForwardPackets {}, self.config.switching_delay));
    }

    fn forward_buffered(&mut self) {
        self.pending_forward = None;
        let queues = mem::take(&mut self.buffer);
        transmit(&self.ctx, &self.controller, &self.config, self.element, queues);
    }

    fn deliver(&mut self, packet: Packet) {
        let now = self.ctx.time();
        let mut controller = self.controller.borrow_mut();
        controller.mark_busy(self.element, now);
        match controller.host_of_vm(packet.flow.dst_vm) {
            Some(host) if host == self.element => {
                drop(controller);
                log_debug!(
                    self.ctx,
                    "delivered packet of flow {} to VM {} after {:.3}s",
                    packet.flow,
                    packet.flow.dst_vm,
                    now - packet.send_time
                );
                self.delivered.push(DeliveredPacket {
                    packet,
                    delivery_time: now,
                });
            }
            _ => {
                log_error!(
                    self.ctx,
                    "VM {} is not running on this host: packet of flow {} dropped",
                    packet.flow.dst_vm,
                    packet.flow
                );
            }
        }
    }
}

impl EventHandler for NetworkHost {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            SendData {
                src_vm,
                dst_vm,
                flow_id,
                size,
            } => {
                self.send_data(src_vm, dst_vm, flow_id, size);
            }
            PacketToHost { packet } => {
                self.deliver(packet);
            }
            ForwardPackets {} => {
                self.forward_buffered();
            }
        })
    }
}
