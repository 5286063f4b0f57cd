//! Switch component: event-driven packet forwarding through the hierarchy.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use cloudsdn_core::{cast, log_error, Event, EventHandler, EventId, SimulationContext};
use indexmap::{IndexMap, IndexSet};
use sugars::{rc, refcell};

use crate::config::SimulationConfig;
use crate::control::controller::Controller;
use crate::element::{ElementId, ElementKind};
use crate::events::{ForwardPackets, PacketDown, PacketUp, StateHistoryTick};
use crate::packet::Packet;
use crate::physical::LinkId;
use crate::pipeline::{transmit, Direction};
use crate::stats::{StateHistoryEntry, SwitchStats};

/// Simulation component serving one switch element.
///
/// Buffers outbound packets per next hop and transmits them in batches with
/// bandwidth-aware delays. A pending transmission event is cancelled before a
/// new one is scheduled, so multiple packets arriving in the same tick are
/// sent in a single forwarding pass.
pub struct Switch {
    element: ElementId,
    controller: Rc<RefCell<Controller>>,
    buffer: IndexMap<ElementId, Vec<Packet>>,
    pending_forward: Option<EventId>,
    active_channels: IndexSet<(LinkId, u64, Direction)>,
    stats: SwitchStats,
    config: Rc<SimulationConfig>,
    ctx: SimulationContext,
}

impl Switch {
    /// Creates a switch component. When state history is enabled, the first
    /// sampling tick is scheduled one scheduling interval from now.
    pub fn new(
        element: ElementId,
        controller: Rc<RefCell<Controller>>,
        config: Rc<SimulationConfig>,
        ctx: SimulationContext,
    ) -> Rc<RefCell<Self>> {
        if config.state_history_enabled {
            ctx.emit_self(StateHistoryTick {}, config.scheduling_interval);
        }
        rc!(refcell!(Self {
            element,
            controller,
            buffer: IndexMap::new(),
            pending_forward: None,
            active_channels: IndexSet::new(),
            stats: SwitchStats::new(),
            config,
            ctx,
        }))
    }

    /// Returns the element this component serves.
    pub fn element_id(&self) -> ElementId {
        self.element
    }

    /// Returns the collected state history and statistics.
    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    fn on_packet(&mut self, packet: Packet, moving_down: bool) {
        let now = self.ctx.time();
        let mut controller = self.controller.borrow_mut();
        controller.mark_busy(self.element, now);

        let next_hop = match controller.next_hop(self.element, &packet.flow) {
            Some(next_hop) => next_hop,
            // the default route is a legal fallback only when moving upward,
            // a downward miss is always an error
            None if moving_down => {
                log_error!(
                    self.ctx,
                    "no downward route for flow {}: destination unreachable, packet dropped",
                    packet.flow
                );
                return;
            }
            None => match controller.default_next_hop(self.element) {
                Some(next_hop) => next_hop,
                None => {
                    log_error!(
                        self.ctx,
                        "no route and no default uplink for flow {}: destination unreachable, packet dropped",
                        packet.flow
                    );
                    return;
                }
            },
        };

        // an edge switch translates "packet for a VM" into "packet for a host"
        if controller.element(next_hop).kind == ElementKind::Host {
            match controller.host_of_vm(packet.flow.dst_vm) {
                Some(host) if host == next_hop => {}
                _ => {
                    log_error!(
                        self.ctx,
                        "VM {} is not running on host {}: packet of flow {} dropped",
                        packet.flow.dst_vm,
                        controller.element(next_hop).name,
                        packet.flow
                    );
                    return;
                }
            }
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
        let records = transmit(&self.ctx, &self.controller, &self.config, self.element, queues);
        for record in records {
            self.active_channels.insert((record.link, record.flow_id, record.direction));
        }
    }

    fn sample_state(&mut self) {
        let now = self.ctx.time();
        let mut up_channels = 0;
        let mut upload_bytes = 0;
        let mut down_channels = 0;
        let mut download_bytes = 0;
        let mut controller = self.controller.borrow_mut();
        self.active_channels.retain(|&(link, flow_id, direction)| {
            match controller.link_mut(link).channel_mut(flow_id) {
                Some(channel) => {
                    let bytes = channel.amount_to_be_processed(now);
                    match direction {
                        Direction::Up => {
                            up_channels += 1;
                            upload_bytes += bytes;
                        }
                        Direction::Down => {
                            down_channels += 1;
                            download_bytes += bytes;
                        }
                    }
                    true
                }
                // the channel was torn down, stop tracking it
                None => false,
            }
        });
        drop(controller);
        self.stats.add_sample(StateHistoryEntry {
            time: now,
            up_channels,
            upload_bytes,
            down_channels,
            download_bytes,
        });
        self.ctx.emit_self(StateHistoryTick {}, self.config.scheduling_interval);
    }
}

impl EventHandler for Switch {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PacketUp { packet } => {
                self.on_packet(packet, false);
            }
            PacketDown { packet } => {
                self.on_packet(packet, true);
            }
            ForwardPackets {} => {
                self.forward_buffered();
            }
            StateHistoryTick {} => {
                self.sample_state();
            }
        })
    }
}
