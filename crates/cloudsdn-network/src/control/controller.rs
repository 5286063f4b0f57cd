//! SDN controller: builds routing tables bottom-up from the physical
//! topology and deploys per-user virtual topologies into forwarding tables.

use cloudsdn_core::{log_error, log_warn, Id, SimulationContext};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::control::tables::FlowKey;
use crate::element::{ElementId, ElementKind, NetworkElement};
use crate::physical::{Channel, LinkId, PhysicalLink};
use crate::topology::{NodeId, PhysicalTopology, TopologyError, TopologyLink};
use crate::virtual_topology::{VirtualLink, VirtualTopology};

/// The SDN controller of one datacenter.
///
/// Owns the network element arena, the physical link arena, the physical
/// topology with element bindings, the per-user virtual topologies and the
/// VM placement registry. Installed once per datacenter, after the physical
/// topology is fixed.
pub struct Controller {
    elements: Vec<NetworkElement>,
    links: Vec<PhysicalLink>,
    topology: PhysicalTopology,
    node_of_element: FxHashMap<ElementId, NodeId>,
    element_of_node: FxHashMap<NodeId, ElementId>,
    edge_of_host: FxHashMap<ElementId, ElementId>,
    hosts_of_edge: FxHashMap<ElementId, Vec<ElementId>>,
    virtual_topologies: IndexMap<u32, VirtualTopology>,
    vm_to_host: FxHashMap<u32, ElementId>,
    next_flow_id: u64,
    ctx: SimulationContext,
}

impl Controller {
    /// Creates a controller with an empty datacenter.
    pub fn new(ctx: SimulationContext) -> Self {
        Self {
            elements: Vec::new(),
            links: Vec::new(),
            topology: PhysicalTopology::new(),
            node_of_element: FxHashMap::default(),
            element_of_node: FxHashMap::default(),
            edge_of_host: FxHashMap::default(),
            hosts_of_edge: FxHashMap::default(),
            virtual_topologies: IndexMap::new(),
            vm_to_host: FxHashMap::default(),
            next_flow_id: 0,
            ctx,
        }
    }

    // Datacenter construction ------------------------------------------------

    /// Adds a network element served by the given simulation component.
    pub fn add_element(&mut self, name: &str, component: Id, kind: ElementKind, ports: u32, bandwidth: f64) -> ElementId {
        let id = self.elements.len();
        self.elements.push(NetworkElement::new(name, component, kind, ports, bandwidth));
        id
    }

    /// Attaches a host to its edge switch.
    ///
    /// The latency between a host and its edge switch is ignored, so hosts
    /// need not be present in the physical topology graph.
    pub fn attach_host(&mut self, host: ElementId, edge: ElementId) {
        assert_eq!(self.elements[host].kind, ElementKind::Host);
        assert_eq!(self.elements[edge].kind, ElementKind::EdgeSwitch);
        self.edge_of_host.insert(host, edge);
        self.hosts_of_edge.entry(edge).or_default().push(host);
    }

    /// Connects two switches by creating topology nodes named after the
    /// elements and a link between them.
    pub fn connect_switches(&mut self, switch1: ElementId, switch2: ElementId, bandwidth: f64, latency: f64) {
        let node1 = self.topology_node(switch1);
        let node2 = self.topology_node(switch2);
        self.topology
            .add_link(node1, node2, TopologyLink::new(bandwidth, latency))
            .unwrap();
    }

    /// Replaces the physical topology with an externally built one
    /// (e.g. parsed from a BRITE file) and binds switches to its nodes.
    ///
    /// Binding a switch to a node id absent from the topology is a fatal
    /// input error reported before the simulation starts.
    pub fn load_topology(
        &mut self,
        topology: PhysicalTopology,
        bindings: &[(ElementId, &str)],
    ) -> Result<(), TopologyError> {
        self.topology = topology;
        self.node_of_element.clear();
        self.element_of_node.clear();
        for (element, node_name) in bindings {
            let node = self
                .topology
                .node_id(node_name)
                .ok_or_else(|| TopologyError::UnknownNode(node_name.to_string()))?;
            self.node_of_element.insert(*element, node);
            self.element_of_node.insert(node, *element);
        }
        Ok(())
    }

    fn topology_node(&mut self, element: ElementId) -> NodeId {
        if let Some(&node) = self.node_of_element.get(&element) {
            return node;
        }
        let name = self.elements[element].name.clone();
        let node = self.topology.add_node(&name);
        self.node_of_element.insert(element, node);
        self.element_of_node.insert(node, element);
        node
    }

    // Routing-table construction ---------------------------------------------

    /// Builds the routing tables of all network elements bottom-up:
    /// hosts, then switch neighbor/default routes, then edge, aggregate and
    /// root levels. Construction is strictly bottom-up: a switch's rule set
    /// is read by the level above it.
    pub fn build_routing_tables(&mut self) -> Result<(), TopologyError> {
        self.build_host_routes()?;
        self.build_default_switch_routes()?;
        self.build_edge_routes();
        self.build_aggregate_routes();
        self.build_root_routes();
        Ok(())
    }

    /// For every host: a default-route rule to its edge switch with
    /// bandwidth = min(host NIC, switch downlink), and a loopback rule used
    /// for intra-host virtual links.
    pub fn build_host_routes(&mut self) -> Result<(), TopologyError> {
        for host in self.ids_of_kind(ElementKind::Host) {
            let edge = *self
                .edge_of_host
                .get(&host)
                .ok_or_else(|| TopologyError::UnknownNode(self.elements[host].name.clone()))?;
            let bandwidth = self.elements[host].bandwidth.min(self.elements[edge].bandwidth);
            let uplink = self.add_link(PhysicalLink::new(host, edge, bandwidth));
            self.elements[host].routing.add_rule(None, uplink);
            let loopback = self.add_link(PhysicalLink::new(host, host, self.elements[host].bandwidth));
            self.elements[host].routing.add_rule(Some(host), loopback);
        }
        Ok(())
    }

    /// For every switch: one rule per directly connected topology neighbor,
    /// in topology edge order, then a default rule keyed by the unknown
    /// destination pointing at the first discovered upward neighbor.
    pub fn build_default_switch_routes(&mut self) -> Result<(), TopologyError> {
        for switch in self.switch_ids() {
            let node = *self
                .node_of_element
                .get(&switch)
                .ok_or_else(|| TopologyError::UnknownNode(self.elements[switch].name.clone()))?;
            let neighbors: Vec<(ElementId, TopologyLink)> = self
                .topology
                .neighbors(node)
                .filter_map(|(n, link)| self.element_of_node.get(&n).map(|&e| (e, *link)))
                .collect();
            for (neighbor, link) in neighbors {
                let link_id = self.add_link(PhysicalLink::with_latency(switch, neighbor, link.bandwidth, link.latency));
                self.elements[switch].routing.add_rule(Some(neighbor), link_id);
            }

            // default route: the first already known destination one level up
            let level = self.elements[switch].level();
            let up_link = self.elements[switch]
                .routing
                .known_destinations()
                .into_iter()
                .find(|&dst| self.elements[dst].kind.is_switch() && self.elements[dst].level() < level)
                .and_then(|dst| self.elements[switch].routing.resolve(Some(dst)));
            if let Some(link_id) = up_link {
                self.elements[switch].routing.add_rule(None, link_id);
            }
        }
        Ok(())
    }

    /// For every edge switch: one explicit rule per directly connected host
    /// with bandwidth = min(host NIC, switch downlink).
    pub fn build_edge_routes(&mut self) {
        for edge in self.ids_of_kind(ElementKind::EdgeSwitch) {
            let hosts = self.hosts_of_edge.get(&edge).cloned().unwrap_or_default();
            for host in hosts {
                let bandwidth = self.elements[host].bandwidth.min(self.elements[edge].bandwidth);
                let link_id = self.add_link(PhysicalLink::new(edge, host, bandwidth));
                self.elements[edge].routing.add_rule(Some(host), link_id);
            }
        }
    }

    /// For every aggregate switch: for each edge switch already known to it
    /// as a destination, one rule per host known to that edge switch, through
    /// the aggregate-edge link.
    pub fn build_aggregate_routes(&mut self) {
        self.build_downlevel_routes(ElementKind::AggregateSwitch, ElementKind::EdgeSwitch);
    }

    /// Symmetric to the aggregate level, one level higher: iterates through
    /// the host destinations already known to aggregate switches.
    pub fn build_root_routes(&mut self) {
        self.build_downlevel_routes(ElementKind::RootSwitch, ElementKind::AggregateSwitch);
    }

    fn build_downlevel_routes(&mut self, kind: ElementKind, below: ElementKind) {
        for switch in self.ids_of_kind(kind) {
            for dst in self.elements[switch].routing.known_destinations() {
                if self.elements[dst].kind != below {
                    continue;
                }
                let hosts: Vec<ElementId> = self.elements[dst]
                    .routing
                    .known_destinations()
                    .into_iter()
                    .filter(|&e| self.elements[e].kind == ElementKind::Host)
                    .collect();
                // the rules reuse the already created link to the down-level switch
                if let Some(link_id) = self.elements[switch].routing.resolve(Some(dst)) {
                    for host in hosts {
                        self.elements[switch].routing.add_rule(Some(host), link_id);
                    }
                }
            }
        }
    }

    // Virtual-link management ------------------------------------------------

    /// Creates a virtual link in the user's virtual topology and returns the
    /// assigned globally unique flow id.
    pub fn add_virtual_link(&mut self, user: u32, src_vm: u32, dst_vm: u32, bandwidth: f64) -> u64 {
        self.next_flow_id += 1;
        let flow_id = self.next_flow_id;
        self.virtual_topologies
            .entry(user)
            .or_default()
            .add_link(VirtualLink::new(flow_id, src_vm, dst_vm, bandwidth));
        flow_id
    }

    /// Deploys the user's virtual topology into forwarding tables along the
    /// correct paths. Links whose endpoint VMs are not placed yet are skipped.
    pub fn deploy_user_application(&mut self, user: u32) {
        let links: Vec<VirtualLink> = self
            .virtual_topologies
            .get(&user)
            .map(|vt| vt.links().cloned().collect())
            .unwrap_or_default();
        for link in links {
            self.deploy_virtual_link(&link);
        }
    }

    fn deploy_virtual_link(&mut self, link: &VirtualLink) {
        let (src_host, dst_host) = match (
            self.vm_to_host.get(&link.src_vm()).copied(),
            self.vm_to_host.get(&link.dst_vm()).copied(),
        ) {
            (Some(src), Some(dst)) => (src, dst),
            _ => {
                log_warn!(
                    self.ctx,
                    "flow {} is not deployed: one of VMs {} and {} is not placed yet",
                    link.id(),
                    link.src_vm(),
                    link.dst_vm()
                );
                return;
            }
        };

        // first case: both VMs on the same host, loopback only
        if src_host == dst_host {
            self.add_forwarding_rule(link, src_host, src_host, false);
            return;
        }

        // the source host forwards to its edge switch via the default route
        let src_edge = self.edge_of_host[&src_host];
        let dst_edge = self.edge_of_host[&dst_host];
        self.add_forwarding_rule(link, src_host, src_edge, true);

        // second case: different hosts under the same edge switch
        if src_edge == dst_edge {
            self.add_forwarding_rule(link, src_edge, dst_host, false);
            return;
        }

        // third case: different edge switches, follow the shortest path
        // between them in the physical topology
        let src_node = self.node_of_element[&src_edge];
        let dst_node = self.node_of_element[&dst_edge];
        let path = match self.topology.shortest_path(src_node, dst_node) {
            Some(path) => path,
            None => {
                log_error!(
                    self.ctx,
                    "no path between {} and {} was found when deploying flow {}",
                    self.elements[src_edge].name,
                    self.elements[dst_edge].name,
                    link.id()
                );
                return;
            }
        };
        for hop in path.windows(2) {
            let (element, next_hop) = match (self.element_of_node.get(&hop[0]), self.element_of_node.get(&hop[1])) {
                (Some(&element), Some(&next_hop)) => (element, next_hop),
                _ => {
                    log_error!(
                        self.ctx,
                        "path of flow {} passes through a topology node with no network element behind it",
                        link.id()
                    );
                    return;
                }
            };
            self.add_forwarding_rule(link, element, next_hop, false);
        }
        // the final path node forwards to the true destination host
        let last = self.element_of_node[path.last().unwrap()];
        if self.add_forwarding_rule(link, last, dst_host, false) {
            self.add_delivery_rule(link, dst_host);
        }
    }

    /// Tries to install a forwarding rule `flow key -> next hop` at `src`.
    ///
    /// A channel for the virtual link is admitted onto the physical link
    /// actually used at this hop first; if admission fails the rule is not
    /// installed and the link remains undeployed at this hop. Partial
    /// deployments are not rolled back: forwarding falls through to
    /// "unreachable" and is logged rather than mis-routed.
    ///
    /// Returns whether the rule was installed.
    fn add_forwarding_rule(
        &mut self,
        link: &VirtualLink,
        src: ElementId,
        next_hop: ElementId,
        use_default_route: bool,
    ) -> bool {
        let physical = if use_default_route {
            self.elements[src].routing.resolve(None)
        } else {
            self.elements[src].routing.resolve(Some(next_hop))
        };
        let physical = match physical {
            Some(physical) => physical,
            None => {
                log_error!(
                    self.ctx,
                    "no physical link between {} and {} was found when trying to add forwarding rule for flow {}",
                    self.elements[src].name,
                    self.elements[next_hop].name,
                    link.id()
                );
                return false;
            }
        };
        let channel = Channel::new(link.id(), link.required_bandwidth());
        if self.links[physical].add_channel(channel) {
            let key = FlowKey::new(link.src_vm(), link.dst_vm(), link.id());
            self.elements[src].forwarding.add_rule(key, next_hop);
            true
        } else {
            log_error!(
                self.ctx,
                "no bandwidth available to deploy flow {} in the link between {} and {}",
                link.id(),
                self.elements[src].name,
                self.elements[next_hop].name
            );
            false
        }
    }

    // The rule marking the flow as locally deliverable at the destination
    // host. No channel is admitted: delivery consumes no physical link.
    fn add_delivery_rule(&mut self, link: &VirtualLink, dst_host: ElementId) {
        let key = FlowKey::new(link.src_vm(), link.dst_vm(), link.id());
        self.elements[dst_host].forwarding.add_rule(key, dst_host);
    }

    // VM placement -----------------------------------------------------------

    /// Registers the current host of a VM.
    pub fn place_vm(&mut self, vm_id: u32, host: ElementId) {
        assert_eq!(self.elements[host].kind, ElementKind::Host);
        self.vm_to_host.insert(vm_id, host);
    }

    /// Returns the current host of a VM, if placed.
    pub fn host_of_vm(&self, vm_id: u32) -> Option<ElementId> {
        self.vm_to_host.get(&vm_id).copied()
    }

    /// Removes a VM: unregisters its placement, removes all virtual links
    /// referencing it and sweeps all channels and forwarding rules of those
    /// links from the whole datacenter.
    pub fn remove_vm(&mut self, vm_id: u32) {
        self.vm_to_host.remove(&vm_id);
        let mut removed_flows = Vec::new();
        for vt in self.virtual_topologies.values_mut() {
            removed_flows.extend(vt.remove_links_of_vm(vm_id));
        }
        for flow_id in removed_flows {
            for link in self.links.iter_mut() {
                link.remove_channel(flow_id);
            }
            for element in self.elements.iter_mut() {
                element.forwarding.remove_flow(flow_id);
            }
        }
    }

    // Packet pipeline support ------------------------------------------------

    /// Returns the next hop installed for the given flow at the given element.
    pub fn next_hop(&self, element: ElementId, key: &FlowKey) -> Option<ElementId> {
        self.elements[element].forwarding.resolve(key)
    }

    /// Returns the next hop reachable through the element's default route
    /// (upward in the hierarchy), if one is installed.
    pub fn default_next_hop(&self, element: ElementId) -> Option<ElementId> {
        self.elements[element]
            .routing
            .resolve(None)
            .map(|link| self.links[link].dst())
    }

    /// Returns the physical link used by the element to reach the given next
    /// hop: the explicit route if known, the default route otherwise.
    pub fn link_to_next_hop(&self, element: ElementId, next_hop: ElementId) -> Option<LinkId> {
        self.elements[element]
            .routing
            .resolve(Some(next_hop))
            .or_else(|| self.elements[element].routing.resolve(None))
    }

    /// Marks the element busy at the given time.
    pub fn mark_busy(&mut self, element: ElementId, time: f64) {
        self.elements[element].last_busy_time = time;
    }

    // Accessors --------------------------------------------------------------

    /// Returns the element with the given id.
    pub fn element(&self, id: ElementId) -> &NetworkElement {
        &self.elements[id]
    }

    /// Returns the mutable element with the given id.
    pub fn element_mut(&mut self, id: ElementId) -> &mut NetworkElement {
        &mut self.elements[id]
    }

    /// Returns the number of elements.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Returns the physical link with the given id.
    pub fn link(&self, id: LinkId) -> &PhysicalLink {
        &self.links[id]
    }

    /// Returns the mutable physical link with the given id.
    pub fn link_mut(&mut self, id: LinkId) -> &mut PhysicalLink {
        &mut self.links[id]
    }

    /// Iterates over all physical links with their ids.
    pub fn links(&self) -> impl Iterator<Item = (LinkId, &PhysicalLink)> {
        self.links.iter().enumerate()
    }

    /// Returns the edge switch the host is attached to.
    pub fn edge_switch_of(&self, host: ElementId) -> Option<ElementId> {
        self.edge_of_host.get(&host).copied()
    }

    /// Returns the physical topology.
    pub fn topology(&self) -> &PhysicalTopology {
        &self.topology
    }

    /// Returns the topology node the element is bound to.
    pub fn topology_node_of(&self, element: ElementId) -> Option<NodeId> {
        self.node_of_element.get(&element).copied()
    }

    /// Returns the element bound to the given topology node.
    pub fn element_at_node(&self, node: NodeId) -> Option<ElementId> {
        self.element_of_node.get(&node).copied()
    }

    /// Returns the virtual topology of the given user, if created.
    pub fn virtual_topology(&self, user: u32) -> Option<&VirtualTopology> {
        self.virtual_topologies.get(&user)
    }

    fn add_link(&mut self, link: PhysicalLink) -> LinkId {
        let id = self.links.len();
        self.links.push(link);
        id
    }

    fn ids_of_kind(&self, kind: ElementKind) -> Vec<ElementId> {
        (0..self.elements.len()).filter(|&e| self.elements[e].kind == kind).collect()
    }

    fn switch_ids(&self) -> Vec<ElementId> {
        (0..self.elements.len())
            .filter(|&e| self.elements[e].kind.is_switch())
            .collect()
    }
}
