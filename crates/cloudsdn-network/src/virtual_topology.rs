//! Per-user virtual topologies: virtual links between virtual machines,
//! independent of physical placement.

use indexmap::{IndexMap, IndexSet};

/// A user-declared requirement: a link between two VMs with a required
/// bandwidth in Mb/s. Immutable after creation except bandwidth adjustment.
#[derive(Clone, Debug, serde::Serialize)]
pub struct VirtualLink {
    id: u64,
    src_vm: u32,
    dst_vm: u32,
    required_bandwidth: f64,
}

impl VirtualLink {
    /// Creates a virtual link. Ids are assigned by the controller.
    pub fn new(id: u64, src_vm: u32, dst_vm: u32, required_bandwidth: f64) -> Self {
        Self {
            id,
            src_vm,
            dst_vm,
            required_bandwidth,
        }
    }

    /// Returns the unique flow id of this link.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the source VM id.
    pub fn src_vm(&self) -> u32 {
        self.src_vm
    }

    /// Returns the destination VM id.
    pub fn dst_vm(&self) -> u32 {
        self.dst_vm
    }

    /// Returns the required bandwidth in Mb/s.
    pub fn required_bandwidth(&self) -> f64 {
        self.required_bandwidth
    }

    /// Adjusts the required bandwidth in Mb/s.
    pub fn set_required_bandwidth(&mut self, bandwidth: f64) {
        self.required_bandwidth = bandwidth;
    }
}

/// A collection of virtual links owned by exactly one user (broker).
///
/// Created when the user's application is deployed, lives for the
/// simulation's duration and is never mutated by any other user's topology.
#[derive(Default)]
pub struct VirtualTopology {
    links: IndexMap<u64, VirtualLink>,
    vms: IndexSet<u32>,
}

impl VirtualTopology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a virtual link and registers its endpoint VMs.
    pub fn add_link(&mut self, link: VirtualLink) {
        self.vms.insert(link.src_vm());
        self.vms.insert(link.dst_vm());
        self.links.insert(link.id(), link);
    }

    /// Removes a virtual link by its flow id.
    pub fn remove_link(&mut self, flow_id: u64) -> Option<VirtualLink> {
        self.links.shift_remove(&flow_id)
    }

    /// Removes all virtual links referencing the given VM as source or
    /// destination and returns their flow ids.
    pub fn remove_links_of_vm(&mut self, vm_id: u32) -> Vec<u64> {
        let removed: Vec<u64> = self
            .links
            .values()
            .filter(|link| link.src_vm() == vm_id || link.dst_vm() == vm_id)
            .map(|link| link.id())
            .collect();
        for flow_id in &removed {
            self.links.shift_remove(flow_id);
        }
        self.vms.shift_remove(&vm_id);
        removed
    }

    /// Returns the virtual link with the given flow id, if any.
    pub fn link(&self, flow_id: u64) -> Option<&VirtualLink> {
        self.links.get(&flow_id)
    }

    /// Iterates over all virtual links in insertion order.
    pub fn links(&self) -> impl Iterator<Item = &VirtualLink> {
        self.links.values()
    }

    /// Returns the ids of all VMs referenced by the topology.
    pub fn vms(&self) -> impl Iterator<Item = u32> + '_ {
        self.vms.iter().copied()
    }

    /// Returns the number of virtual links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}
