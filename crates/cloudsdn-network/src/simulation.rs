//! Facade assembling a simulated SDN-enabled datacenter.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use cloudsdn_core::{Simulation, SimulationContext};

use crate::config::SimulationConfig;
use crate::control::controller::Controller;
use crate::element::{ElementId, ElementKind};
use crate::events::SendData;
use crate::host::NetworkHost;
use crate::switch::Switch;
use crate::topology::{PhysicalTopology, TopologyError};

/// Builds the datacenter network out of hosts and switches, installs the
/// controller and provides convenient access to the simulation.
pub struct SdnSimulation {
    controller: Rc<RefCell<Controller>>,
    hosts: BTreeMap<ElementId, Rc<RefCell<NetworkHost>>>,
    switches: BTreeMap<ElementId, Rc<RefCell<Switch>>>,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl SdnSimulation {
    /// Creates a simulation facade with the given configuration.
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Self {
        let controller = rc!(refcell!(Controller::new(sim.create_context("controller"))));
        let ctx = sim.create_context("simulation");
        Self {
            controller,
            hosts: BTreeMap::new(),
            switches: BTreeMap::new(),
            sim,
            ctx,
            sim_config: rc!(sim_config),
        }
    }

    /// Creates a host element with the given NIC bandwidth in Mb/s
    /// along with the component serving it.
    pub fn add_host(&mut self, name: &str, bandwidth: f64, ports: u32) -> ElementId {
        let ctx = self.sim.create_context(name);
        let component = ctx.id();
        let element = self
            .controller
            .borrow_mut()
            .add_element(name, component, ElementKind::Host, ports, bandwidth);
        let host = NetworkHost::new(element, self.controller.clone(), self.sim_config.clone(), ctx);
        self.sim.add_handler(name, host.clone());
        self.hosts.insert(element, host);
        element
    }

    /// Creates a switch element of the given kind with the given downlink
    /// bandwidth in Mb/s along with the component serving it.
    pub fn add_switch(&mut self, name: &str, kind: ElementKind, bandwidth: f64, ports: u32) -> ElementId {
        assert!(kind.is_switch(), "add_switch accepts only switch kinds");
        let ctx = self.sim.create_context(name);
        let component = ctx.id();
        let element = self
            .controller
            .borrow_mut()
            .add_element(name, component, kind, ports, bandwidth);
        let switch = Switch::new(element, self.controller.clone(), self.sim_config.clone(), ctx);
        self.sim.add_handler(name, switch.clone());
        self.switches.insert(element, switch);
        element
    }

    /// Attaches a host to its edge switch.
    pub fn attach_host(&mut self, host: ElementId, edge: ElementId) {
        self.controller.borrow_mut().attach_host(host, edge);
    }

    /// Connects two switches with a physical topology link.
    pub fn connect_switches(&mut self, switch1: ElementId, switch2: ElementId, bandwidth: f64, latency: f64) {
        self.controller
            .borrow_mut()
            .connect_switches(switch1, switch2, bandwidth, latency);
    }

    /// Loads an externally built physical topology (e.g. parsed from a BRITE
    /// file) and binds switches to its nodes by node name.
    pub fn load_topology(
        &mut self,
        topology: PhysicalTopology,
        bindings: &[(ElementId, &str)],
    ) -> Result<(), TopologyError> {
        self.controller.borrow_mut().load_topology(topology, bindings)
    }

    /// Builds the routing tables of all elements. Invoked once, after the
    /// physical topology is fixed.
    pub fn build_routing_tables(&mut self) -> Result<(), TopologyError> {
        self.controller.borrow_mut().build_routing_tables()
    }

    /// Registers the placement of a VM on a host.
    pub fn spawn_vm(&mut self, vm_id: u32, host: ElementId) {
        self.controller.borrow_mut().place_vm(vm_id, host);
    }

    /// Removes a VM and tears down all virtual links referencing it.
    pub fn remove_vm(&mut self, vm_id: u32) {
        self.controller.borrow_mut().remove_vm(vm_id);
    }

    /// Submits a virtual-link request of the given user and returns the
    /// assigned flow id.
    pub fn virtual_link(&mut self, user: u32, src_vm: u32, dst_vm: u32, bandwidth: f64) -> u64 {
        self.controller.borrow_mut().add_virtual_link(user, src_vm, dst_vm, bandwidth)
    }

    /// Deploys the virtual topology of the given user into forwarding tables.
    pub fn deploy_user(&mut self, user: u32) {
        self.controller.borrow_mut().deploy_user_application(user);
    }

    /// Submits data of the given flow at the host of the source VM.
    pub fn send_data(&mut self, src_vm: u32, dst_vm: u32, flow_id: u64, size: u64) {
        let host = self.controller.borrow().host_of_vm(src_vm);
        match host {
            Some(host) => {
                let component = self.controller.borrow().element(host).component;
                self.ctx.emit_now(
                    SendData {
                        src_vm,
                        dst_vm,
                        flow_id,
                        size,
                    },
                    component,
                );
            }
            None => {
                panic!("VM {} is not placed on any host", src_vm);
            }
        }
    }

    /// Returns the controller.
    pub fn controller(&self) -> Rc<RefCell<Controller>> {
        self.controller.clone()
    }

    /// Returns the component serving the given host element.
    pub fn host(&self, host: ElementId) -> Rc<RefCell<NetworkHost>> {
        self.hosts.get(&host).unwrap().clone()
    }

    /// Returns the component serving the given switch element.
    pub fn switch(&self, switch: ElementId) -> Rc<RefCell<Switch>> {
        self.switches.get(&switch).unwrap().clone()
    }

    /// Returns the simulation config.
    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    /// Performs the specified number of simulation steps.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Steps through the simulation with duration limit.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.sim.step_for_duration(duration)
    }
}
