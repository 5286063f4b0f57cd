use cloudsdn_core::Simulation;

use cloudsdn_network::config::SimulationConfig;
use cloudsdn_network::control::tables::FlowKey;
use cloudsdn_network::element::{ElementId, ElementKind};
use cloudsdn_network::simulation::SdnSimulation;
use cloudsdn_network::topology::TopologyError;

// 1 root, 1 aggregate, 2 edge switches, 3 hosts (h1 and h3 behind edge1,
// h2 behind edge2), each link 1000 Mb/s.
struct TestBed {
    sdn: SdnSimulation,
    root: ElementId,
    agg: ElementId,
    edge1: ElementId,
    edge2: ElementId,
    h1: ElementId,
    h2: ElementId,
    h3: ElementId,
}

fn build_testbed() -> TestBed {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Simulation::new(123);
    let mut sdn = SdnSimulation::new(sim, SimulationConfig::default());
    let root = sdn.add_switch("root", ElementKind::RootSwitch, 1000., 4);
    let agg = sdn.add_switch("agg", ElementKind::AggregateSwitch, 1000., 4);
    let edge1 = sdn.add_switch("edge1", ElementKind::EdgeSwitch, 1000., 4);
    let edge2 = sdn.add_switch("edge2", ElementKind::EdgeSwitch, 1000., 4);
    let h1 = sdn.add_host("h1", 1000., 1);
    let h2 = sdn.add_host("h2", 1000., 1);
    let h3 = sdn.add_host("h3", 1000., 1);
    sdn.attach_host(h1, edge1);
    sdn.attach_host(h3, edge1);
    sdn.attach_host(h2, edge2);
    sdn.connect_switches(edge1, agg, 1000., 0.);
    sdn.connect_switches(edge2, agg, 1000., 0.);
    sdn.connect_switches(agg, root, 1000., 0.);
    TestBed {
        sdn,
        root,
        agg,
        edge1,
        edge2,
        h1,
        h2,
        h3,
    }
}

fn total_forwarding_rules(bed: &TestBed) -> usize {
    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    (0..controller.element_count())
        .map(|e| controller.element(e).forwarding.len())
        .sum()
}

// number of channels admitted on inter-element links (loopbacks excluded)
fn non_loopback_channels(bed: &TestBed) -> usize {
    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    controller
        .links()
        .filter(|(_, link)| link.src() != link.dst())
        .map(|(_, link)| link.channel_count())
        .sum()
}

#[test]
fn routing_tables_are_built_bottom_up() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    let controller = bed.sdn.controller();
    let controller = controller.borrow();

    // every host has a default route to its edge switch and a loopback rule
    for host in [bed.h1, bed.h2, bed.h3] {
        let uplink = controller.element(host).routing.resolve(None).unwrap();
        assert_eq!(controller.link(uplink).dst(), controller.edge_switch_of(host).unwrap());
        let loopback = controller.element(host).routing.resolve(Some(host)).unwrap();
        assert_eq!(controller.link(loopback).dst(), host);
    }

    // edge switches know their hosts, the aggregate knows all hosts through
    // the edges, the root knows all hosts through the aggregate
    let edge1_dests = controller.element(bed.edge1).routing.known_destinations();
    assert!(edge1_dests.contains(&bed.h1) && edge1_dests.contains(&bed.h3));
    for host in [bed.h1, bed.h2, bed.h3] {
        let link = controller.element(bed.agg).routing.resolve(Some(host)).unwrap();
        assert_eq!(controller.element(controller.link(link).dst()).kind, ElementKind::EdgeSwitch);
        let link = controller.element(bed.root).routing.resolve(Some(host)).unwrap();
        assert_eq!(controller.link(link).dst(), bed.agg);
    }

    // switch default routes point one level up
    let edge1_up = controller.element(bed.edge1).routing.resolve(None).unwrap();
    assert_eq!(controller.link(edge1_up).dst(), bed.agg);
    let agg_up = controller.element(bed.agg).routing.resolve(None).unwrap();
    assert_eq!(controller.link(agg_up).dst(), bed.root);
    // the root has no upward neighbor, hence no default route
    assert!(controller.element(bed.root).routing.resolve(None).is_none());
}

#[test]
fn aggregate_rules_require_edge_rules_to_exist() {
    let bed = build_testbed();
    let controller = bed.sdn.controller();
    let mut controller = controller.borrow_mut();

    // wrong order: aggregate level before edge level
    controller.build_host_routes().unwrap();
    controller.build_default_switch_routes().unwrap();
    controller.build_aggregate_routes();

    let host_dests: Vec<ElementId> = controller
        .element(bed.agg)
        .routing
        .known_destinations()
        .into_iter()
        .filter(|&e| controller.element(e).kind == ElementKind::Host)
        .collect();
    assert!(host_dests.is_empty());

    // completing the missing level and repeating the aggregate pass fixes it
    controller.build_edge_routes();
    controller.build_aggregate_routes();
    let host_dests: Vec<ElementId> = controller
        .element(bed.agg)
        .routing
        .known_destinations()
        .into_iter()
        .filter(|&e| controller.element(e).kind == ElementKind::Host)
        .collect();
    assert_eq!(host_dests.len(), 3);
}

#[test]
fn unattached_host_fails_construction() {
    let sim = Simulation::new(123);
    let mut sdn = SdnSimulation::new(sim, SimulationConfig::default());
    sdn.add_switch("edge", ElementKind::EdgeSwitch, 1000., 4);
    sdn.add_host("h", 1000., 1);
    let err = sdn.build_routing_tables().unwrap_err();
    assert!(matches!(err, TopologyError::UnknownNode(_)));
}

#[test]
fn loopback_link_consumes_no_physical_link() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h1);
    let flow = bed.sdn.virtual_link(1, 1, 2, 100.);
    bed.sdn.deploy_user(1);

    // exactly one self-referencing rule for that link's key
    assert_eq!(total_forwarding_rules(&bed), 1);
    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    let key = FlowKey::new(1, 2, flow);
    assert_eq!(controller.element(bed.h1).forwarding.resolve(&key), Some(bed.h1));
    drop(controller);
    assert_eq!(non_loopback_channels(&bed), 0);
}

#[test]
fn same_edge_link_installs_two_rules_and_two_channels() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(3, bed.h3);
    let flow = bed.sdn.virtual_link(1, 1, 3, 100.);
    bed.sdn.deploy_user(1);

    assert_eq!(total_forwarding_rules(&bed), 2);
    assert_eq!(non_loopback_channels(&bed), 2);
    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    let key = FlowKey::new(1, 3, flow);
    assert_eq!(controller.element(bed.h1).forwarding.resolve(&key), Some(bed.edge1));
    assert_eq!(controller.element(bed.edge1).forwarding.resolve(&key), Some(bed.h3));
}

#[test]
fn cross_edge_link_follows_the_shortest_path() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    let flow = bed.sdn.virtual_link(1, 1, 2, 1.024);
    bed.sdn.deploy_user(1);

    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    let key = FlowKey::new(1, 2, flow);

    // the installed next hops match the path h1 -> edge1 -> agg -> edge2 -> h2
    assert_eq!(controller.element(bed.h1).forwarding.resolve(&key), Some(bed.edge1));
    assert_eq!(controller.element(bed.edge1).forwarding.resolve(&key), Some(bed.agg));
    assert_eq!(controller.element(bed.agg).forwarding.resolve(&key), Some(bed.edge2));
    assert_eq!(controller.element(bed.edge2).forwarding.resolve(&key), Some(bed.h2));
    assert_eq!(controller.element(bed.h2).forwarding.resolve(&key), Some(bed.h2));
    assert!(controller.element(bed.root).forwarding.is_empty());
    assert!(controller.element(bed.h3).forwarding.is_empty());
    drop(controller);
    assert_eq!(total_forwarding_rules(&bed), 5);

    // a channel is admitted at every physical link on the path
    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    for (src, dst) in [
        (bed.h1, bed.edge1),
        (bed.edge1, bed.agg),
        (bed.agg, bed.edge2),
        (bed.edge2, bed.h2),
    ] {
        let admitted = controller
            .links()
            .any(|(_, link)| link.src() == src && link.dst() == dst && link.channel(flow).is_some());
        assert!(admitted, "no channel on the link from {} to {}", src, dst);
    }
}

#[test]
fn deployed_path_matches_independent_shortest_path() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    let flow = bed.sdn.virtual_link(1, 1, 2, 1.024);
    bed.sdn.deploy_user(1);

    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    let key = FlowKey::new(1, 2, flow);

    // walk the installed next hops from edge1 and compare against the path
    // computed independently over the physical topology graph
    let mut walked = vec![bed.edge1];
    let mut current = bed.edge1;
    while let Some(next) = controller.element(current).forwarding.resolve(&key) {
        if controller.element(next).kind == ElementKind::Host || next == current {
            break;
        }
        walked.push(next);
        current = next;
    }

    let src_node = controller.topology_node_of(bed.edge1).unwrap();
    let dst_node = controller.topology_node_of(bed.edge2).unwrap();
    let expected: Vec<_> = controller
        .topology()
        .shortest_path(src_node, dst_node)
        .unwrap()
        .into_iter()
        .map(|node| controller.element_at_node(node).unwrap())
        .collect();
    assert_eq!(walked, expected);
}

#[test]
fn admission_is_monotonic_over_one_link() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    bed.sdn.virtual_link(1, 1, 2, 1.024);
    bed.sdn.deploy_user(1);
    let channels_before = non_loopback_channels(&bed);
    assert_eq!(channels_before, 4);

    // 999 + 1.024 > 1000, the second link must be rejected at every hop
    let flow2 = bed.sdn.virtual_link(1, 1, 2, 999.);
    bed.sdn.deploy_user(1);

    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    for (_, link) in controller.links() {
        assert!(link.channel(flow2).is_none());
        assert!(link.bandwidth().allocated() <= link.bandwidth().capacity());
    }
    drop(controller);
    // existing channels are left unchanged
    assert_eq!(non_loopback_channels(&bed), channels_before);
}

#[test]
fn admitted_bandwidth_never_exceeds_capacity() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    // 400 + 400 fits into 1000, the third 400 does not
    for _ in 0..3 {
        bed.sdn.virtual_link(1, 1, 2, 400.);
    }
    bed.sdn.deploy_user(1);

    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    for (_, link) in controller.links() {
        let committed: f64 = link.channels().map(|c| c.bandwidth()).sum();
        assert!(committed <= link.bandwidth().capacity() + f64::EPSILON);
        assert!(link.channel_count() <= 2);
    }
}

#[test]
fn links_with_unplaced_vms_are_skipped() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    // VM 2 is not placed anywhere
    bed.sdn.virtual_link(1, 1, 2, 100.);
    bed.sdn.deploy_user(1);
    assert_eq!(total_forwarding_rules(&bed), 0);
    assert_eq!(non_loopback_channels(&bed), 0);
}

#[test]
fn removing_vm_sweeps_channels_and_rules() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    bed.sdn.virtual_link(1, 1, 2, 999.);
    bed.sdn.deploy_user(1);
    assert_eq!(non_loopback_channels(&bed), 4);

    bed.sdn.remove_vm(1);
    assert_eq!(non_loopback_channels(&bed), 0);
    assert_eq!(total_forwarding_rules(&bed), 0);

    // the released bandwidth is available to new links again
    bed.sdn.spawn_vm(3, bed.h1);
    bed.sdn.virtual_link(1, 3, 2, 999.);
    bed.sdn.deploy_user(1);
    assert_eq!(non_loopback_channels(&bed), 4);
}

const BRITE: &str = r#"Topology: ( 4 Nodes, 3 Edges )
Model (1 - RTWaxman)

Nodes: ( 4 )
0	0.0	0.0	1	1	-1	RT_NODE
1	1.0	0.0	3	3	-1	RT_NODE
2	2.0	0.0	1	1	-1	RT_NODE
3	3.0	0.0	1	1	-1	RT_NODE

Edges: ( 3 )
0	1	0	1.0	0.0	1000.0	-1	-1	E_RT
1	2	1	1.0	0.0	1000.0	-1	-1	E_RT
2	3	1	1.0	0.0	1000.0	-1	-1	E_RT
"#;

#[test]
fn brite_topology_drives_routing_construction() {
    use cloudsdn_network::topology::PhysicalTopology;

    let sim = Simulation::new(123);
    let mut sdn = SdnSimulation::new(sim, SimulationConfig::default());
    let root = sdn.add_switch("root", ElementKind::RootSwitch, 1000., 4);
    let agg = sdn.add_switch("agg", ElementKind::AggregateSwitch, 1000., 4);
    let edge1 = sdn.add_switch("edge1", ElementKind::EdgeSwitch, 1000., 4);
    let edge2 = sdn.add_switch("edge2", ElementKind::EdgeSwitch, 1000., 4);
    let h1 = sdn.add_host("h1", 1000., 1);
    let h2 = sdn.add_host("h2", 1000., 1);
    sdn.attach_host(h1, edge1);
    sdn.attach_host(h2, edge2);

    let topology = PhysicalTopology::from_brite(BRITE).unwrap();
    sdn.load_topology(topology, &[(root, "0"), (agg, "1"), (edge1, "2"), (edge2, "3")])
        .unwrap();
    sdn.build_routing_tables().unwrap();
    sdn.spawn_vm(1, h1);
    sdn.spawn_vm(2, h2);
    let flow = sdn.virtual_link(1, 1, 2, 1.024);
    sdn.deploy_user(1);

    let controller = sdn.controller();
    let controller = controller.borrow();
    let key = FlowKey::new(1, 2, flow);
    assert_eq!(controller.element(h1).forwarding.resolve(&key), Some(edge1));
    assert_eq!(controller.element(edge1).forwarding.resolve(&key), Some(agg));
    assert_eq!(controller.element(agg).forwarding.resolve(&key), Some(edge2));
    assert_eq!(controller.element(edge2).forwarding.resolve(&key), Some(h2));
}

#[test]
fn binding_to_unknown_brite_node_is_fatal() {
    use cloudsdn_network::topology::PhysicalTopology;

    let sim = Simulation::new(123);
    let mut sdn = SdnSimulation::new(sim, SimulationConfig::default());
    let root = sdn.add_switch("root", ElementKind::RootSwitch, 1000., 4);
    let topology = PhysicalTopology::from_brite(BRITE).unwrap();
    let err = sdn.load_topology(topology, &[(root, "9")]).unwrap_err();
    assert!(matches!(err, TopologyError::UnknownNode(_)));
}

#[test]
fn table_dumps_are_human_readable() {
    let mut bed = build_testbed();
    bed.sdn.build_routing_tables().unwrap();
    bed.sdn.spawn_vm(1, bed.h1);
    bed.sdn.spawn_vm(2, bed.h2);
    bed.sdn.virtual_link(1, 1, 2, 1.024);
    bed.sdn.deploy_user(1);

    let controller = bed.sdn.controller();
    let controller = controller.borrow();
    let name_of = |e: ElementId| controller.element(e).name.clone();
    let routing_dump = controller.element(bed.h1).routing.dump(name_of);
    assert!(routing_dump.contains("default"));
    assert!(routing_dump.contains("h1"));
    let name_of = |e: ElementId| controller.element(e).name.clone();
    let forwarding_dump = controller.element(bed.edge1).forwarding.dump(name_of);
    assert!(forwarding_dump.contains("agg"));
    assert!(forwarding_dump.contains("flow"));
}
