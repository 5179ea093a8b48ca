//! End-to-end scenarios straight out of the routing spec's worked examples:
//! hop-count convergence over a line and a small tree, ETX forwarding over a
//! two-hop path, and broadcast fan-out ordering.

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use wsn_routing::Role;
use wsn_sim::{Medium, Scheduler, Simulation};
use wsn_types::{Address, DelaySampler, Link, Network, Node, NodeKind, Payload, RoutingProtocolKind, SimConfig, WirePacket};

fn protocol_for(kind: RoutingProtocolKind, deadline: f64) -> impl FnMut(&Node) -> Box<dyn wsn_types::RoutingProtocol> {
    move |node| {
        let role = if matches!(node.kind, NodeKind::Sink) { Role::Sink } else { Role::Sensing };
        wsn_routing::build(kind, role, deadline)
    }
}

fn last_wire(shared: &wsn_sim::NodeShared) -> Option<&str> {
    shared.message_sent.last().map(|(_, wire)| wire.as_str())
}

#[test]
fn line_0_1_converges_to_hop_count_one_with_exactly_one_hello_from_sink() {
    let network = Network::new(
        vec![Node::sink("0", "sink"), Node::sensing("1", "1", 3600.0, 30.0)],
        vec![Link::new("0", "1", DelaySampler::fixed(5.0))],
    );
    let config = SimConfig::new(RoutingProtocolKind::MinHop, 30.0).with_seed(1);
    let sim = Simulation::new(network, &config, protocol_for(RoutingProtocolKind::MinHop, 30.0));
    sim.run(60.0);

    let sink_shared = sim.node(&Address::new("0")).unwrap().shared();
    let sink = sink_shared.borrow();
    let hellos: Vec<&str> = sink.message_sent.iter().map(|(_, w)| w.as_str()).collect();
    assert_eq!(hellos, vec!["0,,Hello+0"]);

    let node1_shared = sim.node(&Address::new("1")).unwrap().shared();
    let node1 = node1_shared.borrow();
    assert_eq!(last_wire(&node1), Some("1,,Hello+1"));
    // No measurement yet: the sensing period (3600s) far exceeds the run.
    assert!(node1.output_queue_messages.is_empty());
}

#[test]
fn small_tree_converges_hop_counts_to_graph_distance() {
    // sink(0) -- 1 -- 2 -- 4
    //         \- 3
    let network = Network::new(
        vec![
            Node::sink("0", "sink"),
            Node::sensing("1", "1", 7200.0, 10.0),
            Node::sensing("2", "2", 7200.0, 10.0),
            Node::sensing("3", "3", 7200.0, 10.0),
            Node::sensing("4", "4", 7200.0, 10.0),
        ],
        vec![
            Link::new("0", "1", DelaySampler::fixed(1.0)),
            Link::new("0", "3", DelaySampler::fixed(1.0)),
            Link::new("1", "2", DelaySampler::fixed(1.0)),
            Link::new("2", "4", DelaySampler::fixed(1.0)),
        ],
    );
    let config = SimConfig::new(RoutingProtocolKind::MinHop, 30.0).with_seed(2);
    let sim = Simulation::new(network, &config, protocol_for(RoutingProtocolKind::MinHop, 30.0));
    sim.run(5.0 * wsn_types::config::ETX_SHARE_PERIOD);

    let expect = [("1", 1u32), ("3", 1u32), ("2", 2u32), ("4", 3u32)];
    for (addr, hop) in expect {
        let shared = sim.node(&Address::new(addr)).unwrap().shared();
        let wire = last_wire(&shared.borrow()).unwrap().to_string();
        let packet = WirePacket::decode(&wire).unwrap();
        match Payload::parse(&packet.payload) {
            Some(Payload::Hello { hop_count: Some(h) }) => assert_eq!(h, hop, "node {addr}"),
            other => panic!("node {addr}: expected a Hello+n broadcast, got {other:?}"),
        }
    }
}

#[test]
fn path_0_1_2_etx_forwards_every_measurement_through_node_one() {
    let network = Network::new(
        vec![
            Node::sink("0", "sink"),
            Node::sensing("1", "1", 500.0, 10.0),
            Node::sensing("2", "2", 500.0, 15.0),
        ],
        vec![
            Link::new("0", "1", DelaySampler::uniform(5.0, 10.0)),
            Link::new("1", "2", DelaySampler::uniform(5.0, 10.0)),
        ],
    );
    let config = SimConfig::new(RoutingProtocolKind::Etx, 60.0).with_seed(3);
    let sim = Simulation::new(network, &config, protocol_for(RoutingProtocolKind::Etx, 60.0));
    sim.run(2.0 * 500.0);

    let sink_shared = sim.node(&Address::new("0")).unwrap().shared();
    let sink = sink_shared.borrow();

    let mut saw_forward_from_two = false;
    for (_, wire) in &sink.received_messages {
        let packet = WirePacket::decode(wire).unwrap();
        if Payload::is_hello(&packet.payload) || Payload::is_etx(&packet.payload) {
            continue;
        }
        let Some(Payload::Measurement { source, .. }) = Payload::parse(&packet.payload) else {
            continue;
        };
        assert!(source.as_str() == "1" || source.as_str() == "2");
        // Only node 1 is adjacent to the sink, so every application wire
        // the sink ever receives was forwarded (or originated) by node 1 -
        // the one-intermediate-hop property the scenario calls for.
        assert_eq!(packet.origin.as_str(), "1");
        if source.as_str() == "2" {
            saw_forward_from_two = true;
        }
    }
    assert!(saw_forward_from_two, "expected at least one relayed measurement from node 2");
}

#[test]
fn broadcast_to_three_neighbours_delivers_in_link_enumeration_order() {
    let network = Network::new(
        vec![
            Node::sink("0", "sink"),
            Node::sensing("1", "1", 3600.0, 30.0),
            Node::sensing("2", "2", 3600.0, 30.0),
            Node::sensing("3", "3", 3600.0, 30.0),
        ],
        vec![
            Link::new("0", "2", DelaySampler::fixed(1.0)),
            Link::new("0", "3", DelaySampler::fixed(1.0)),
            Link::new("0", "1", DelaySampler::fixed(1.0)),
        ],
    );
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(0)));
    let mut medium = Medium::new(network, rng);
    let order = Rc::new(RefCell::new(Vec::new()));

    for addr in ["1", "2", "3"] {
        let order = order.clone();
        let addr_owned = addr.to_string();
        medium.register(
            Address::new(addr),
            Rc::new(move |sched: Scheduler, _wire: String| {
                order.borrow_mut().push((addr_owned.clone(), sched.now()));
            }),
        );
    }

    let sched = Scheduler::new();
    medium.send(sched.clone(), "0,,Hello+0").unwrap();
    sched.run(10.0);

    // Registered link order was 2, 3, 1 - delivery must follow that, not
    // address-sorted order, and all at the same virtual time.
    let got = order.borrow().clone();
    assert_eq!(got, vec![("2".to_string(), 0.0), ("3".to_string(), 0.0), ("1".to_string(), 0.0)]);
}
