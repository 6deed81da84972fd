//! Tiered network reorganization.

mod common;

use std::sync::Arc;

use common::{add_class, add_node, network, EngineCall, FakeEngine};
use zgate_zwave::reorg::N_TRIES;
use zgate_zwave::{cc, CcKey, DataPath, DataTree, DataValue, NetworkReorganizer, Tier};

const MAINS: [u16; 2] = [2, 3];
const FLIRS: u16 = 4;
const BATTERY: [u16; 3] = [5, 6, 7];
const PORTABLE: u16 = 8;

fn mixed_network() -> Arc<DataTree> {
    let tree = network();
    for node in MAINS {
        add_node(&tree, node, true);
    }
    add_node(&tree, FLIRS, false);
    tree.set(&DataPath::device(FLIRS, "sensor250"), true);
    for node in BATTERY {
        add_node(&tree, node, false);
    }
    add_node(&tree, PORTABLE, false);
    tree.set(&DataPath::device(PORTABLE, "basicType"), 1i64);
    tree
}

fn neighbour_updates(engine: &FakeEngine) -> Vec<u16> {
    engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::NeighbourUpdate(node) => Some(node),
            _ => None,
        })
        .collect()
}

#[test]
fn test_tiers_run_in_order() {
    let tree = mixed_network();
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();

    let tiers: Vec<(u16, Tier)> = reorg.nodes().iter().map(|n| (n.node_id, n.tier)).collect();
    assert_eq!(
        tiers,
        vec![
            (2, Tier::Mains),
            (3, Tier::Mains),
            (4, Tier::Flirs),
            (5, Tier::Battery),
            (6, Tier::Battery),
            (7, Tier::Battery),
        ]
    );
    assert_eq!(engine.pending(), vec![2, 3]);

    engine.complete(2, true);
    assert_eq!(engine.pending(), vec![3]);
    assert_eq!(neighbour_updates(&engine), vec![2, 3]);

    engine.complete(3, true);
    assert_eq!(engine.pending(), vec![FLIRS]);

    engine.complete(FLIRS, true);
    assert_eq!(engine.pending(), BATTERY.to_vec());

    engine.complete_all(true);
    assert!(!reorg.is_running());
    assert!(reorg.nodes().iter().all(|n| n.done && !n.fail));
    assert_eq!(neighbour_updates(&engine), vec![2, 3, 4, 5, 6, 7]);
    let log = reorg.log();
    assert_eq!(log.first().unwrap().node_id, 0);
    assert_eq!(log.last().unwrap().message, "Reorganization finished");
}

#[test]
fn test_failing_node_is_retried_then_given_up() {
    let tree = mixed_network();
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();

    engine.complete(2, true);
    for attempt in 1..N_TRIES {
        engine.complete(3, false);
        assert_eq!(engine.pending(), vec![3], "attempt {}", attempt);
    }
    engine.complete(3, false);

    let node = reorg.nodes().into_iter().find(|n| n.node_id == 3).unwrap();
    assert!(node.fail);
    assert_eq!(node.tries, N_TRIES);
    assert_eq!(
        neighbour_updates(&engine).iter().filter(|&&n| n == 3).count(),
        N_TRIES as usize
    );
    // the next tier starts once the mains tier gave up
    assert_eq!(engine.pending(), vec![FLIRS]);
}

#[test]
fn test_retry_is_queued_behind_the_tier() {
    let tree = mixed_network();
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();

    engine.complete(2, false);
    assert_eq!(engine.pending(), vec![3, 2]);
}

#[test]
fn test_failed_nodes_are_skipped() {
    let tree = mixed_network();
    tree.set(&DataPath::device(3, "isFailed"), true);
    tree.set(&DataPath::device(FLIRS, "isFailed"), true);
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();
    assert_eq!(engine.pending(), vec![2]);

    // the FLiRS tier finishes immediately since its only node is failed
    engine.complete(2, true);
    assert_eq!(engine.pending(), BATTERY.to_vec());
    let skipped: Vec<u16> = reorg.nodes().iter().filter(|n| n.fail).map(|n| n.node_id).collect();
    assert_eq!(skipped, vec![3, FLIRS]);
}

#[test]
fn test_empty_tiers_are_passed() {
    let tree = network();
    add_node(&tree, 9, false);
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();
    assert_eq!(engine.pending(), vec![9]);

    engine.complete(9, true);
    assert!(!reorg.is_running());
}

#[test]
fn test_routes_rebuilt_towards_associations() {
    let tree = mixed_network();
    add_class(
        &tree,
        CcKey::new(2, 0, cc::ASSOCIATION),
        &[("1.nodes", DataValue::IntArray(vec![1, 3]))],
    );
    add_class(
        &tree,
        CcKey::new(2, 1, cc::MULTI_CHANNEL_ASSOCIATION),
        &[("1.nodesInstances", DataValue::IntArray(vec![3, 1, 6, 0]))],
    );
    add_class(
        &tree,
        CcKey::new(2, 0, cc::WAKEUP),
        &[("nodeId", DataValue::Int(1))],
    );
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    assert_eq!(reorg.associated_nodes(2), vec![1, 3, 6]);

    reorg.start().unwrap();
    engine.complete(2, true);
    let routes: Vec<EngineCall> = engine
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, EngineCall::NeighbourUpdate(_)))
        .collect();
    assert_eq!(
        routes,
        vec![
            EngineCall::DeleteSucReturnRoute(2),
            EngineCall::DeleteReturnRoute(2),
            EngineCall::AssignSucReturnRoute(2),
            EngineCall::AssignReturnRoute(2, 1),
            EngineCall::AssignReturnRoute(2, 3),
            EngineCall::AssignReturnRoute(2, 6),
        ]
    );
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let tree = mixed_network();
    let engine = FakeEngine::new();
    let reorg = NetworkReorganizer::new(tree, engine.clone());
    reorg.start().unwrap();
    assert!(reorg.start().is_err());

    engine.complete_all(true);
    assert!(!reorg.is_running());
    reorg.start().unwrap();
    let log = reorg.log();
    assert_eq!(log[0].message, "Reorganization started for 6 nodes");
    assert!(log.iter().all(|e| e.message != "Reorganization finished"));
}
