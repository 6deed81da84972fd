//! Dead node detection.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{add_class, add_node, finish_interview, network, Harness, RecordingNotifier};
use zgate_core::unix_now;
use zgate_devices::VirtualDeviceRegistry;
use zgate_zwave::{cc, CcKey, DataPath, DataTree, DataValue, DeadDetector};

const INTERVAL: i64 = 3600;

fn detector(
    tree: &Arc<DataTree>,
    registry: &Arc<VirtualDeviceRegistry>,
    notifier: &Arc<RecordingNotifier>,
) -> Arc<DeadDetector> {
    DeadDetector::new(
        "zway",
        tree.clone(),
        registry.clone(),
        notifier.clone(),
        Duration::from_secs(24 * 3600),
    )
}

/// A mapped switch on node 5 plus a sleeping sensor on node 7.
fn mapped() -> Harness {
    let tree = network();
    add_node(&tree, 5, true);
    let switch = CcKey::new(5, 0, cc::SWITCH_BINARY);
    add_class(&tree, switch, &[("level", DataValue::Bool(false))]);

    add_node(&tree, 7, false);
    let sensor = CcKey::new(7, 0, cc::SENSOR_BINARY);
    add_class(&tree, sensor, &[("1.level", DataValue::Bool(false))]);
    add_class(
        &tree,
        CcKey::new(7, 0, cc::WAKEUP),
        &[
            ("interval", DataValue::Int(INTERVAL)),
            ("nodeId", DataValue::Int(common::CONTROLLER as i64)),
            ("lastWakeup", DataValue::Int(0)),
            ("lastSleep", DataValue::Int(0)),
        ],
    );

    let h = Harness::new(tree);
    h.mapper.start();
    finish_interview(&h.tree, switch);
    finish_interview(&h.tree, sensor);
    h
}

fn is_failed(h: &Harness, suffix: &str) -> bool {
    h.registry.get(&h.id(suffix)).unwrap().is_failed()
}

#[test]
fn test_second_failure_marks_node_failed() {
    let h = mapped();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    detector.start();

    h.tree.set(&DataPath::device(5, "isFailed"), true);
    h.tree.set(&DataPath::device(5, "failureCount"), 1i64);
    assert!(!is_failed(&h, "5-0-37"));

    h.tree.set(&DataPath::device(5, "failureCount"), 2i64);
    assert!(is_failed(&h, "5-0-37"));
    assert!(!is_failed(&h, "7-0-48-1"));
    assert_eq!(detector.failed_nodes(), vec![5]);
    assert!(h
        .notifier
        .messages()
        .contains(&"Connection lost to MainsDevice _5 (5)".to_string()));

    h.tree.set(&DataPath::device(5, "isFailed"), false);
    assert!(!is_failed(&h, "5-0-37"));
    assert!(h
        .notifier
        .messages()
        .contains(&"MainsDevice _5 (5) is back to life".to_string()));
}

#[test]
fn test_healthy_update_does_not_announce_recovery() {
    let h = mapped();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    detector.start();

    h.tree.set(&DataPath::device(5, "failureCount"), 0i64);
    h.tree.set(&DataPath::device(5, "isFailed"), true);
    h.tree.set(&DataPath::device(5, "isFailed"), false);
    assert!(h.notifier.messages().is_empty());
}

#[test]
fn test_wakeup_clears_failure() {
    let h = mapped();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    detector.start();

    h.tree.set(&DataPath::device(7, "isFailed"), true);
    h.tree.set(&DataPath::device(7, "failureCount"), 2i64);
    assert!(is_failed(&h, "7-0-48-1"));

    h.tree.set(&DataPath::cc(CcKey::new(7, 0, cc::WAKEUP), "lastWakeup"), unix_now());
    assert!(!is_failed(&h, "7-0-48-1"));
}

#[test]
fn test_sweep_applies_sleeping_heuristic() {
    let h = mapped();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    let wakeup = CcKey::new(7, 0, cc::WAKEUP);
    let now = unix_now();
    let stale = now - 3 * INTERVAL - 1;

    h.tree.set(&DataPath::cc(wakeup, "lastWakeup"), stale);
    h.tree.set(&DataPath::cc(wakeup, "lastSleep"), stale);
    detector.check_sleeping_node(7, now);
    assert!(is_failed(&h, "7-0-48-1"));

    h.tree.set(&DataPath::cc(wakeup, "lastWakeup"), now - 10);
    detector.check_sleeping_node(7, now);
    assert!(!is_failed(&h, "7-0-48-1"));
}

#[test]
fn test_sweep_skips_portable_controllers_and_controller() {
    let h = mapped();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    let wakeup = CcKey::new(7, 0, cc::WAKEUP);
    let stale = unix_now() - 4 * INTERVAL;
    h.tree.set(&DataPath::cc(wakeup, "lastWakeup"), stale);
    h.tree.set(&DataPath::cc(wakeup, "lastSleep"), stale);
    h.tree.set(&DataPath::device(7, "basicType"), 1i64);
    h.tree.set(&DataPath::device(common::CONTROLLER, "isFailed"), true);

    detector.sweep();
    assert!(!is_failed(&h, "7-0-48-1"));
    assert!(detector.failed_nodes().is_empty());
}

#[test]
fn test_removed_node_releases_bindings() {
    let h = mapped();
    let before = h.tree.binding_count();
    let detector = detector(&h.tree, &h.registry, &h.notifier);
    detector.start();
    assert!(h.tree.binding_count() > before);

    detector.stop();
    assert_eq!(h.tree.binding_count(), before);
}
