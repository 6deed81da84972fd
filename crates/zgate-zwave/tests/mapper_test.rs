//! Command class mapping against a fake network.

mod common;

use std::time::Duration;

use common::{add_class, add_node, finish_interview, network, Harness, PRODUCT};
use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, Verb};
use zgate_zwave::mapper::handlers::{color_to_level, level_to_color};
use zgate_zwave::{cc, CcCommand, CcKey, DataPath, DataValue, FixRecord, MapperOptions};

const NODE: u16 = 5;

fn switch_key() -> CcKey {
    CcKey::new(NODE, 0, cc::SWITCH_BINARY)
}

fn motion_key() -> CcKey {
    CcKey::new(NODE, 0, cc::SENSOR_BINARY)
}

fn with_switch_and_motion() -> Harness {
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, switch_key(), &[("level", DataValue::Bool(false))]);
    add_class(
        &tree,
        motion_key(),
        &[
            ("12.level", DataValue::Bool(false)),
            ("12.sensorTypeString", DataValue::from("Motion")),
        ],
    );
    Harness::new(tree)
}

#[test]
fn test_interviewed_class_is_materialized_once() {
    let h = with_switch_and_motion();
    h.mapper.start();
    assert!(!h.registry.contains(&h.id("5-0-37")));

    finish_interview(&h.tree, switch_key());
    assert!(h.registry.contains(&h.id("5-0-37")));
    assert_eq!(h.level("5-0-37"), Some(MetricValue::from("off")));

    // a repeated interview result and a second start change nothing
    finish_interview(&h.tree, switch_key());
    h.mapper.start();
    assert_eq!(h.registry.ids_with_prefix(&h.id("5-0-37")).len(), 1);
    assert_eq!(h.mapper.materialized_count(), 1);

    h.tree.set(&DataPath::cc(switch_key(), "level"), true);
    assert_eq!(h.level("5-0-37"), Some(MetricValue::from("on")));
}

#[test]
fn test_existing_classes_are_enumerated_on_start() {
    let h = with_switch_and_motion();
    finish_interview(&h.tree, switch_key());
    finish_interview(&h.tree, motion_key());

    h.mapper.start();
    assert!(h.registry.contains(&h.id("5-0-37")));
    assert!(h.registry.contains(&h.id("5-0-48-12")));
    let motion = h.registry.get(&h.id("5-0-48-12")).unwrap();
    assert_eq!(motion.probe_type, "motion");
    assert_eq!(motion.title(), "Sensor Motion (5)");
}

#[test]
fn test_new_sensor_type_extends_materialized_class() {
    let h = with_switch_and_motion();
    h.mapper.start();
    finish_interview(&h.tree, motion_key());
    assert!(!h.registry.contains(&h.id("5-0-48-8")));

    h.tree.set(&DataPath::cc(motion_key(), "8.level"), true);
    assert_eq!(h.level("5-0-48-8"), Some(MetricValue::from("on")));
}

#[test]
fn test_interview_reset_dematerializes() {
    let h = with_switch_and_motion();
    h.mapper.start();
    finish_interview(&h.tree, switch_key());
    assert!(h.mapper.is_materialized(switch_key()));

    h.tree.set(&DataPath::cc(switch_key(), "interviewDone"), false);
    assert!(!h.mapper.is_materialized(switch_key()));
    assert!(!h.registry.contains(&h.id("5-0-37")));

    finish_interview(&h.tree, switch_key());
    assert!(h.registry.contains(&h.id("5-0-37")));
}

#[test]
fn test_removal_leaves_no_bindings_behind() {
    let h = with_switch_and_motion();
    h.mapper.start();
    let baseline = h.tree.binding_count();

    let meter = CcKey::new(NODE, 0, cc::METER);
    add_class(
        &h.tree,
        meter,
        &[
            ("0.val", DataValue::Float(12.5)),
            ("0.sensorType", DataValue::Int(1)),
            ("0.scaleString", DataValue::from("kWh")),
        ],
    );
    for key in [switch_key(), motion_key(), meter] {
        finish_interview(&h.tree, key);
    }
    assert_eq!(h.mapper.materialized_count(), 3);
    assert!(h.tree.binding_count() > baseline);

    h.tree.remove_command_class(meter);
    assert!(!h.mapper.is_materialized(meter));
    assert!(h.registry.ids_with_prefix(&h.id("5-0-50")).is_empty());

    h.tree.remove_device(NODE);
    assert_eq!(h.mapper.materialized_count(), 0);
    assert!(h.registry.ids_with_prefix(&h.id("5-")).is_empty());
    // only the controller binding of the mapper is left
    assert_eq!(h.tree.binding_count(), 1);
    assert!(h.mapper.contexts().is_empty());
}

#[test]
fn test_exclusion_removes_node_vdevs() {
    let h = with_switch_and_motion();
    h.mapper.start();
    finish_interview(&h.tree, switch_key());
    finish_interview(&h.tree, motion_key());

    h.tree.set(&DataPath::controller("lastExcludedDevice"), NODE as i64);
    assert!(h.registry.ids_with_prefix(&h.id("5-")).is_empty());
    assert!(!h.registry.was_created(&h.id("5-0-37")));
}

#[test]
fn test_stop_removes_everything() {
    let h = with_switch_and_motion();
    h.mapper.start();
    finish_interview(&h.tree, switch_key());
    finish_interview(&h.tree, motion_key());

    h.mapper.stop();
    assert!(h.registry.is_empty());
    assert_eq!(h.tree.binding_count(), 0);
}

#[test]
fn test_more_specific_rename_wins() {
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, switch_key(), &[("level", DataValue::Bool(false))]);
    let h = Harness::with_options(
        tree,
        MapperOptions {
            cosmetic_on_inclusion_only: false,
            ..MapperOptions::default()
        },
    );
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["rename,0-37,Specific"]))
        .unwrap();
    h.postfix
        .add(FixRecord::new("134").with_post_interview(["rename,0-37,Generic", "icon,0-37,valve"]))
        .unwrap();

    h.mapper.start();
    finish_interview(&h.tree, switch_key());
    let switch = h.registry.get(&h.id("5-0-37")).unwrap();
    assert_eq!(switch.title(), "Specific (5)");
    // the generic fix still applies where it is not overridden
    assert_eq!(switch.metric("icon"), Some(&MetricValue::from("valve")));
}

#[test]
fn test_cosmetic_fixes_wait_for_inclusion() {
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, switch_key(), &[("level", DataValue::Bool(false))]);
    let h = Harness::new(tree);
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["rename,0-37,Pump", "renameNode,Cellar"]))
        .unwrap();
    h.mapper.start();

    finish_interview(&h.tree, switch_key());
    let switch = h.registry.get(&h.id("5-0-37")).unwrap();
    assert_ne!(switch.title(), "Pump (5)");
    assert_eq!(
        h.tree.string(&DataPath::device(NODE, "givenName")).as_deref(),
        Some("MainsDevice _5")
    );

    h.tree.set(&DataPath::cc(switch_key(), "interviewDone"), false);
    h.tree.set(&DataPath::controller("lastIncludedDevice"), NODE as i64);
    finish_interview(&h.tree, switch_key());
    let switch = h.registry.get(&h.id("5-0-37")).unwrap();
    assert_eq!(switch.title(), "Pump (5)");
    assert_eq!(
        h.tree.string(&DataPath::device(NODE, "givenName")).as_deref(),
        Some("Cellar")
    );
}

#[test]
fn test_no_vdev_suppresses_class() {
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, switch_key(), &[("level", DataValue::Bool(false))]);
    let h = Harness::new(tree);
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["noVDev,0-37"]))
        .unwrap();
    h.mapper.start();

    finish_interview(&h.tree, switch_key());
    assert!(!h.registry.contains(&h.id("5-0-37")));
}

#[test]
fn test_unknown_directive_is_reported() {
    let h = with_switch_and_motion();
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["eval,0-37,process.exit()"]))
        .unwrap();
    h.mapper.start();

    finish_interview(&h.tree, switch_key());
    assert!(h.registry.contains(&h.id("5-0-37")));
    assert!(h
        .notifier
        .messages()
        .iter()
        .any(|m| m.contains("unknown directive 'eval'")));
}

#[test]
fn test_switch_commands_reach_the_engine() {
    let h = with_switch_and_motion();
    h.mapper.start();
    finish_interview(&h.tree, switch_key());

    h.registry
        .dispatch(&h.id("5-0-37"), "on", &CommandArgs::new())
        .unwrap();
    h.registry
        .dispatch(&h.id("5-0-37"), "update", &CommandArgs::new())
        .unwrap();
    let sent: Vec<CcCommand> = h.engine.take_sent().into_iter().map(|r| r.command).collect();
    assert_eq!(sent, vec![CcCommand::Set(vec![255]), CcCommand::Get(vec![])]);
}

#[test]
fn test_color_channel_level_round_trip() {
    let tree = network();
    add_node(&tree, NODE, true);
    let key = CcKey::new(NODE, 0, cc::SWITCH_COLOR);
    add_class(&tree, key, &[("0.level", DataValue::Int(0))]);
    let h = Harness::new(tree);
    h.mapper.start();
    finish_interview(&h.tree, key);
    let id = h.id("5-0-51-0");

    for level in [1, 17, 33, 50, 98, 99] {
        h.registry
            .dispatch_verb(&id, Verb::Exact, &CommandArgs::new().with("level", level))
            .unwrap();
        let sent = h.engine.take_sent();
        let value = match &sent[..] {
            [request] => match &request.command {
                CcCommand::Set(args) => args[1],
                other => panic!("unexpected command {:?}", other),
            },
            other => panic!("expected one request, got {:?}", other),
        };
        assert_eq!(value, level_to_color(level));

        h.tree.set(&DataPath::cc(key, "0.level"), value);
        let reported = h.registry.metric(&id, "level").and_then(|l| l.as_i64()).unwrap();
        assert!((reported - level).abs() <= 2, "level {} came back as {}", level, reported);
        assert_eq!(reported, color_to_level(value));
    }
}

#[tokio::test(start_paused = true)]
async fn test_emulate_off_reverts_after_timeout() {
    let h = with_switch_and_motion();
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["emulateOff,0-48-12,2000"]))
        .unwrap();
    h.mapper.start();
    finish_interview(&h.tree, motion_key());
    let motion = "5-0-48-12";
    let level = DataPath::cc(motion_key(), "12.level");

    h.tree.set(&level, true);
    assert_eq!(h.level(motion), Some(MetricValue::from("on")));
    // the device reporting off is ignored
    h.tree.set(&level, false);
    assert_eq!(h.level(motion), Some(MetricValue::from("on")));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.level(motion), Some(MetricValue::from("on")));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.level(motion), Some(MetricValue::from("off")));
}

#[tokio::test(start_paused = true)]
async fn test_emulate_off_restarts_on_retrigger() {
    let h = with_switch_and_motion();
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["emulateOff,0-48-12,2000"]))
        .unwrap();
    h.mapper.start();
    finish_interview(&h.tree, motion_key());
    let motion = "5-0-48-12";
    let level = DataPath::cc(motion_key(), "12.level");

    h.tree.set(&level, true);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    h.tree.set(&level, true);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.level(motion), Some(MetricValue::from("on")));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.level(motion), Some(MetricValue::from("off")));
}

#[tokio::test(start_paused = true)]
async fn test_emulate_off_timer_dies_with_vdev() {
    let h = with_switch_and_motion();
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["emulateOff,0-48-12,2000"]))
        .unwrap();
    h.mapper.start();
    finish_interview(&h.tree, motion_key());
    h.tree.set(&DataPath::cc(motion_key(), "12.level"), true);
    assert!(h.mapper.contexts().has_timer(&h.id("5-0-48-12")));

    h.tree.remove_command_class(motion_key());
    assert!(!h.mapper.contexts().has_timer(&h.id("5-0-48-12")));
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert!(!h.registry.contains(&h.id("5-0-48-12")));
}
