//! Per-class builders driven through the mapper.

mod common;

use std::time::Duration;

use common::{add_class, add_node, finish_interview, network, Harness, PRODUCT};
use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, DeviceType, Verb};
use zgate_zwave::mapper::handlers::color_to_level;
use zgate_zwave::{cc, CcCommand, CcKey, DataPath, DataValue, FixRecord, MapperOptions};

const NODE: u16 = 5;

/// A started mapper over node 5 carrying one class with `data`.
fn mapped(key: CcKey, data: &[(&str, DataValue)], options: MapperOptions) -> Harness {
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, key, data);
    let h = Harness::with_options(tree, options);
    h.mapper.start();
    finish_interview(&h.tree, key);
    h
}

fn sent(h: &Harness) -> Vec<(u8, CcCommand)> {
    h.engine
        .take_sent()
        .into_iter()
        .map(|r| (r.key.cc, r.command))
        .collect()
}

#[test]
fn test_color_channels_found_after_interview() {
    let key = CcKey::new(NODE, 0, cc::SWITCH_COLOR);
    let h = mapped(key, &[("0.level", DataValue::Int(0))], MapperOptions::default());
    assert!(h.registry.contains(&h.id("5-0-51-0")));

    h.tree.set(&DataPath::cc(key, "1.level"), 100i64);
    let cold_white = h.registry.get(&h.id("5-0-51-1")).unwrap();
    assert_eq!(cold_white.probe_type, "switchColor_cold_white");
    assert_eq!(
        cold_white.metric("level").and_then(MetricValue::as_i64),
        Some(color_to_level(100))
    );

    // red and green alone are plain dimmers
    h.tree.set(&DataPath::cc(key, "2.level"), 10i64);
    h.tree.set(&DataPath::cc(key, "3.level"), 20i64);
    assert!(h.registry.contains(&h.id("5-0-51-2")));
    assert!(h.registry.contains(&h.id("5-0-51-3")));

    // blue completes the triple, which is grouped into one RGB vDev
    h.tree.set(&DataPath::cc(key, "4.level"), 30i64);
    let rgb = h.registry.get(&h.id("5-0-51-rgb")).unwrap();
    assert_eq!(rgb.device_type, DeviceType::SwitchRgbw);
    assert_eq!(
        rgb.metric("color"),
        Some(&MetricValue::object([("r", 10), ("g", 20), ("b", 30)]))
    );
    assert_eq!(rgb.metric("level"), Some(&MetricValue::from("on")));
    for single in ["5-0-51-2", "5-0-51-3", "5-0-51-4"] {
        assert!(!h.registry.contains(&h.id(single)), "{} still mapped", single);
    }
    assert!(h.registry.contains(&h.id("5-0-51-0")));

    h.tree.remove(&DataPath::cc(key, "1"));
    assert!(!h.registry.contains(&h.id("5-0-51-1")));
    assert!(h.registry.contains(&h.id("5-0-51-rgb")));
}

#[test]
fn test_meter_scales_and_removed_scale() {
    let key = CcKey::new(NODE, 0, cc::METER);
    let h = mapped(
        key,
        &[
            ("0.val", DataValue::Float(12.5)),
            ("0.sensorType", DataValue::Int(1)),
            ("0.scaleString", DataValue::from("kWh")),
            ("2.val", DataValue::Float(230.0)),
            ("2.sensorType", DataValue::Int(1)),
            ("2.scaleString", DataValue::from("W")),
        ],
        MapperOptions::default(),
    );

    let energy = h.registry.get(&h.id("5-0-50-0")).unwrap();
    assert_eq!(energy.probe_type, "meterElectric_kilowatt_hour");
    assert_eq!(energy.metric("scaleTitle"), Some(&MetricValue::from("kWh")));
    assert_eq!(energy.metric("level").and_then(MetricValue::as_f64), Some(12.5));
    let power = h.registry.get(&h.id("5-0-50-2")).unwrap();
    assert_eq!(power.probe_type, "meterElectric_watt");

    h.tree.set(&DataPath::cc(key, "2.val"), 180.5);
    assert_eq!(
        h.registry.metric(&h.id("5-0-50-2"), "level").and_then(|l| l.as_f64()),
        Some(180.5)
    );

    h.tree.remove(&DataPath::cc(key, "2"));
    assert!(!h.registry.contains(&h.id("5-0-50-2")));
    assert!(h.registry.contains(&h.id("5-0-50-0")));
    assert!(h.mapper.is_materialized(key));
}

fn notification_data() -> Vec<(&'static str, DataValue)> {
    vec![
        ("version", DataValue::Int(3)),
        ("1.typeString", DataValue::from("Smoke Alarm")),
        ("1.2.status", DataValue::Bool(false)),
        ("1.2.eventString", DataValue::from("Smoke detected")),
        ("6.typeString", DataValue::from("Access Control")),
        ("6.22.status", DataValue::Bool(false)),
        ("6.23.status", DataValue::Bool(false)),
        ("7.8.status", DataValue::Bool(false)),
        ("7.8.isState", DataValue::Bool(false)),
        ("8.2.status", DataValue::Bool(false)),
        ("8.3.status", DataValue::Bool(false)),
    ]
}

#[test]
fn test_notification_events_become_vdevs() {
    let key = CcKey::new(NODE, 0, cc::ALARM);
    let h = mapped(key, &notification_data(), MapperOptions::default());

    let smoke = h.registry.get(&h.id("5-0-113-1-2-A")).unwrap();
    assert_eq!(smoke.probe_type, "alarm_smoke");
    assert_eq!(smoke.title(), "Smoke Alarm Smoke detected (5)");
    assert_eq!(smoke.metric("level"), Some(&MetricValue::from("off")));
    h.tree.set(&DataPath::cc(key, "1.2.status"), true);
    assert_eq!(h.level("5-0-113-1-2-A"), Some(MetricValue::from("on")));

    // events that are not states are hidden buttons
    let motion = h.registry.get(&h.id("5-0-113-7-8-A")).unwrap();
    assert_eq!(motion.device_type, DeviceType::ToggleButton);
    assert_eq!(motion.metric("icon"), Some(&MetricValue::from("motion")));
    assert!(!motion.visibility);

    // door closed and AC reconnected fold into their counterparts
    assert!(!h.registry.contains(&h.id("5-0-113-6-23-A")));
    assert!(!h.registry.contains(&h.id("5-0-113-8-3-A")));
    h.tree.set(&DataPath::cc(key, "8.2.status"), true);
    assert_eq!(h.level("5-0-113-8-AC-A"), Some(MetricValue::from("on")));
    h.tree.set(&DataPath::cc(key, "8.2.status"), false);
    assert_eq!(h.level("5-0-113-8-AC-A"), Some(MetricValue::from("off")));

    h.tree.remove(&DataPath::cc(key, "1.2"));
    assert!(!h.registry.contains(&h.id("5-0-113-1-2-A")));
}

#[test]
fn test_door_and_tilt_are_split() {
    let key = CcKey::new(NODE, 0, cc::ALARM);
    let h = mapped(key, &notification_data(), MapperOptions::default());
    let door = "5-0-113-6-Door-A";
    let tilt = "5-0-113-6-Tilt-A";
    assert_eq!(h.level(door), Some(MetricValue::from("off")));
    assert!(!h.registry.contains(&h.id(tilt)));

    h.tree.set(&DataPath::cc(key, "6.22.parameters"), DataValue::IntArray(vec![1]));
    h.tree.set(&DataPath::cc(key, "6.22.status"), true);
    assert_eq!(h.level(tilt), Some(MetricValue::from("on")));
    assert_eq!(h.level(door), Some(MetricValue::from("off")));

    h.tree.set(&DataPath::cc(key, "6.22.status"), false);
    h.tree.set(&DataPath::cc(key, "6.22.parameters"), DataValue::IntArray(vec![0]));
    h.tree.set(&DataPath::cc(key, "6.22.status"), true);
    assert_eq!(h.level(tilt), Some(MetricValue::from("off")));
    assert_eq!(h.level(door), Some(MetricValue::from("on")));
}

#[test]
fn test_old_notification_versions_are_ignored() {
    let key = CcKey::new(NODE, 0, cc::ALARM);
    let h = mapped(
        key,
        &[("version", DataValue::Int(2)), ("1.2.status", DataValue::Bool(false))],
        MapperOptions::default(),
    );
    assert!(h.registry.ids_with_prefix(&h.id("5-0-113")).is_empty());
}

fn thermostat_keys() -> (CcKey, CcKey) {
    (
        CcKey::new(NODE, 0, cc::THERMOSTAT_MODE),
        CcKey::new(NODE, 0, cc::THERMOSTAT_SET_POINT),
    )
}

fn thermostat() -> Harness {
    let (mode, setpoint) = thermostat_keys();
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(
        &tree,
        mode,
        &[
            ("mode", DataValue::Int(0)),
            ("0.modeName", DataValue::from("Off")),
            ("1.modeName", DataValue::from("Heat")),
            ("2.modeName", DataValue::from("Cool")),
        ],
    );
    add_class(
        &tree,
        setpoint,
        &[
            ("1.setVal", DataValue::Float(21.0)),
            ("1.scale", DataValue::Int(0)),
            ("2.setVal", DataValue::Float(25.0)),
            ("2.scale", DataValue::Int(0)),
        ],
    );
    let h = Harness::new(tree);
    h.mapper.start();
    h
}

#[test]
fn test_thermostat_pair_is_built_together() {
    let h = thermostat();
    let (mode, setpoint) = thermostat_keys();

    finish_interview(&h.tree, mode);
    assert!(h.registry.ids_with_prefix(&h.id("5-0-64")).is_empty());

    finish_interview(&h.tree, setpoint);
    assert_eq!(h.mapper.materialized_count(), 1);
    assert_eq!(h.level("5-0-64"), Some(MetricValue::from("off")));
    let heat = h.registry.get(&h.id("5-0-67-1")).unwrap();
    assert_eq!(heat.title(), "Thermostat Heat (5)");
    assert_eq!(heat.metric("min"), Some(&MetricValue::from(5)));
    assert_eq!(heat.metric("level").and_then(MetricValue::as_f64), Some(21.0));
    assert!(h.registry.contains(&h.id("5-0-67-2")));

    h.registry
        .dispatch_verb(&h.id("5-0-67-1"), Verb::Exact, &CommandArgs::new().with("level", 22.5))
        .unwrap();
    h.registry
        .dispatch(&h.id("5-0-64"), "off", &CommandArgs::new())
        .unwrap();
    assert_eq!(
        sent(&h),
        vec![
            (
                cc::THERMOSTAT_SET_POINT,
                CcCommand::SetPointSet {
                    mode: 1,
                    value: 22.5
                }
            ),
            (cc::THERMOSTAT_MODE, CcCommand::Set(vec![1])),
            (cc::THERMOSTAT_MODE, CcCommand::Set(vec![0])),
        ]
    );

    h.tree.set(&DataPath::cc(mode, "mode"), 1i64);
    assert_eq!(h.level("5-0-64"), Some(MetricValue::from("on")));
}

#[test]
fn test_thermostat_remaps_when_one_half_goes() {
    let h = thermostat();
    let (mode, setpoint) = thermostat_keys();
    finish_interview(&h.tree, mode);
    finish_interview(&h.tree, setpoint);
    assert!(h.registry.contains(&h.id("5-0-67-1")));

    h.tree.remove_command_class(setpoint);
    assert!(h.mapper.is_materialized(mode));
    assert!(h.registry.contains(&h.id("5-0-64")));
    assert!(h.registry.ids_with_prefix(&h.id("5-0-67")).is_empty());
}

#[test]
fn test_central_scene_gestures() {
    let key = CcKey::new(NODE, 0, cc::CENTRAL_SCENE);
    let options = MapperOptions {
        cosmetic_on_inclusion_only: false,
        central_scene_settle: Duration::ZERO,
        ..MapperOptions::default()
    };
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(
        &tree,
        key,
        &[
            ("currentScene", DataValue::Int(0)),
            ("keyAttribute", DataValue::Int(0)),
            ("maxScenes", DataValue::Int(3)),
        ],
    );
    let h = Harness::with_options(tree, options);
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview(["discreteState,0-91-DS,22,2,swipe_up"]))
        .unwrap();
    h.mapper.start();
    finish_interview(&h.tree, key);
    let id = h.id("5-0-91-DS");
    let metric = |name: &str| h.registry.metric(&id, name);

    h.tree.set(&DataPath::cc(key, "keyAttribute"), 2i64);
    h.tree.set(&DataPath::cc(key, "currentScene"), 1i64);
    assert_eq!(metric("level"), Some(MetricValue::from("12")));
    assert_eq!(metric("state"), Some(MetricValue::from("hold")));
    assert_eq!(metric("maxScenes"), Some(MetricValue::from(3)));

    h.tree.set(&DataPath::cc(key, "keyAttribute"), 4i64);
    h.tree.set(&DataPath::cc(key, "currentScene"), 3i64);
    assert_eq!(metric("level"), Some(MetricValue::from("34")));
    assert_eq!(metric("state"), Some(MetricValue::from("press")));
    assert_eq!(metric("cnt"), Some(MetricValue::from(3)));

    h.tree.set(&DataPath::cc(key, "keyAttribute"), 2i64);
    h.tree.set(&DataPath::cc(key, "currentScene"), 2i64);
    assert_eq!(metric("state"), Some(MetricValue::from("swipe_up")));
    assert_eq!(metric("cnt"), Some(MetricValue::from(2)));
}

#[test]
fn test_central_scene_drops_reports_while_settling() {
    let key = CcKey::new(NODE, 0, cc::CENTRAL_SCENE);
    let options = MapperOptions {
        central_scene_settle: Duration::from_secs(60),
        ..MapperOptions::default()
    };
    let h = mapped(
        key,
        &[("currentScene", DataValue::Int(0)), ("keyAttribute", DataValue::Int(0))],
        options,
    );
    h.tree.set(&DataPath::cc(key, "currentScene"), 1i64);
    assert_eq!(h.level("5-0-91-DS"), Some(MetricValue::from("")));
}

#[test]
fn test_config_parameters_map_both_ways() {
    let key = CcKey::new(NODE, 0, cc::CONFIGURATION);
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(
        &tree,
        key,
        &[
            ("7.val", DataValue::Int(5)),
            ("7.size", DataValue::Int(1)),
            ("9.val", DataValue::Int(1)),
            ("9.size", DataValue::Int(2)),
        ],
    );
    let h = Harness::new(tree);
    h.postfix
        .add(FixRecord::new(PRODUCT).with_post_interview([
            "configVDev,0,7,switchMultilevel,value * 10,Math.round(level / 10),Sensitivity",
            "configVDev,0,9,switchBinary,value == 1,command == 'on' ? 1 : 0",
        ]))
        .unwrap();
    h.mapper.start();
    finish_interview(&h.tree, key);

    let sensitivity = h.registry.get(&h.id("5-0-112-7")).unwrap();
    assert_eq!(sensitivity.title(), "Sensitivity (5)");
    assert_eq!(sensitivity.metric("level"), Some(&MetricValue::from(50)));
    h.tree.set(&DataPath::cc(key, "7.val"), 8i64);
    assert_eq!(h.level("5-0-112-7"), Some(MetricValue::from(80)));
    assert_eq!(h.level("5-0-112-9"), Some(MetricValue::from("on")));
    sent(&h);

    h.registry
        .dispatch_verb(&h.id("5-0-112-7"), Verb::Exact, &CommandArgs::new().with("level", 30))
        .unwrap();
    h.registry
        .dispatch(&h.id("5-0-112-9"), "off", &CommandArgs::new())
        .unwrap();
    assert_eq!(
        sent(&h),
        vec![
            (
                cc::CONFIGURATION,
                CcCommand::ConfigurationSet {
                    parameter: 7,
                    value: 3,
                    size: 1
                }
            ),
            (
                cc::CONFIGURATION,
                CcCommand::ConfigurationSet {
                    parameter: 9,
                    value: 0,
                    size: 2
                }
            ),
        ]
    );
}

#[test]
fn test_local_reset_is_announced() {
    let key = CcKey::new(NODE, 0, cc::DEVICE_RESET_LOCALLY);
    let h = mapped(key, &[("reset", DataValue::Bool(false))], MapperOptions::default());
    assert!(h.registry.ids_with_prefix(&h.id("5-0-90")).is_empty());
    assert!(h.notifier.messages().is_empty());

    h.tree.set(&DataPath::cc(key, "reset"), true);
    assert_eq!(
        h.notifier.messages(),
        vec!["Device 5 was reset locally and left the network".to_string()]
    );
}

#[test]
fn test_failing_class_is_reported_and_others_still_map() {
    let lock = CcKey::new(NODE, 0, cc::DOOR_LOCK);
    let switch = CcKey::new(NODE, 0, cc::SWITCH_BINARY);
    let tree = network();
    add_node(&tree, NODE, true);
    add_class(&tree, lock, &[]);
    add_class(&tree, switch, &[("level", DataValue::Bool(false))]);
    let h = Harness::new(tree);
    h.mapper.start();
    finish_interview(&h.tree, lock);
    finish_interview(&h.tree, switch);

    assert!(h
        .notifier
        .messages()
        .contains(&"5-0-98: Missing data: door lock mode".to_string()));
    assert!(!h.registry.contains(&h.id("5-0-98")));
    assert!(h.registry.contains(&h.id("5-0-37")));
}
