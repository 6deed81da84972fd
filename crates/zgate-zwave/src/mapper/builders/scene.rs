//! CentralScene: one discrete sensor reporting scene and key gesture.

use std::sync::Arc;

use zgate_core::MetricValue;
use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use crate::error::Result;
use crate::tree::DataPath;

/// Gesture derived from a scene report.
#[derive(Debug, Clone, PartialEq)]
struct Gesture {
    level: String,
    cnt: MetricValue,
    action: String,
    kind: String,
}

/// Resolve `(scene, keyAttribute)` against the postfix discrete states.
/// Key attribute 0 is a press, 1 a release, 2 a hold and `n > 2` a press
/// repeated `n - 1` times.
fn gesture(scene: i64, key_attribute: i64, states: Option<&MetricValue>) -> Gesture {
    let level = format!("{}{}", scene, key_attribute);
    let state = states
        .and_then(MetricValue::as_object)
        .and_then(|s| s.get(&level))
        .and_then(MetricValue::as_object);
    let field = |name: &str| {
        state
            .and_then(|s| s.get(name))
            .and_then(MetricValue::as_str)
            .filter(|s| !s.is_empty())
    };

    let cnt = match field("cnt") {
        Some(cnt) => cnt
            .parse::<i64>()
            .map(MetricValue::from)
            .unwrap_or_else(|_| MetricValue::from(cnt)),
        None if key_attribute > 2 => MetricValue::from(key_attribute - 1),
        None => MetricValue::from(1),
    };
    let action = match field("action") {
        Some(action) => action.to_string(),
        None => match key_attribute {
            1 => "release",
            2 => "hold",
            _ => "press",
        }
        .to_string(),
    };
    Gesture {
        level,
        cnt,
        action,
        kind: field("type").unwrap_or("B").to_string(),
    }
}

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.vdev_id("DS");
    if ctx.exists(&id) {
        return Ok(());
    }

    // an empty discreteStates object lets postfix states be applied
    let mut defaults = VDevDefaults::new(DeviceType::SensorDiscrete)
        .probe_type("control")
        .metric("probeTitle", "Control")
        .metric("icon", "gesture")
        .metric("level", "")
        .metric("state", "")
        .metric("currentScene", "")
        .metric(
            "discreteStates",
            MetricValue::object(Vec::<(String, MetricValue)>::new()),
        );
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key("DS"), "Scene Control", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Update => sender.get(vec![]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;
    // stale scene reports replayed right after inclusion are dropped
    ctx.contexts.start_settle(&id, ctx.settle);

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    let tree = Arc::downgrade(ctx.tree);
    let key = ctx.key;
    ctx.bind_value(ctx.cc_path("currentScene"), move |kind, value| {
        if !kind.is_valid() || contexts.settling(&id) {
            return;
        }
        let Some(tree) = tree.upgrade() else {
            return;
        };
        let Some(scene) = value.as_i64() else {
            return;
        };
        let key_attribute = tree.int(&DataPath::cc(key, "keyAttribute")).unwrap_or(0);
        let max_scenes = tree.int(&DataPath::cc(key, "maxScenes")).unwrap_or(0);
        let g = gesture(scene, key_attribute, registry.metric(&id, "discreteStates").as_ref());

        registry.set_metrics(
            &id,
            [
                ("state", MetricValue::from(g.action)),
                ("currentScene", MetricValue::from(scene)),
                ("keyAttribute", MetricValue::from(key_attribute)),
                ("maxScenes", MetricValue::from(max_scenes)),
                ("cnt", g.cnt),
                ("type", MetricValue::from(g.kind)),
                ("level", MetricValue::from(g.level)),
            ],
        );
    });
    Ok(())
}
