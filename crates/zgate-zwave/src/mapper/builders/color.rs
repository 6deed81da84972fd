//! SwitchColor: one RGB vDev plus a dimmer per remaining channel.

use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{
    color_channel_action, color_to_level, handler, metric_level, unsupported, LevelAction,
};
use super::sub;
use crate::engine::CcCommand;
use crate::error::Result;
use crate::tree::{DataPath, DataTree};
use crate::types::CcKey;

const RED: i64 = 2;
const GREEN: i64 = 3;
const BLUE: i64 = 4;

fn channel_probe(color: i64) -> &'static str {
    match color {
        0 => "switchColor_soft_white",
        1 => "switchColor_cold_white",
        RED => "switchColor_red",
        GREEN => "switchColor_green",
        BLUE => "switchColor_blue",
        _ => "switchColor",
    }
}

fn rgb_object(r: i64, g: i64, b: i64) -> MetricValue {
    MetricValue::object([("r", r), ("g", g), ("b", b)])
}

fn rgb_of(value: Option<&MetricValue>) -> Option<(i64, i64, i64)> {
    let object = value?.as_object()?;
    let channel = |name: &str| object.get(name).and_then(MetricValue::as_i64);
    Some((channel("r")?, channel("g")?, channel("b")?))
}

fn channel_value(tree: &DataTree, key: CcKey, color: i64) -> i64 {
    tree.int(&DataPath::cc(key, &sub(color, "level"))).unwrap_or(0)
}

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    let colors = ctx.tree.numeric_children(&ctx.cc_path(""));
    let has_rgb = [RED, GREEN, BLUE].iter().all(|c| colors.contains(c));

    if has_rgb {
        // channels reported one at a time were built as dimmers first
        for color in [RED, GREEN, BLUE] {
            let id = ctx.vdev_id(&color.to_string());
            if ctx.exists(&id) {
                BuildContext::remove(ctx.registry, ctx.contexts, &id);
            }
        }
        build_rgb(ctx)?;
    }
    for color in colors {
        if has_rgb && (RED..=BLUE).contains(&color) {
            continue;
        }
        build_channel(ctx, color)?;
    }
    ctx.watch_class();
    Ok(())
}

fn build_rgb(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.vdev_id("rgb");
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::SwitchRgbw)
        .probe_type("switchColor_rgb")
        .metric("icon", "multilevel")
        .metric("color", rgb_object(0, 0, 0))
        .metric("oldColor", MetricValue::object(Vec::<(String, MetricValue)>::new()))
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key("rgb"), "Color", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, args| {
            let (r, g, b) = match verb {
                Verb::On => rgb_of(hc.metric("oldColor").as_ref()).unwrap_or((255, 255, 255)),
                Verb::Off => (0, 0, 0),
                Verb::Exact => {
                    let rgb = exact_rgb(args).ok_or_else(|| {
                        zgate_devices::DeviceError::InvalidArgument(
                            "red, green and blue are required".to_string(),
                        )
                    })?;
                    hc.set_metric("oldColor", rgb_object(rgb.0, rgb.1, rgb.2));
                    rgb
                }
                other => return Err(unsupported(hc.device_id, other)),
            };
            sender.send(CcCommand::SetMultiple {
                keys: vec![RED, GREEN, BLUE],
                values: vec![r, g, b],
            })
        }),
    )?;

    for color in [RED, GREEN, BLUE] {
        let registry = ctx.registry.clone();
        let tree = std::sync::Arc::downgrade(ctx.tree);
        let key = ctx.key;
        let id = id.clone();
        ctx.bind_value(ctx.cc_path(&sub(color, "level")), move |kind, _value| {
            if !kind.is_valid() {
                return;
            }
            let Some(tree) = tree.upgrade() else {
                return;
            };
            let (r, g, b) = (
                channel_value(&tree, key, RED),
                channel_value(&tree, key, GREEN),
                channel_value(&tree, key, BLUE),
            );
            registry.set_metric(&id, "color", rgb_object(r, g, b));
            registry.set_metric(&id, "level", super::on_off(r > 0 || g > 0 || b > 0));
        });
    }
    Ok(())
}

fn exact_rgb(args: &CommandArgs) -> Option<(i64, i64, i64)> {
    let channel = |name: &str| args.int(name).map(|v| v.clamp(0, 255));
    Some((channel("red")?, channel("green")?, channel("blue")?))
}

fn build_channel(ctx: &mut BuildContext<'_>, color: i64) -> Result<()> {
    let suffix = color.to_string();
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let title = ctx
        .tree
        .string(&ctx.cc_path(&sub(color, "capabilityString")))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Color {}", color));
    let mut defaults = VDevDefaults::new(DeviceType::SwitchMultilevel)
        .probe_type(channel_probe(color))
        .metric("icon", "multilevel")
        .metric("level", 0)
        .metric("oldLevel", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), &title, None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, args| {
            let level = metric_level(hc.metric("level").as_ref());
            let old_level = metric_level(hc.metric("oldLevel").as_ref());
            match color_channel_action(verb, level, old_level, args) {
                Some(LevelAction::Set(value)) => sender.set(vec![color, value]),
                Some(LevelAction::SetSmooth { level, duration }) => {
                    sender.send(CcCommand::SetWithDuration {
                        args: vec![color, level],
                        duration,
                    })
                }
                Some(LevelAction::Update) => sender.get(vec![color]),
                Some(_) => Ok(()),
                None => Err(unsupported(hc.device_id, verb)),
            }
        }),
    )?;

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&sub(color, "level")), move |kind, value| {
        if kind.is_deleted() {
            BuildContext::remove(&registry, &contexts, &id);
            return;
        }
        if !kind.is_valid() {
            return;
        }
        let raw = value.as_i64().unwrap_or(0);
        let level = color_to_level(raw);
        registry.set_metric(&id, "level", level);
        if raw > 0 {
            registry.set_metric(&id, "oldLevel", level);
        }
    });
    Ok(())
}
