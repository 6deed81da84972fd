//! SwitchBinary and SwitchMultilevel.

use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, metric_level, multilevel_action, unsupported, CcSender, LevelAction};
use super::on_off;
use crate::engine::CcCommand;
use crate::error::Result;

pub(super) fn binary(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let (probe_type, icon) = match ctx.tree.int(&ctx.node_path("specificType")) {
        Some(1) => ("power_switch_binary", "switch"),
        Some(3) => ("scene_switch_binary", "switch"),
        Some(4) => ("power_strip", "switch"),
        Some(5) => ("siren", "siren"),
        Some(6) => ("valve", "valve"),
        _ => ("switch", "switch"),
    };
    let mut defaults = VDevDefaults::new(DeviceType::SwitchBinary)
        .probe_type(probe_type)
        .metric("icon", icon)
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Switch", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::On => sender.set(vec![255]),
            Verb::Off => sender.set(vec![0]),
            Verb::Update => sender.get(vec![]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("level"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", on_off(value.as_bool()));
        }
    });
    Ok(())
}

pub(super) fn multilevel(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let generic = ctx.tree.int(&ctx.node_path("genericType"));
    let specific = ctx.tree.int(&ctx.node_path("specificType"));
    let (icon, probe_type, title) = match (generic, specific) {
        (Some(0x11), Some(3 | 5 | 6 | 7)) => ("blinds", "motor", "Blind"),
        (Some(0x11), Some(8)) => ("fan", "multilevel", "Fan"),
        _ => ("multilevel", "multilevel", "Dimmer"),
    };
    let mut defaults = VDevDefaults::new(DeviceType::SwitchMultilevel)
        .probe_type(probe_type)
        .metric("icon", icon)
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), title, None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, args| {
            let current = metric_level(hc.metric("level").as_ref());
            match multilevel_action(verb, current, args) {
                Some(action) => send_level(&sender, action),
                None => Err(unsupported(hc.device_id, verb)),
            }
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("level"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", value.to_metric());
        }
    });
    Ok(())
}

/// Send a multilevel action as SwitchMultilevel requests.
pub(super) fn send_level(sender: &CcSender, action: LevelAction) -> zgate_devices::Result<()> {
    match action {
        LevelAction::Set(level) => sender.set(vec![level]),
        LevelAction::SetSmooth { level, duration } => sender.send(CcCommand::SetWithDuration {
            args: vec![level],
            duration,
        }),
        LevelAction::Stop => sender.send(CcCommand::StopLevelChange),
        LevelAction::StartUp => sender.send(CcCommand::StartLevelChange { down: false }),
        LevelAction::StartDown => sender.send(CcCommand::StartLevelChange { down: true }),
        LevelAction::Update => sender.get(vec![]),
        LevelAction::Ignore => Ok(()),
    }
}
