//! SoundSwitch: one toggle button per tone and a volume dimmer.

use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, metric_level, multilevel_action, unsupported, LevelAction};
use super::sub;
use crate::engine::CcCommand;
use crate::error::Result;

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    build_tone(ctx, 0, "Mute".to_string())?;

    let tones = ctx.tree.int(&ctx.cc_path("tonesNumber")).unwrap_or(0);
    for tone in 1..=tones {
        let Some(name) = ctx.tree.string(&ctx.cc_path(&sub(tone, "toneName"))) else {
            continue;
        };
        build_tone(ctx, tone, name)?;
    }

    build_volume(ctx)
}

fn build_tone(ctx: &mut BuildContext<'_>, tone: i64, name: String) -> Result<()> {
    let suffix = tone.to_string();
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::ToggleButton)
        .probe_type("tone")
        .metric("icon", "scene")
        .metric("level", "on");
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), &name, None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::On => sender.send(CcCommand::TonePlay(tone)),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )
}

fn build_volume(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::SwitchMultilevel)
        .probe_type("volume")
        .metric("icon", "multilevel")
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Volume", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, args| {
            let current = metric_level(hc.metric("level").as_ref());
            match multilevel_action(verb, current, args) {
                Some(LevelAction::Set(volume) | LevelAction::SetSmooth { level: volume, .. }) => {
                    sender.send(CcCommand::SoundConfigurationSet {
                        tone: 0,
                        volume: volume.min(100),
                    })
                }
                Some(LevelAction::Update) => sender.send(CcCommand::SoundConfigurationGet),
                Some(LevelAction::Ignore) => Ok(()),
                _ => Err(unsupported(hc.device_id, verb)),
            }
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("defaultVolume"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", value.to_metric());
        }
    });
    Ok(())
}
