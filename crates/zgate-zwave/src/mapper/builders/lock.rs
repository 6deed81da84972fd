//! DoorLock and BarrierOperator.

use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use crate::error::{Result, ZWaveError};

fn open_close(open: bool) -> &'static str {
    if open {
        "open"
    } else {
        "close"
    }
}

pub(super) fn door_lock(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }
    if !ctx.tree.exists(&ctx.cc_path("mode")) {
        return Err(ZWaveError::MissingData("door lock mode".to_string()));
    }

    let mut defaults = VDevDefaults::new(DeviceType::Doorlock)
        .probe_type("door_lock")
        .metric("icon", "door")
        .metric("level", "open");
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Door Lock", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Open => sender.set(vec![0]),
            Verb::Close => sender.set(vec![255]),
            Verb::Update => sender.get(vec![]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("mode"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", open_close(value.as_i64() != Some(255)));
        }
    });
    Ok(())
}

pub(super) fn barrier(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::Doorlock)
        .probe_type("barrier")
        .metric("icon", "door")
        .metric("level", "close");
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Garage Door", None) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Open => sender.set(vec![255]),
            Verb::Close => sender.set(vec![0]),
            Verb::Update => sender.get(vec![]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("state"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", open_close(value.as_i64() == Some(255)));
        }
    });
    Ok(())
}
