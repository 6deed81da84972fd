//! Notification (Alarm v3+): a vDev per notification event, with special
//! cases for door/window (including tilt) and AC power.

use std::sync::Arc;

use zgate_devices::{CommandHandler, DeviceType, NoopHandler, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use super::{on_off, report_binary, sub};
use crate::error::Result;

const ACCESS_CONTROL: i64 = 0x06;
const DOOR_OPEN: i64 = 0x16;
const DOOR_CLOSED: i64 = 0x17;
const POWER: i64 = 0x08;
const AC_DISCONNECTED: i64 = 0x02;
const AC_RECONNECTED: i64 = 0x03;

/// `(probeType, icon)` of a notification type; `None` for unmapped types.
fn notification_probe(notification: i64, event: i64) -> Option<(&'static str, &'static str)> {
    Some(match notification {
        0x01 => ("alarm_smoke", "smoke"),
        0x02 => ("alarm_co", "co"),
        0x03 => ("alarm_coo", "co"),
        0x04 => ("alarm_heat", "alarm"),
        0x05 => ("alarm_flood", "flood"),
        0x06 => ("alarm_door", "door"),
        0x07 if event == 7 || event == 8 => ("alarm_burglar", "motion"),
        0x07 => ("alarm_burglar", "alarm"),
        0x08 => ("alarm_power", "alarm"),
        0x09 => ("alarm_system", "alarm"),
        0x0a => ("alarm_emergency", "alarm"),
        0x0b => ("alarm_clock", "alarm"),
        0x0c => ("general_purpose", "alarm"),
        0x0e => ("siren", "siren"),
        0x0f => ("general_purpose", "valve"),
        0x12 => ("gas", "gas"),
        _ => return None,
    })
}

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    if ctx.tree.int(&ctx.cc_path("version")).unwrap_or(1) < 3 {
        return Ok(());
    }

    for notification in ctx.tree.numeric_children(&ctx.cc_path("")) {
        if notification_probe(notification, 0).is_none() {
            continue;
        }
        let events = ctx
            .tree
            .numeric_children(&ctx.cc_path(&notification.to_string()));
        for event in events {
            match (notification, event) {
                (ACCESS_CONTROL, DOOR_OPEN) => door(ctx)?,
                (ACCESS_CONTROL, DOOR_CLOSED) | (POWER, AC_RECONNECTED) => {}
                (POWER, AC_DISCONNECTED) => ac_power(ctx)?,
                _ => event_vdev(ctx, notification, event)?,
            }
        }
        let enabled_key = ctx.sub_change_key(&notification.to_string());
        if ctx.change(&enabled_key).is_some_and(|c| c.notification_status) {
            enabled(ctx, notification)?;
        }
    }
    ctx.watch_class();
    Ok(())
}

fn event_path(notification: i64, event: i64, field: &str) -> String {
    format!("{}.{}.{}", notification, event, field)
}

fn event_vdev(ctx: &mut BuildContext<'_>, notification: i64, event: i64) -> Result<()> {
    let status = event_path(notification, event, "status");
    if !ctx.tree.exists(&ctx.cc_path(&status)) {
        return Ok(());
    }
    let suffix = format!("{}-{}-A", notification, event);
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let Some((probe_type, icon)) = notification_probe(notification, event) else {
        return Ok(());
    };
    let is_state = ctx
        .tree
        .value(&ctx.cc_path(&event_path(notification, event, "isState")))
        .filter(|v| !v.is_empty())
        .map(|v| v.as_bool())
        .unwrap_or(true);
    let title = ctx
        .tree
        .string(&ctx.cc_path(&sub(notification, "typeString")))
        .unwrap_or_else(|| "Alarm".to_string());
    let kind = ctx
        .tree
        .string(&ctx.cc_path(&event_path(notification, event, "eventString")));

    let device_type = if is_state {
        DeviceType::SensorBinary
    } else {
        DeviceType::ToggleButton
    };
    let mut defaults = VDevDefaults::new(device_type)
        .probe_type(probe_type)
        .metric("icon", icon)
        .metric("level", if is_state { "off" } else { "on" })
        .visible(is_state);
    let change_key = ctx.sub_change_key(&suffix);
    if !ctx.apply_postfix(&mut defaults, &change_key, &title, kind.as_deref()) {
        return Ok(());
    }

    ctx.create(&id, defaults, Arc::new(NoopHandler))?;
    if is_state {
        if let Some(timeout) = ctx.change(&change_key).and_then(|c| c.emulate_off) {
            ctx.contexts.set_emulate_off(&id, timeout);
        }
    }

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&status), move |kind, value| {
        if kind.is_deleted() {
            BuildContext::remove(&registry, &contexts, &id);
            return;
        }
        if !kind.is_valid() {
            return;
        }
        if is_state {
            report_binary(&registry, &contexts, &id, value.as_bool());
        } else if value.as_bool() {
            registry.set_metric(&id, "level", "on");
        }
    });
    Ok(())
}

fn door(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.vdev_id("6-Door-A");
    if ctx.exists(&id) {
        return Ok(());
    }
    let change_key = ctx.sub_change_key(&ACCESS_CONTROL.to_string());

    let mut defaults = VDevDefaults::new(DeviceType::SensorBinary)
        .probe_type("door")
        .metric("icon", "door")
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &change_key, "Door", None) {
        return Ok(());
    }
    ctx.create(&id, defaults, Arc::new(NoopHandler))?;

    let tilt_id = ctx.vdev_id("6-Tilt-A");
    let mut tilt_defaults = VDevDefaults::new(DeviceType::SensorBinary)
        .probe_type("tilt")
        .metric("icon", "door")
        .metric("level", "off");
    let tilt_enabled = ctx.apply_postfix(&mut tilt_defaults, &ctx.sub_change_key("6-Tilt-A"), "Tilt", None);
    let tilt_handler: Arc<dyn CommandHandler> = Arc::new(NoopHandler);
    let wants_tilt = ctx.registry.was_created(&tilt_id)
        || ctx.change(&change_key).is_some_and(|c| c.tilt);
    if tilt_enabled && wants_tilt && !ctx.exists(&tilt_id) {
        ctx.create(&tilt_id, tilt_defaults.clone(), tilt_handler.clone())?;
    }

    let registry = ctx.registry.clone();
    let tree = Arc::downgrade(ctx.tree);
    let parameters = ctx.cc_path(&event_path(ACCESS_CONTROL, DOOR_OPEN, "parameters"));
    let is_failed = ctx.tree.flag(&ctx.node_path("isFailed"));
    ctx.bind_value(
        ctx.cc_path(&event_path(ACCESS_CONTROL, DOOR_OPEN, "status")),
        move |kind, value| {
            if !kind.is_valid() {
                return;
            }
            let open = value.as_bool();
            let tilted = open
                && tree
                    .upgrade()
                    .and_then(|t| t.value(&parameters))
                    .and_then(|p| p.as_int_array().and_then(|a| a.first().copied()))
                    == Some(1);

            if tilted && tilt_enabled && !registry.contains(&tilt_id) {
                if let Err(e) = registry.create(&tilt_id, tilt_defaults.clone(), tilt_handler.clone()) {
                    tracing::warn!("Cannot create tilt sensor {}: {}", tilt_id, e);
                } else {
                    registry.set_metric(&tilt_id, "isFailed", is_failed);
                }
            }
            if registry.contains(&tilt_id) {
                registry.set_metric(&tilt_id, "level", on_off(tilted));
            }
            registry.set_metric(&id, "level", on_off(open && !tilted));
        },
    );
    Ok(())
}

fn ac_power(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.vdev_id("8-AC-A");
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::SensorBinary)
        .probe_type("alarm_power")
        .metric("icon", "alarm")
        .metric("level", "off");
    let change_key = ctx.sub_change_key(&POWER.to_string());
    if !ctx.apply_postfix(&mut defaults, &change_key, "AC Power", None) {
        return Ok(());
    }
    ctx.create(&id, defaults, Arc::new(NoopHandler))?;

    let registry = ctx.registry.clone();
    ctx.bind_value(
        ctx.cc_path(&event_path(POWER, AC_DISCONNECTED, "status")),
        move |kind, value| {
            if kind.is_valid() {
                registry.set_metric(&id, "level", on_off(value.as_bool()));
            }
        },
    );
    Ok(())
}

fn enabled(ctx: &mut BuildContext<'_>, notification: i64) -> Result<()> {
    let suffix = format!("{}-Enabled", notification);
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let type_name = ctx
        .tree
        .string(&ctx.cc_path(&sub(notification, "typeString")))
        .unwrap_or_else(|| format!("Notification {}", notification));
    let mut defaults = VDevDefaults::new(DeviceType::SwitchBinary)
        .probe_type("notification_status")
        .metric("icon", "switch")
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), &type_name, Some("Enabled")) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::On => sender.set(vec![notification, 1]),
            Verb::Off => sender.set(vec![notification, 0]),
            Verb::Update => sender.get(vec![notification, 0]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path(&sub(notification, "status")), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", on_off(value.as_bool()));
        }
    });
    Ok(())
}
