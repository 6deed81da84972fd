//! SensorBinary, SensorMultilevel and AlarmSensor: one vDev per sensor type.

use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use super::{report_binary, sub};
use crate::error::Result;

fn binary_probe(sensor_type: i64) -> (&'static str, &'static str) {
    match sensor_type {
        2 => ("smoke", "smoke"),
        3 | 4 => ("co", "co"),
        6 => ("flood", "flood"),
        7 => ("cooling", "cooling"),
        8 => ("tamper", "tamper"),
        10 => ("door", "door-window"),
        12 => ("motion", "motion"),
        _ => ("general_purpose", "motion"),
    }
}

fn multilevel_icon(sensor_type: i64) -> &'static str {
    match sensor_type {
        1 => "temperature",
        3 => "luminosity",
        4 | 15 | 16 => "energy",
        5 => "humidity",
        9 => "barometer",
        12 => "rain",
        17 => "co2",
        25 => "seismic",
        27 => "ultraviolet",
        40 => "co",
        52 => "acceleration_x",
        53 => "acceleration_y",
        54 => "acceleration_z",
        _ => "",
    }
}

fn alarm_probe(alarm_type: i64) -> &'static str {
    match alarm_type {
        0 => "alarmSensor_general_purpose",
        1 => "alarmSensor_smoke",
        2 => "alarmSensor_co",
        3 => "alarmSensor_coo",
        4 => "alarmSensor_heat",
        5 => "alarmSensor_flood",
        6 => "alarmSensor_door",
        7 => "alarmSensor_burglar",
        8 => "alarmSensor_power",
        9 => "alarmSensor_system",
        10 => "alarmSensor_emergency",
        11 => "alarmSensor_clock",
        _ => "alarmSensor",
    }
}

pub(super) fn binary(ctx: &mut BuildContext<'_>) -> Result<()> {
    for sensor_type in ctx.tree.numeric_children(&ctx.cc_path("")) {
        if !ctx.tree.exists(&ctx.cc_path(&sub(sensor_type, "level"))) {
            continue;
        }
        binary_type(ctx, sensor_type)?;
    }
    ctx.watch_class();
    Ok(())
}

fn binary_type(ctx: &mut BuildContext<'_>, sensor_type: i64) -> Result<()> {
    let suffix = sensor_type.to_string();
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let (probe_type, icon) = binary_probe(sensor_type);
    let kind = ctx.tree.string(&ctx.cc_path(&sub(sensor_type, "sensorTypeString")));
    let mut defaults = VDevDefaults::new(DeviceType::SensorBinary)
        .probe_type(probe_type)
        .metric("icon", icon)
        .metric("level", "off");
    let change_key = ctx.sub_change_key(&suffix);
    if !ctx.apply_postfix(&mut defaults, &change_key, "Sensor", kind.as_deref()) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Update => sender.get(vec![sensor_type]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;
    if let Some(timeout) = ctx.change(&change_key).and_then(|c| c.emulate_off) {
        ctx.contexts.set_emulate_off(&id, timeout);
    }

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&sub(sensor_type, "level")), move |kind, value| {
        if kind.is_deleted() {
            BuildContext::remove(&registry, &contexts, &id);
            return;
        }
        if kind.is_valid() {
            report_binary(&registry, &contexts, &id, value.as_bool());
        }
    });
    Ok(())
}

pub(super) fn multilevel(ctx: &mut BuildContext<'_>) -> Result<()> {
    for sensor_type in ctx.tree.numeric_children(&ctx.cc_path("")) {
        if !ctx.tree.exists(&ctx.cc_path(&sub(sensor_type, "val"))) {
            continue;
        }
        multilevel_type(ctx, sensor_type)?;
    }
    ctx.watch_class();
    Ok(())
}

fn multilevel_type(ctx: &mut BuildContext<'_>, sensor_type: i64) -> Result<()> {
    let suffix = sensor_type.to_string();
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let icon = multilevel_icon(sensor_type);
    let kind = ctx.tree.string(&ctx.cc_path(&sub(sensor_type, "sensorTypeString")));
    let scale = ctx
        .tree
        .string(&ctx.cc_path(&sub(sensor_type, "scaleString")))
        .unwrap_or_default();
    let mut defaults = VDevDefaults::new(DeviceType::SensorMultilevel)
        .probe_type(icon)
        .metric("icon", icon)
        .metric("scaleTitle", scale)
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), "Sensor", kind.as_deref()) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Update => sender.get(vec![sensor_type]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&sub(sensor_type, "val")), move |kind, value| {
        if kind.is_deleted() {
            BuildContext::remove(&registry, &contexts, &id);
            return;
        }
        if kind.is_valid() {
            registry.set_metric(&id, "level", value.to_metric());
        }
    });
    Ok(())
}

pub(super) fn alarm(ctx: &mut BuildContext<'_>) -> Result<()> {
    for alarm_type in ctx.tree.numeric_children(&ctx.cc_path("")) {
        if !ctx.tree.exists(&ctx.cc_path(&sub(alarm_type, "sensorState"))) {
            continue;
        }
        alarm_type_vdev(ctx, alarm_type)?;
    }
    ctx.watch_class();
    Ok(())
}

fn alarm_type_vdev(ctx: &mut BuildContext<'_>, alarm_type: i64) -> Result<()> {
    let suffix = format!("{}-A", alarm_type);
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let kind = ctx.tree.string(&ctx.cc_path(&sub(alarm_type, "typeString")));
    let mut defaults = VDevDefaults::new(DeviceType::SensorBinary)
        .probe_type(alarm_probe(alarm_type))
        .metric("icon", "alarm")
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), "Alarm", kind.as_deref()) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Update => sender.get(vec![alarm_type]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&sub(alarm_type, "sensorState")), move |kind, value| {
        if kind.is_deleted() {
            BuildContext::remove(&registry, &contexts, &id);
            return;
        }
        if kind.is_valid() {
            report_binary(&registry, &contexts, &id, value.as_bool());
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_tables() {
        assert_eq!(binary_probe(10), ("door", "door-window"));
        assert_eq!(binary_probe(99), ("general_purpose", "motion"));
        assert_eq!(multilevel_icon(1), "temperature");
        assert_eq!(multilevel_icon(16), "energy");
        assert_eq!(alarm_probe(5), "alarmSensor_flood");
    }
}
