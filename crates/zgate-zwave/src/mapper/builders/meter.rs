//! Meter, MeterPulse and Battery.

use zgate_devices::{DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use super::sub;
use crate::error::Result;

/// Probe type of a meter scale by meter type (1 electric, 2 gas, 3 water).
fn meter_probe(meter_type: i64, scale: i64) -> &'static str {
    match (meter_type, scale) {
        (1, 0) => "meterElectric_kilowatt_hour",
        (1, 1) => "meterElectric_kilovolt_ampere_hour",
        (1, 2) => "meterElectric_watt",
        (1, 3) => "meterElectric_pulse_count",
        (1, 4) => "meterElectric_voltage",
        (1, 5) => "meterElectric_ampere",
        (1, 6) => "meterElectric_power_factor",
        (2, 0) => "meterGas_cubic_meters",
        (2, 1) => "meterGas_cubic_feet",
        (2, 3) => "meterGas_pulse_count",
        (3, 0) => "meterWater_cubic_meters",
        (3, 1) => "meterWater_cubic_feet",
        (3, 2) => "meterWater_us_gallons",
        (3, 3) => "meterWater_pulse_count",
        _ => "meter",
    }
}

pub(super) fn meter(ctx: &mut BuildContext<'_>) -> Result<()> {
    for scale in ctx.tree.numeric_children(&ctx.cc_path("")) {
        if !ctx.tree.exists(&ctx.cc_path(&sub(scale, "val"))) {
            continue;
        }
        meter_scale(ctx, scale)?;
    }
    ctx.watch_class();
    Ok(())
}

fn meter_scale(ctx: &mut BuildContext<'_>, scale: i64) -> Result<()> {
    let suffix = scale.to_string();
    let id = ctx.vdev_id(&suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let meter_type = ctx.tree.int(&ctx.cc_path(&sub(scale, "sensorType"))).unwrap_or(0);
    let kind = ctx.tree.string(&ctx.cc_path(&sub(scale, "sensorTypeString")));
    let scale_title = ctx
        .tree
        .string(&ctx.cc_path(&sub(scale, "scaleString")))
        .unwrap_or_default();
    let mut defaults = VDevDefaults::new(DeviceType::SensorMultilevel)
        .probe_type(meter_probe(meter_type, scale))
        .metric("icon", "meter")
        .metric("scaleTitle", scale_title)
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), "Meter", kind.as_deref()) {
        return Ok(());
    }

    let sender = ctx.sender();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::Update => sender.get(vec![scale]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    let contexts = ctx.contexts.clone();
    ctx.bind_value(ctx.cc_path(&sub(scale, "val")), move |kind, value| {
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

pub(super) fn pulse(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::SensorMultilevel)
        .probe_type("meter")
        .metric("icon", "meter")
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Meter Pulse", None) {
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

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("val"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", value.to_metric());
        }
    });
    Ok(())
}

pub(super) fn battery(ctx: &mut BuildContext<'_>) -> Result<()> {
    let id = ctx.namespace();
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::Battery)
        .probe_type("battery")
        .metric("icon", "battery")
        .metric("probeTitle", "Battery")
        .metric("scaleTitle", "%")
        .metric("level", 0);
    if !ctx.apply_postfix(&mut defaults, &ctx.change_key(), "Battery", None) {
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

    let registry = ctx.registry.clone();
    ctx.bind_value(ctx.cc_path("last"), move |kind, value| {
        if !kind.is_valid() {
            return;
        }
        // 255 is the low battery warning
        let level = match value.as_i64() {
            Some(255) => 0,
            Some(level) => level,
            None => return,
        };
        registry.set_metric(&id, "level", level);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_probe() {
        assert_eq!(meter_probe(1, 2), "meterElectric_watt");
        assert_eq!(meter_probe(2, 3), "meterGas_pulse_count");
        assert_eq!(meter_probe(3, 2), "meterWater_us_gallons");
        assert_eq!(meter_probe(2, 2), "meter");
    }
}
