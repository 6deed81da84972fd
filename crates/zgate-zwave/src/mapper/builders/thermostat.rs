//! ThermostatMode and ThermostatSetPoint, built together under the mode
//! class key.
//!
//! The mode vDev switches between off and the last used heating or cooling
//! mode; each heat/cool setpoint gets its own thermostat vDev.

use std::sync::Arc;

use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, DeviceError, DeviceType, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, unsupported};
use super::{on_off, sub};
use crate::engine::CcCommand;
use crate::error::Result;
use crate::tree::{DataPath, DataTree};
use crate::types::{cc, CcKey};

const MODE_OFF: i64 = 0;
const MODE_HEAT: i64 = 1;
const MODE_COOL: i64 = 2;

fn interviewed(tree: &DataTree, key: CcKey) -> bool {
    tree.flag(&DataPath::cc(key, "interviewDone"))
}

/// Whether both classes of the pair are ready to be mapped. An absent
/// class does not block the other.
pub(in crate::mapper) fn ready(tree: &DataTree, key: CcKey) -> bool {
    let mode_key = key.with_cc(cc::THERMOSTAT_MODE);
    let setpoint_key = key.with_cc(cc::THERMOSTAT_SET_POINT);
    let present: Vec<CcKey> = [mode_key, setpoint_key]
        .into_iter()
        .filter(|k| tree.has_command_class(*k))
        .collect();
    !present.is_empty() && present.iter().all(|k| interviewed(tree, *k))
}

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    if !ready(ctx.tree, ctx.key) {
        return Ok(());
    }
    let mode_key = ctx.key.with_cc(cc::THERMOSTAT_MODE);
    let setpoint_key = ctx.key.with_cc(cc::THERMOSTAT_SET_POINT);

    let modes = if ctx.tree.has_command_class(mode_key) {
        ctx.tree.numeric_children(&DataPath::cc(mode_key, ""))
    } else {
        Vec::new()
    };
    let setpoints: Vec<i64> = if ctx.tree.has_command_class(setpoint_key) {
        [MODE_HEAT, MODE_COOL]
            .into_iter()
            .filter(|m| ctx.tree.exists(&DataPath::cc(setpoint_key, &m.to_string())))
            .collect()
    } else {
        Vec::new()
    };

    if modes.contains(&MODE_OFF) && (modes.contains(&MODE_HEAT) || modes.contains(&MODE_COOL)) {
        build_mode(ctx, mode_key, setpoint_key, &modes)?;
    }
    for mode in setpoints {
        build_setpoint(ctx, mode_key, setpoint_key, mode, modes.contains(&mode))?;
    }
    Ok(())
}

/// Heating or cooling, whichever setpoint was touched last.
fn last_used_mode(tree: &DataTree, setpoint_key: CcKey, modes: &[i64]) -> i64 {
    let touched = |mode: i64| {
        tree.get(&DataPath::cc(setpoint_key, &sub(mode, "setVal")))
            .map(|s| s.update_time)
            .unwrap_or(0)
    };
    match (modes.contains(&MODE_HEAT), modes.contains(&MODE_COOL)) {
        (true, true) if touched(MODE_COOL) > touched(MODE_HEAT) => MODE_COOL,
        (true, _) => MODE_HEAT,
        _ => MODE_COOL,
    }
}

fn build_mode(
    ctx: &mut BuildContext<'_>,
    mode_key: CcKey,
    setpoint_key: CcKey,
    modes: &[i64],
) -> Result<()> {
    let id = ctx.sibling_namespace(cc::THERMOSTAT_MODE);
    if ctx.exists(&id) {
        return Ok(());
    }

    let mut defaults = VDevDefaults::new(DeviceType::SwitchBinary)
        .probe_type("thermostat_mode")
        .metric("icon", "thermostat")
        .metric("level", "off");
    if !ctx.apply_postfix(&mut defaults, &mode_key.to_string(), "Thermostat operation", None) {
        return Ok(());
    }

    let sender = ctx.sender().to(cc::THERMOSTAT_MODE);
    let tree = Arc::downgrade(ctx.tree);
    let modes = modes.to_vec();
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, _args| match verb {
            Verb::On => {
                let Some(tree) = tree.upgrade() else {
                    return Ok(());
                };
                sender.set(vec![last_used_mode(&tree, setpoint_key, &modes)])
            }
            Verb::Off => sender.set(vec![MODE_OFF]),
            Verb::Update => sender.get(vec![]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(DataPath::cc(mode_key, "mode"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", on_off(value.as_i64().unwrap_or(0) != MODE_OFF));
        }
    });
    Ok(())
}

fn requested_temperature(args: &CommandArgs) -> Option<f64> {
    match args.get("level")? {
        MetricValue::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn build_setpoint(
    ctx: &mut BuildContext<'_>,
    mode_key: CcKey,
    setpoint_key: CcKey,
    mode: i64,
    mode_supported: bool,
) -> Result<()> {
    let suffix = mode.to_string();
    let id = format!("{}-{}", ctx.sibling_namespace(cc::THERMOSTAT_SET_POINT), suffix);
    if ctx.exists(&id) {
        return Ok(());
    }

    let path = |p: &str| DataPath::cc(setpoint_key, &sub(mode, p));
    let scale = ctx.tree.int(&path("scale")).unwrap_or(0);
    let (min, max) = if scale == 0 { (5, 40) } else { (41, 104) };
    let title = if mode == MODE_HEAT {
        "Thermostat Heat"
    } else {
        "Thermostat Cool"
    };
    let mut defaults = VDevDefaults::new(DeviceType::Thermostat)
        .probe_type("thermostat_set_point")
        .metric("icon", "thermostat")
        .metric("scaleTitle", ctx.tree.string(&path("scaleString")).unwrap_or_default())
        .metric("min", ctx.tree.int(&path("min")).unwrap_or(min))
        .metric("max", ctx.tree.int(&path("max")).unwrap_or(max))
        .metric("level", 0);
    let change_key = format!("{}-{}", setpoint_key, suffix);
    if !ctx.apply_postfix(&mut defaults, &change_key, title, None) {
        return Ok(());
    }

    let setpoint = ctx.sender().to(cc::THERMOSTAT_SET_POINT);
    let mode_sender = ctx.sender().to(mode_key.cc);
    ctx.create(
        &id,
        defaults,
        handler(move |hc, verb, args| match verb {
            Verb::Exact => {
                let value = requested_temperature(args).ok_or_else(|| {
                    DeviceError::InvalidArgument("level must be a number".to_string())
                })?;
                setpoint.send(CcCommand::SetPointSet { mode, value })?;
                if mode_supported {
                    mode_sender.set(vec![mode])?;
                }
                Ok(())
            }
            Verb::Update => setpoint.get(vec![mode]),
            other => Err(unsupported(hc.device_id, other)),
        }),
    )?;

    let registry = ctx.registry.clone();
    ctx.bind_value(path("setVal"), move |kind, value| {
        if kind.is_valid() {
            registry.set_metric(&id, "level", value.to_metric());
        }
    });
    Ok(())
}
