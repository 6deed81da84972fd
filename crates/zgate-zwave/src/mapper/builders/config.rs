//! Configuration: parameters exposed as switches by `configVDev` fixes.

use std::sync::Arc;

use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, DeviceError, DeviceType, HandlerContext, VDevDefaults, Verb};

use super::super::context::BuildContext;
use super::super::handlers::{handler, metric_level, CcSender};
use super::{on_off, sub};
use crate::engine::CcCommand;
use crate::error::Result;
use crate::postfix::{ConfigVDev, ExprValue, Vars};
use crate::tree::{DataPath, DataTree};
use crate::types::CcKey;

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    let configs: Vec<(i64, ConfigVDev)> = ctx
        .change(&ctx.change_key())
        .map(|c| c.config_vdevs.iter().map(|(p, c)| (*p, c.clone())).collect())
        .unwrap_or_default();
    if configs.is_empty() {
        return Ok(());
    }

    for (parameter, config) in configs {
        parameter_vdev(ctx, parameter, config)?;
    }
    ctx.watch_class();
    Ok(())
}

fn parameter_vdev(ctx: &mut BuildContext<'_>, parameter: i64, config: ConfigVDev) -> Result<()> {
    let suffix = parameter.to_string();
    let id = ctx.vdev_id(&suffix);
    let config = Arc::new(config);

    if !ctx.exists(&id) {
        let mut defaults = VDevDefaults::new(config.device_type)
            .probe_type(if config.device_type.is_binary() {
                "switch"
            } else {
                "multilevel"
            })
            .metric("icon", if config.device_type.is_binary() { "switch" } else { "multilevel" })
            .metric(
                "level",
                if config.device_type.is_binary() {
                    MetricValue::from("off")
                } else {
                    MetricValue::from(0)
                },
            );
        if !ctx.apply_postfix(&mut defaults, &ctx.sub_change_key(&suffix), &config.title, None) {
            return Ok(());
        }

        let sender = ctx.sender();
        let tree = Arc::downgrade(ctx.tree);
        let handler_config = config.clone();
        let key = ctx.key;
        ctx.create(
            &id,
            defaults,
            handler(move |hc, verb, args| {
                let Some(tree) = tree.upgrade() else {
                    return Ok(());
                };
                set_parameter(&tree, key, &sender, &handler_config, parameter, hc, verb, args)
            }),
        )?;

        if !ctx.tree.exists(&ctx.cc_path(&sub(parameter, "size"))) {
            if let Err(e) = ctx.sender().get(vec![parameter]) {
                tracing::debug!("Cannot request parameter {} of {}: {}", parameter, ctx.key, e);
            }
        }
    }

    if ctx.contexts.is_bound(&id) {
        return Ok(());
    }
    let registry = ctx.registry.clone();
    let vdev = id.clone();
    let bound = ctx.bind_value(ctx.cc_path(&sub(parameter, "val")), move |kind, value| {
        if !kind.is_valid() {
            return;
        }
        let value = value.as_f64().unwrap_or(0.0);
        match config.p2v.eval(&Vars::new().with("value", value)) {
            Ok(level) => {
                let metric = if config.device_type.is_binary() {
                    MetricValue::from(on_off(level.truthy()))
                } else {
                    MetricValue::from(level.as_f64().map(|l| l.round() as i64).unwrap_or(0))
                };
                registry.set_metric(&vdev, "level", metric);
            }
            Err(e) => tracing::warn!("{}: cannot map parameter value {}: {}", vdev, value, e),
        }
    });
    if bound {
        ctx.contexts.mark_bound(&id);
    }
    Ok(())
}

fn set_parameter(
    tree: &DataTree,
    key: CcKey,
    sender: &CcSender,
    config: &ConfigVDev,
    parameter: i64,
    hc: &HandlerContext<'_>,
    verb: Verb,
    args: &CommandArgs,
) -> zgate_devices::Result<()> {
    let size = tree.int(&DataPath::cc(key, &sub(parameter, "size")));
    let Some(size) = size.filter(|_| verb != Verb::Update) else {
        return sender.get(vec![parameter]);
    };

    let current = tree.int(&DataPath::cc(key, &sub(parameter, "val"))).unwrap_or(0);
    let level = args
        .level()
        .unwrap_or_else(|| metric_level(hc.metric("level").as_ref()));
    let vars = Vars::new()
        .with("command", verb.as_str())
        .with("level", level)
        .with("args.level", level)
        .with("value", current);
    let value = config
        .v2p
        .eval(&vars)
        .map_err(|e| DeviceError::InvalidArgument(e.to_string()))?;
    match value {
        ExprValue::Null => Ok(()),
        other => {
            let value = other.as_f64().ok_or_else(|| {
                DeviceError::InvalidArgument(format!("parameter value is not a number: {}", other))
            })?;
            sender.send(CcCommand::ConfigurationSet {
                parameter,
                value: value.round() as i64,
                size,
            })
        }
    }
}
