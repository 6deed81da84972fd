//! Per-command-class vDev builders.
//!
//! A builder creates the vDevs of one command class tuple, binds their
//! value callbacks and registers their command handlers. Every builder
//! skips ids that already exist, so running it again is harmless.

mod color;
mod config;
mod lock;
mod meter;
mod notification;
mod reset;
mod scene;
mod sensor;
mod sound;
mod switch;
mod thermostat;

use std::sync::Arc;

use zgate_devices::VirtualDeviceRegistry;

use super::context::{BuildContext, VDevContexts};
use crate::error::Result;
use crate::types::{cc, CcId};

pub(super) use thermostat::ready as thermostat_ready;

/// Whether a builder exists for `cc`.
pub fn is_mapped(cc: CcId) -> bool {
    matches!(
        cc,
        cc::SWITCH_BINARY
            | cc::SWITCH_MULTILEVEL
            | cc::SWITCH_COLOR
            | cc::SOUND_SWITCH
            | cc::SENSOR_BINARY
            | cc::SENSOR_MULTILEVEL
            | cc::METER
            | cc::METER_PULSE
            | cc::BATTERY
            | cc::DOOR_LOCK
            | cc::BARRIER_OPERATOR
            | cc::THERMOSTAT_MODE
            | cc::THERMOSTAT_SET_POINT
            | cc::ALARM_SENSOR
            | cc::ALARM
            | cc::CENTRAL_SCENE
            | cc::CONFIGURATION
            | cc::DEVICE_RESET_LOCALLY
    )
}

/// Run the builder of `ctx.key.cc`.
pub fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    match ctx.key.cc {
        cc::SWITCH_BINARY => switch::binary(ctx),
        cc::SWITCH_MULTILEVEL => switch::multilevel(ctx),
        cc::SWITCH_COLOR => color::build(ctx),
        cc::SOUND_SWITCH => sound::build(ctx),
        cc::SENSOR_BINARY => sensor::binary(ctx),
        cc::SENSOR_MULTILEVEL => sensor::multilevel(ctx),
        cc::ALARM_SENSOR => sensor::alarm(ctx),
        cc::METER => meter::meter(ctx),
        cc::METER_PULSE => meter::pulse(ctx),
        cc::BATTERY => meter::battery(ctx),
        cc::DOOR_LOCK => lock::door_lock(ctx),
        cc::BARRIER_OPERATOR => lock::barrier(ctx),
        cc::THERMOSTAT_MODE | cc::THERMOSTAT_SET_POINT => thermostat::build(ctx),
        cc::ALARM => notification::build(ctx),
        cc::CENTRAL_SCENE => scene::build(ctx),
        cc::CONFIGURATION => config::build(ctx),
        cc::DEVICE_RESET_LOCALLY => reset::build(ctx),
        _ => Ok(()),
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Level update of a binary sensor, honouring emulate-off: with a
/// timeout configured only `on` is taken from the device.
fn report_binary(registry: &VirtualDeviceRegistry, contexts: &Arc<VDevContexts>, id: &str, on: bool) {
    if contexts.emulate_off(id).is_some() {
        if on {
            contexts.report_on(id);
        }
        return;
    }
    registry.set_metric(id, "level", on_off(on));
}

/// Path of a sub key, e.g. `sub("1", "level")` is `1.level`.
fn sub(key: impl std::fmt::Display, path: &str) -> String {
    format!("{}.{}", key, path)
}
