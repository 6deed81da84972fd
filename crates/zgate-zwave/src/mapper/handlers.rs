//! Verb translation shared by the builders.

use std::sync::Arc;

use zgate_core::MetricValue;
use zgate_devices::{CommandArgs, CommandHandler, DeviceError, HandlerContext, Verb};

use crate::engine::{CcCommand, CcRequest, ZWaveEngine};
use crate::types::{CcId, CcKey};

/// Sends requests to one command class on behalf of a vDev handler.
#[derive(Clone)]
pub struct CcSender {
    engine: Arc<dyn ZWaveEngine>,
    key: CcKey,
}

impl CcSender {
    pub fn new(engine: Arc<dyn ZWaveEngine>, key: CcKey) -> Self {
        Self { engine, key }
    }

    /// Same instance, another class.
    pub fn to(&self, cc: CcId) -> Self {
        Self {
            engine: self.engine.clone(),
            key: self.key.with_cc(cc),
        }
    }

    pub fn key(&self) -> CcKey {
        self.key
    }

    pub fn send(&self, command: CcCommand) -> zgate_devices::Result<()> {
        self.engine
            .send(CcRequest::new(self.key, command))
            .map_err(|e| DeviceError::CommandFailed(format!("{}: {}", self.key, e)))
    }

    pub fn get(&self, args: Vec<i64>) -> zgate_devices::Result<()> {
        self.send(CcCommand::Get(args))
    }

    pub fn set(&self, args: Vec<i64>) -> zgate_devices::Result<()> {
        self.send(CcCommand::Set(args))
    }
}

/// Wrap a closure as a vDev command handler.
pub fn handler<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(&HandlerContext<'_>, Verb, &CommandArgs) -> zgate_devices::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn unsupported(device: &str, verb: Verb) -> DeviceError {
    DeviceError::UnsupportedCommand {
        device: device.to_string(),
        command: verb.as_str().to_string(),
    }
}

/// `Math.round(v / 10) * 10`, halves rounding up.
pub fn round10(v: i64) -> i64 {
    ((v as f64 / 10.0 + 0.5).floor() as i64) * 10
}

/// Engine channel value (0..255) to vDev level (0..99).
pub fn color_to_level(value: i64) -> i64 {
    ((value as f64) * 99.0 / 255.0).ceil() as i64
}

/// vDev level (0..99) to engine channel value (0..255).
pub fn level_to_color(level: i64) -> i64 {
    ((level as f64) * 255.0 / 99.0).ceil() as i64
}

/// Integer view of a metric; `"on"`/`"off"` and empty values count as 0.
pub fn metric_level(value: Option<&MetricValue>) -> i64 {
    value.and_then(MetricValue::as_i64).unwrap_or(0)
}

/// What a multilevel verb asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelAction {
    Set(i64),
    SetSmooth { level: i64, duration: i64 },
    Stop,
    StartUp,
    StartDown,
    Update,
    /// Out-of-range or missing target; nothing is sent.
    Ignore,
}

/// Translate a verb for a 0..99 multilevel switch (255 = restore last level).
pub fn multilevel_action(verb: Verb, current: i64, args: &CommandArgs) -> Option<LevelAction> {
    let action = match verb {
        Verb::On | Verb::Up => LevelAction::Set(255),
        Verb::Off | Verb::Down => LevelAction::Set(0),
        Verb::Min => LevelAction::Set(10),
        Verb::Max | Verb::UpMax => LevelAction::Set(99),
        Verb::Increase => {
            let mut level = current + 10;
            if level % 10 != 0 {
                level = round10(level);
            }
            LevelAction::Set(level.min(99))
        }
        Verb::Decrease => {
            let mut level = (current - 10).max(0);
            if level % 10 != 0 {
                level = round10(level);
            }
            LevelAction::Set(level)
        }
        Verb::Exact | Verb::ExactSmooth => match exact_level(args.level()) {
            Some(level) if verb == Verb::ExactSmooth => LevelAction::SetSmooth {
                level,
                duration: args.int("duration").unwrap_or(0),
            },
            Some(level) => LevelAction::Set(level),
            None => LevelAction::Ignore,
        },
        Verb::Stop => LevelAction::Stop,
        Verb::StartUp => LevelAction::StartUp,
        Verb::StartDown => LevelAction::StartDown,
        Verb::Update => LevelAction::Update,
        Verb::Open | Verb::Close => return None,
    };
    Some(action)
}

/// `exact` clamping: negatives become 0, 255 is kept, 100 becomes 99 and
/// anything else above 99 is rejected.
pub fn exact_level(level: Option<i64>) -> Option<i64> {
    match level? {
        l if l < 0 => Some(0),
        255 => Some(255),
        100 => Some(99),
        l if l > 99 => None,
        l => Some(l),
    }
}

/// Translate a verb for one colour channel. `level` is the vDev level
/// (0..99), `old_level` the last non-zero one.
pub fn color_channel_action(
    verb: Verb,
    level: i64,
    old_level: i64,
    args: &CommandArgs,
) -> Option<LevelAction> {
    let value = match verb {
        Verb::On => {
            if old_level > 0 {
                level_to_color(old_level)
            } else {
                255
            }
        }
        Verb::Off => 0,
        Verb::Min => 10,
        Verb::Max => 255,
        Verb::Increase => {
            let mut value = level_to_color(level) + 10;
            if value % 10 != 0 {
                value = round10(value);
            }
            value.min(255)
        }
        Verb::Decrease => {
            let mut value = (level_to_color(level) - 10).max(0);
            if value % 10 != 0 {
                value = round10(value);
            }
            value
        }
        Verb::Exact | Verb::ExactSmooth => {
            let Some(requested) = args.level() else {
                return Some(LevelAction::Ignore);
            };
            let value = level_to_color(requested).clamp(0, 255);
            if verb == Verb::ExactSmooth {
                return Some(LevelAction::SetSmooth {
                    level: value,
                    duration: args.int("duration").unwrap_or(0),
                });
            }
            value
        }
        Verb::Update => return Some(LevelAction::Update),
        _ => return None,
    };
    Some(LevelAction::Set(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(l: i64) -> CommandArgs {
        CommandArgs::new().with("level", l)
    }

    #[test]
    fn test_multilevel_verbs() {
        let none = CommandArgs::new();
        assert_eq!(multilevel_action(Verb::On, 0, &none), Some(LevelAction::Set(255)));
        assert_eq!(multilevel_action(Verb::Down, 40, &none), Some(LevelAction::Set(0)));
        assert_eq!(multilevel_action(Verb::Min, 40, &none), Some(LevelAction::Set(10)));
        assert_eq!(multilevel_action(Verb::UpMax, 40, &none), Some(LevelAction::Set(99)));
        assert_eq!(multilevel_action(Verb::Increase, 33, &none), Some(LevelAction::Set(40)));
        assert_eq!(multilevel_action(Verb::Increase, 95, &none), Some(LevelAction::Set(99)));
        assert_eq!(multilevel_action(Verb::Decrease, 37, &none), Some(LevelAction::Set(30)));
        assert_eq!(multilevel_action(Verb::Decrease, 4, &none), Some(LevelAction::Set(0)));
        assert_eq!(multilevel_action(Verb::Open, 4, &none), None);
        assert_eq!(multilevel_action(Verb::StartDown, 4, &none), Some(LevelAction::StartDown));
    }

    #[test]
    fn test_exact_clamping() {
        assert_eq!(multilevel_action(Verb::Exact, 0, &level(-5)), Some(LevelAction::Set(0)));
        assert_eq!(multilevel_action(Verb::Exact, 0, &level(255)), Some(LevelAction::Set(255)));
        assert_eq!(multilevel_action(Verb::Exact, 0, &level(100)), Some(LevelAction::Set(99)));
        assert_eq!(multilevel_action(Verb::Exact, 0, &level(150)), Some(LevelAction::Ignore));
        assert_eq!(
            multilevel_action(Verb::ExactSmooth, 0, &level(50).with("duration", 3)),
            Some(LevelAction::SetSmooth { level: 50, duration: 3 })
        );
        assert_eq!(
            multilevel_action(Verb::Exact, 0, &CommandArgs::new().with("level", "42")),
            Some(LevelAction::Set(42))
        );
    }

    #[test]
    fn test_color_conversion_round_trip() {
        for level in [0, 1, 10, 42, 50, 98, 99] {
            let back = color_to_level(level_to_color(level));
            assert!((back - level).abs() <= 2, "{} -> {}", level, back);
        }
        assert_eq!(color_to_level(255), 99);
        assert_eq!(level_to_color(99), 255);
    }

    #[test]
    fn test_color_channel_verbs() {
        let none = CommandArgs::new();
        assert_eq!(color_channel_action(Verb::On, 0, 40, &none), Some(LevelAction::Set(104)));
        assert_eq!(color_channel_action(Verb::On, 0, 0, &none), Some(LevelAction::Set(255)));
        assert_eq!(color_channel_action(Verb::Max, 0, 0, &none), Some(LevelAction::Set(255)));
        assert_eq!(color_channel_action(Verb::Increase, 99, 0, &none), Some(LevelAction::Set(255)));
        assert_eq!(color_channel_action(Verb::Exact, 0, 0, &level(99)), Some(LevelAction::Set(255)));
        assert_eq!(color_channel_action(Verb::Stop, 0, 0, &none), None);
    }
}
