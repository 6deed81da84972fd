//! Command verbs, arguments and handlers.

use std::collections::BTreeMap;

use zgate_core::MetricValue;

use crate::error::Result;
use crate::registry::VirtualDeviceRegistry;

/// Abstract command verbs accepted by virtual devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    On,
    Off,
    Open,
    Close,
    Exact,
    ExactSmooth,
    Increase,
    Decrease,
    Min,
    Max,
    Up,
    Down,
    UpMax,
    Update,
    Stop,
    StartUp,
    StartDown,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Open => "open",
            Self::Close => "close",
            Self::Exact => "exact",
            Self::ExactSmooth => "exactSmooth",
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Min => "min",
            Self::Max => "max",
            Self::Up => "up",
            Self::Down => "down",
            Self::UpMax => "upMax",
            Self::Update => "update",
            Self::Stop => "stop",
            Self::StartUp => "startUp",
            Self::StartDown => "startDown",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            "exact" => Some(Self::Exact),
            "exactSmooth" => Some(Self::ExactSmooth),
            "increase" => Some(Self::Increase),
            "decrease" => Some(Self::Decrease),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "upMax" => Some(Self::UpMax),
            "update" => Some(Self::Update),
            "stop" => Some(Self::Stop),
            "startUp" => Some(Self::StartUp),
            "startDown" => Some(Self::StartDown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named command arguments (`level`, `duration`, `red`, `green`, `blue`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs(BTreeMap<String, MetricValue>);

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    /// Integer argument; numeric strings are accepted since UIs often send them.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            MetricValue::String(s) => s.trim().parse::<f64>().ok().map(|v| v as i64),
            other => other.as_i64(),
        }
    }

    pub fn level(&self) -> Option<i64> {
        self.int("level")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Context handed to a command handler.
pub struct HandlerContext<'a> {
    pub device_id: &'a str,
    pub registry: &'a VirtualDeviceRegistry,
}

impl HandlerContext<'_> {
    /// Current value of one of the device's metrics.
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.registry.metric(self.device_id, name)
    }

    pub fn set_metric(&self, name: &str, value: impl Into<MetricValue>) -> bool {
        self.registry.set_metric(self.device_id, name, value)
    }
}

/// Translates abstract verbs into actions for one vDev.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>, verb: Verb, args: &CommandArgs) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: Fn(&HandlerContext<'_>, Verb, &CommandArgs) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_>, verb: Verb, args: &CommandArgs) -> Result<()> {
        self(ctx, verb, args)
    }
}

/// Handler for read-only devices; accepts every verb and does nothing.
pub struct NoopHandler;

impl CommandHandler for NoopHandler {
    fn handle(&self, _ctx: &HandlerContext<'_>, _verb: Verb, _args: &CommandArgs) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_roundtrip() {
        for verb in [
            Verb::On,
            Verb::ExactSmooth,
            Verb::UpMax,
            Verb::StartDown,
            Verb::Update,
        ] {
            assert_eq!(Verb::from_string(verb.as_str()), Some(verb));
        }
        assert_eq!(Verb::from_string("blink"), None);
    }

    #[test]
    fn test_args_int_accepts_strings() {
        let args = CommandArgs::new()
            .with("level", "42")
            .with("red", 255)
            .with("duration", 1.9);
        assert_eq!(args.level(), Some(42));
        assert_eq!(args.int("red"), Some(255));
        assert_eq!(args.int("duration"), Some(1));
        assert_eq!(args.int("green"), None);
    }
}
