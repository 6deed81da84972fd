//! Typed postfix directives.
//!
//! `postInterview` entries are comma separated:
//! `directive,targetPattern,value,...`. The target pattern is matched as a
//! substring against `"{instance}-{cc}"` and becomes the override key
//! `"{node}-{targetPattern}"`. Only the directives below exist; anything
//! else is rejected, never executed.
//!
//! `preInterview` entries use call syntax, e.g. `setConfig(0, 3, 1, 1)`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zgate_devices::DeviceType;
use zgate_messages::{NotificationCategory, NotificationSeverity, NotificationSink};

use super::expr::Expr;
use super::store::FixRecord;
use crate::error::{Result, ZWaveError};
use crate::types::{CcId, InstanceId, NodeId};

/// Gesture override for one central scene key (`"{scene}{keyAttribute}"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteState {
    pub cnt: Option<String>,
    pub action: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A configuration parameter exposed as a vDev.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigVDev {
    pub device_type: DeviceType,
    /// Parameter value to vDev level.
    pub p2v: Expr,
    /// vDev command to parameter value.
    pub v2p: Expr,
    pub title: String,
}

/// Overrides collected for one vDev key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VDevChange {
    pub rename: Option<String>,
    pub hide: bool,
    pub deactivate: bool,
    pub icon: Option<String>,
    pub probe_type: Option<String>,
    pub discrete_states: BTreeMap<String, DiscreteState>,
    pub no_vdev: bool,
    pub emulate_off: Option<Duration>,
    pub config_vdevs: BTreeMap<i64, ConfigVDev>,
    pub tilt: bool,
    pub notification_status: bool,
}

/// One `postInterview` instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Rename { target: String, name: String },
    Hide { target: String },
    Deactivate { target: String },
    Icon { target: String, icon: String },
    ProbeType { target: String, probe_type: String },
    DiscreteState { target: String, scene_key: String, state: DiscreteState },
    NoVDev { target: String },
    RenameNode { name: String },
    EmulateOff { target: String, timeout: Duration },
    ConfigVDev { instance: InstanceId, parameter: i64, config: ConfigVDev },
    Tilt { target: String },
    NotificationStatus { target: String },
}

fn field(parts: &[&str], index: usize) -> Option<String> {
    parts
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(parts: &[&str], index: usize, what: &str, entry: &str) -> Result<String> {
    field(parts, index).ok_or_else(|| ZWaveError::InvalidDirective(format!("{} missing in '{}'", what, entry)))
}

impl Directive {
    /// Parse one `postInterview` entry.
    pub fn parse(entry: &str) -> Result<Self> {
        let parts: Vec<&str> = entry.split(',').collect();
        let name = parts.first().map(|s| s.trim()).unwrap_or_default();
        let target = || required(&parts, 1, "target", entry);

        Ok(match name {
            "rename" => Self::Rename {
                target: target()?,
                name: required(&parts, 2, "name", entry)?,
            },
            "hide" => Self::Hide { target: target()? },
            "deactivate" => Self::Deactivate { target: target()? },
            "icon" => Self::Icon {
                target: target()?,
                icon: required(&parts, 2, "icon", entry)?,
            },
            "probeType" => Self::ProbeType {
                target: target()?,
                probe_type: required(&parts, 2, "probe type", entry)?,
            },
            "discreteState" => Self::DiscreteState {
                target: target()?,
                scene_key: required(&parts, 2, "scene key", entry)?,
                state: DiscreteState {
                    cnt: field(&parts, 3),
                    action: field(&parts, 4),
                    kind: field(&parts, 5),
                },
            },
            "noVDev" => Self::NoVDev { target: target()? },
            "renameNode" => Self::RenameNode {
                name: required(&parts, 1, "name", entry)?,
            },
            "emulateOff" => {
                let ms = required(&parts, 2, "timeout", entry)?;
                let ms: u64 = ms.parse().map_err(|_| {
                    ZWaveError::InvalidDirective(format!("invalid timeout '{}' in '{}'", ms, entry))
                })?;
                Self::EmulateOff {
                    target: target()?,
                    timeout: Duration::from_millis(ms),
                }
            }
            "configVDev" => {
                let instance = required(&parts, 1, "instance", entry)?;
                let instance: InstanceId = instance.parse().map_err(|_| {
                    ZWaveError::InvalidDirective(format!("invalid instance '{}' in '{}'", instance, entry))
                })?;
                let parameter = required(&parts, 2, "parameter", entry)?;
                let parameter: i64 = parameter.parse().map_err(|_| {
                    ZWaveError::InvalidDirective(format!("invalid parameter '{}' in '{}'", parameter, entry))
                })?;
                let kind = required(&parts, 3, "vDev type", entry)?;
                let device_type = match DeviceType::from_string(&kind) {
                    Some(t @ (DeviceType::SwitchBinary | DeviceType::SwitchMultilevel)) => t,
                    _ => {
                        return Err(ZWaveError::InvalidDirective(format!(
                            "unknown vDev type '{}' for config parameter {}",
                            kind, parameter
                        )))
                    }
                };
                let p2v = Expr::parse(&required(&parts, 4, "p2v", entry)?)?;
                let v2p = Expr::parse(&required(&parts, 5, "v2p", entry)?)?;
                Self::ConfigVDev {
                    instance,
                    parameter,
                    config: ConfigVDev {
                        device_type,
                        p2v,
                        v2p,
                        title: field(&parts, 6).unwrap_or_else(|| format!("Config #{}", parameter)),
                    },
                }
            }
            "tilt" => Self::Tilt { target: target()? },
            "notificationStatus" => Self::NotificationStatus { target: target()? },
            other => {
                return Err(ZWaveError::InvalidDirective(format!(
                    "unknown directive '{}'",
                    other
                )))
            }
        })
    }

    /// Directives that only change presentation.
    pub fn is_cosmetic(&self) -> bool {
        matches!(
            self,
            Self::Rename { .. }
                | Self::Hide { .. }
                | Self::Deactivate { .. }
                | Self::Icon { .. }
                | Self::ProbeType { .. }
                | Self::DiscreteState { .. }
                | Self::RenameNode { .. }
        )
    }

    fn target(&self) -> Option<&str> {
        match self {
            Self::Rename { target, .. }
            | Self::Hide { target }
            | Self::Deactivate { target }
            | Self::Icon { target, .. }
            | Self::ProbeType { target, .. }
            | Self::DiscreteState { target, .. }
            | Self::NoVDev { target }
            | Self::EmulateOff { target, .. }
            | Self::Tilt { target }
            | Self::NotificationStatus { target } => Some(target),
            Self::RenameNode { .. } | Self::ConfigVDev { .. } => None,
        }
    }
}

/// `preInterview` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PreInterviewCall {
    SetConfig { instance: InstanceId, parameter: i64, value: i64, size: i64 },
    SetCcData { instance: InstanceId, cc: CcId, data_type: String, key: String, value: String },
    SetDeviceData { data_type: String, key: String, value: String },
    RenameNode { name: String },
}

impl PreInterviewCall {
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim().trim_end_matches(';').trim_end();
        let invalid = || ZWaveError::InvalidDirective(format!("invalid pre-interview call '{}'", entry));
        let open = entry.find('(').ok_or_else(invalid)?;
        if !entry.ends_with(')') {
            return Err(invalid());
        }
        let name = entry[..open].trim();
        let args: Vec<String> = entry[open + 1..entry.len() - 1]
            .split(',')
            .map(|a| a.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .collect();
        let arg = |i: usize| args.get(i).filter(|a| !a.is_empty()).cloned().ok_or_else(invalid);
        let int = |i: usize| arg(i).and_then(|a| a.parse::<i64>().map_err(|_| invalid()));

        Ok(match name {
            "setConfig" => Self::SetConfig {
                instance: int(0)?.try_into().map_err(|_| invalid())?,
                parameter: int(1)?,
                value: int(2)?,
                size: int(3)?,
            },
            "setCCData" => Self::SetCcData {
                instance: int(0)?.try_into().map_err(|_| invalid())?,
                cc: int(1)?.try_into().map_err(|_| invalid())?,
                data_type: arg(2)?,
                key: arg(3)?,
                value: arg(4)?,
            },
            "setDeviceData" => Self::SetDeviceData {
                data_type: arg(0)?,
                key: arg(1)?,
                value: arg(2)?,
            },
            "renameNode" => Self::RenameNode { name: arg(0)? },
            other => {
                return Err(ZWaveError::InvalidDirective(format!(
                    "unknown pre-interview call '{}'",
                    other
                )))
            }
        })
    }
}

/// What a command class is being materialized for.
#[derive(Debug, Clone, Copy)]
pub struct DirectiveScope {
    pub node: NodeId,
    pub instance: InstanceId,
    pub cc: CcId,
    /// The node is the controller's last included device.
    pub including: bool,
    /// Cosmetic directives need `including`.
    pub cosmetic_on_inclusion_only: bool,
}

/// `postInterview` result: overrides by vDev key plus a node name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeVDev {
    changes: BTreeMap<String, VDevChange>,
    pub node_name: Option<String>,
}

impl ChangeVDev {
    /// Override for a vDev key such as `"5-0-48-1"`.
    pub fn get(&self, key: &str) -> Option<&VDevChange> {
        self.changes.get(key)
    }

    /// Whether the vDev with this key must not be created.
    pub fn suppressed(&self, key: &str) -> bool {
        self.get(key).is_some_and(|c| c.no_vdev)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.node_name.is_none()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.changes.keys()
    }

    /// Fold in the overrides collected for another class of the same node.
    pub fn merge(&mut self, other: ChangeVDev) {
        self.changes.extend(other.changes);
        if other.node_name.is_some() {
            self.node_name = other.node_name;
        }
    }

    fn entry(&mut self, key: String) -> &mut VDevChange {
        self.changes.entry(key).or_default()
    }

    /// Fold one directive in. Later directives override earlier ones.
    pub fn apply(&mut self, directive: Directive, scope: &DirectiveScope) {
        let pattern = format!("{}-{}", scope.instance, scope.cc);
        if directive.is_cosmetic() && scope.cosmetic_on_inclusion_only && !scope.including {
            return;
        }
        // emulateOff and configVDev are not filtered by the class pattern
        let matches_class = match &directive {
            Directive::EmulateOff { .. } | Directive::ConfigVDev { .. } | Directive::RenameNode { .. } => true,
            other => other.target().is_some_and(|t| t.contains(&pattern)),
        };
        if !matches_class {
            return;
        }

        let key = |target: &str| format!("{}-{}", scope.node, target);
        match directive {
            Directive::Rename { target, name } => self.entry(key(&target)).rename = Some(name),
            Directive::Hide { target } => self.entry(key(&target)).hide = true,
            Directive::Deactivate { target } => self.entry(key(&target)).deactivate = true,
            Directive::Icon { target, icon } => self.entry(key(&target)).icon = Some(icon),
            Directive::ProbeType { target, probe_type } => {
                self.entry(key(&target)).probe_type = Some(probe_type)
            }
            Directive::DiscreteState {
                target,
                scene_key,
                state,
            } => {
                self.entry(key(&target))
                    .discrete_states
                    .insert(scene_key, state);
            }
            Directive::NoVDev { target } => self.entry(key(&target)).no_vdev = true,
            Directive::RenameNode { name } => self.node_name = Some(name),
            Directive::EmulateOff { target, timeout } => {
                self.entry(key(&target)).emulate_off = Some(timeout)
            }
            Directive::ConfigVDev {
                instance,
                parameter,
                config,
            } => {
                let key = format!("{}-{}-{}", scope.node, instance, crate::types::cc::CONFIGURATION);
                self.entry(key).config_vdevs.insert(parameter, config);
            }
            Directive::Tilt { target } => self.entry(key(&target)).tilt = true,
            Directive::NotificationStatus { target } => {
                self.entry(key(&target)).notification_status = true
            }
        }
    }

    /// Parse and fold the `postInterview` entries of `fixes`, least specific
    /// fix first. Rejected entries are logged and reported as `module`
    /// notifications.
    pub fn collect(fixes: &[FixRecord], scope: &DirectiveScope, notifier: &dyn NotificationSink) -> Self {
        let mut changes = Self::default();
        for fix in fixes {
            for entry in fix.post_interview() {
                match Directive::parse(entry) {
                    Ok(directive) => changes.apply(directive, scope),
                    Err(e) => {
                        tracing::warn!("Postfix {}: rejected '{}': {}", fix.p_id, entry, e);
                        notifier.notify(
                            NotificationSeverity::Warning,
                            &format!("Postfix {}: rejected '{}': {}", fix.p_id, entry, e),
                            NotificationCategory::Module,
                        );
                    }
                }
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zgate_messages::NotificationManager;

    fn scope(including: bool) -> DirectiveScope {
        DirectiveScope {
            node: 5,
            instance: 0,
            cc: 48,
            including,
            cosmetic_on_inclusion_only: true,
        }
    }

    #[test]
    fn test_parse_directives() {
        assert_eq!(
            Directive::parse("rename,0-48-12,Motion").unwrap(),
            Directive::Rename {
                target: "0-48-12".to_string(),
                name: "Motion".to_string()
            }
        );
        assert_eq!(
            Directive::parse("emulateOff,0-113-7-8-A,2000").unwrap(),
            Directive::EmulateOff {
                target: "0-113-7-8-A".to_string(),
                timeout: Duration::from_millis(2000)
            }
        );
        match Directive::parse("discreteState,0-91-DS,11,2,swipe_up").unwrap() {
            Directive::DiscreteState { scene_key, state, .. } => {
                assert_eq!(scene_key, "11");
                assert_eq!(state.cnt.as_deref(), Some("2"));
                assert_eq!(state.action.as_deref(), Some("swipe_up"));
                assert_eq!(state.kind, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects() {
        assert!(Directive::parse("vDev.set('x')").is_err());
        assert!(Directive::parse("rename,0-37").is_err());
        assert!(Directive::parse("emulateOff,0-48-1,soon").is_err());
        assert!(Directive::parse("configVDev,0,3,doorlock,value,level").is_err());
        assert!(Directive::parse("configVDev,0,3,switchMultilevel,eval(x),level").is_err());
    }

    #[test]
    fn test_probe_type_needs_a_value() {
        assert!(Directive::parse("probeType,0-37").is_err());
        assert!(Directive::parse("probeType,0-37, ").is_err());
        match Directive::parse("probeType,0-37,valve").unwrap() {
            Directive::ProbeType { target, probe_type } => {
                assert_eq!(target, "0-37");
                assert_eq!(probe_type, "valve");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_vdev_key_and_title() {
        let mut changes = ChangeVDev::default();
        let directive =
            Directive::parse("configVDev,0,7,switchMultilevel,value * 10,Math.round(level / 10)").unwrap();
        changes.apply(directive, &scope(false));
        let change = changes.get("5-0-112").unwrap();
        assert_eq!(change.config_vdevs[&7].title, "Config #7");
        assert_eq!(change.config_vdevs[&7].device_type, DeviceType::SwitchMultilevel);
    }

    #[test]
    fn test_cosmetic_gating_and_pattern() {
        let entries = [
            "hide,0-48-1",
            "noVDev,0-48-6",
            "noVDev,0-49-1",
            "emulateOff,0-48-12,3000",
            "renameNode,Porch",
        ];
        let mut outside = ChangeVDev::default();
        let mut during = ChangeVDev::default();
        for entry in entries {
            outside.apply(Directive::parse(entry).unwrap(), &scope(false));
            during.apply(Directive::parse(entry).unwrap(), &scope(true));
        }

        assert!(outside.get("5-0-48-1").is_none());
        assert!(outside.suppressed("5-0-48-6"));
        assert!(!outside.suppressed("5-0-49-1"));
        assert_eq!(
            outside.get("5-0-48-12").unwrap().emulate_off,
            Some(Duration::from_millis(3000))
        );
        assert_eq!(outside.node_name, None);

        assert!(during.get("5-0-48-1").unwrap().hide);
        assert_eq!(during.node_name.as_deref(), Some("Porch"));
    }

    #[test]
    fn test_collect_reports_rejected() {
        let fix: FixRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "p_id": "271",
            "postInterview": ["noVDev,0-48-1", "deleteEverything()"]
        }))
        .unwrap();
        let notifier = NotificationManager::new();
        let changes = ChangeVDev::collect(&[fix], &scope(false), &notifier);
        assert!(changes.suppressed("5-0-48-1"));
        let reported = notifier.list_by_category(NotificationCategory::Module);
        assert_eq!(reported.len(), 1);
        assert!(reported[0].message.contains("deleteEverything"));
    }

    #[test]
    fn test_pre_interview_calls() {
        assert_eq!(
            PreInterviewCall::parse("setConfig(0, 3, 1, 1);").unwrap(),
            PreInterviewCall::SetConfig {
                instance: 0,
                parameter: 3,
                value: 1,
                size: 1
            }
        );
        assert_eq!(
            PreInterviewCall::parse("renameNode('Kitchen')").unwrap(),
            PreInterviewCall::RenameNode {
                name: "Kitchen".to_string()
            }
        );
        assert!(PreInterviewCall::parse("scenesSupport(0, 91, 1, 4, 'B')").is_err());
        assert!(PreInterviewCall::parse("setConfig(0, x, 1, 1)").is_err());
    }
}
