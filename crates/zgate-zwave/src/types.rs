//! Identifiers and change kinds shared by the Z-Wave modules.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

pub type NodeId = u16;
pub type InstanceId = u8;
pub type CcId = u8;

/// Command class ids.
pub mod cc {
    use super::CcId;

    pub const BASIC: CcId = 0x20;
    pub const SWITCH_BINARY: CcId = 0x25;
    pub const SWITCH_MULTILEVEL: CcId = 0x26;
    pub const SCENE_ACTIVATION: CcId = 0x2b;
    pub const SENSOR_BINARY: CcId = 0x30;
    pub const SENSOR_MULTILEVEL: CcId = 0x31;
    pub const METER: CcId = 0x32;
    pub const SWITCH_COLOR: CcId = 0x33;
    pub const METER_PULSE: CcId = 0x35;
    pub const THERMOSTAT_MODE: CcId = 0x40;
    pub const THERMOSTAT_SET_POINT: CcId = 0x43;
    pub const THERMOSTAT_FAN_MODE: CcId = 0x44;
    pub const CENTRAL_SCENE: CcId = 0x5b;
    pub const DEVICE_RESET_LOCALLY: CcId = 0x5a;
    pub const DOOR_LOCK: CcId = 0x62;
    pub const BARRIER_OPERATOR: CcId = 0x66;
    pub const CONFIGURATION: CcId = 0x70;
    pub const ALARM: CcId = 0x71;
    pub const SOUND_SWITCH: CcId = 0x79;
    pub const BATTERY: CcId = 0x80;
    pub const CLOCK: CcId = 0x81;
    pub const WAKEUP: CcId = 0x84;
    pub const ASSOCIATION: CcId = 0x85;
    pub const TIME_PARAMETERS: CcId = 0x8b;
    pub const MULTI_CHANNEL_ASSOCIATION: CcId = 0x8e;
    pub const ALARM_SENSOR: CcId = 0x9c;
    pub const SECURITY_2: CcId = 0x9f;
}

/// One command class on one instance of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CcKey {
    pub node: NodeId,
    pub instance: InstanceId,
    pub cc: CcId,
}

impl CcKey {
    pub fn new(node: NodeId, instance: InstanceId, cc: CcId) -> Self {
        Self { node, instance, cc }
    }

    /// Another class on the same node and instance.
    pub fn with_cc(self, cc: CcId) -> Self {
        Self { cc, ..self }
    }
}

impl fmt::Display for CcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.node, self.instance, self.cc)
    }
}

/// Data change bitmask delivered to data bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeKind(pub u8);

impl ChangeKind {
    pub const UPDATED: ChangeKind = ChangeKind(0x01);
    pub const INVALIDATED: ChangeKind = ChangeKind(0x02);
    pub const DELETED: ChangeKind = ChangeKind(0x03);
    pub const CHILD_CREATED: ChangeKind = ChangeKind(0x04);
    pub const PHANTOM_UPDATE: ChangeKind = ChangeKind(0x40);
    pub const CHILD_EVENT: ChangeKind = ChangeKind(0x80);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// The bound holder itself is being deleted. Events relayed from
    /// deleted descendants carry [`CHILD_EVENT`](Self::CHILD_EVENT) and do not count.
    pub fn is_deleted(self) -> bool {
        self == Self::DELETED
    }

    /// Neither invalidated nor deleted, the bound value can be read.
    pub fn is_valid(self) -> bool {
        self.0 & Self::INVALIDATED.0 == 0
    }

    pub fn is_phantom(self) -> bool {
        self.0 & Self::PHANTOM_UPDATE.0 != 0
    }

    pub fn is_child_event(self) -> bool {
        self.0 & Self::CHILD_EVENT.0 != 0
    }

    pub fn is_child_created(self) -> bool {
        self.0 & 0x3f == Self::CHILD_CREATED.0
    }
}

impl BitOr for ChangeKind {
    type Output = ChangeKind;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChangeKind(self.0 | rhs.0)
    }
}

/// Structural change of the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    DeviceAdded(NodeId),
    DeviceRemoved(NodeId),
    InstanceAdded(NodeId, InstanceId),
    InstanceRemoved(NodeId, InstanceId),
    CommandAdded(CcKey),
    CommandRemoved(CcKey),
}

impl DeviceChange {
    pub fn mask(&self) -> DeviceChangeMask {
        match self {
            Self::DeviceAdded(_) => DeviceChangeMask::DEVICE_ADDED,
            Self::DeviceRemoved(_) => DeviceChangeMask::DEVICE_REMOVED,
            Self::InstanceAdded(..) => DeviceChangeMask::INSTANCE_ADDED,
            Self::InstanceRemoved(..) => DeviceChangeMask::INSTANCE_REMOVED,
            Self::CommandAdded(_) => DeviceChangeMask::COMMAND_ADDED,
            Self::CommandRemoved(_) => DeviceChangeMask::COMMAND_REMOVED,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            Self::DeviceAdded(n) | Self::DeviceRemoved(n) => *n,
            Self::InstanceAdded(n, _) | Self::InstanceRemoved(n, _) => *n,
            Self::CommandAdded(key) | Self::CommandRemoved(key) => key.node,
        }
    }
}

/// Subscription mask for [`DeviceChange`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceChangeMask(pub u32);

impl DeviceChangeMask {
    pub const DEVICE_ADDED: DeviceChangeMask = DeviceChangeMask(0x01);
    pub const DEVICE_REMOVED: DeviceChangeMask = DeviceChangeMask(0x02);
    pub const INSTANCE_ADDED: DeviceChangeMask = DeviceChangeMask(0x04);
    pub const INSTANCE_REMOVED: DeviceChangeMask = DeviceChangeMask(0x08);
    pub const COMMAND_ADDED: DeviceChangeMask = DeviceChangeMask(0x10);
    pub const COMMAND_REMOVED: DeviceChangeMask = DeviceChangeMask(0x20);
    /// Replay the existing structure to a new subscriber.
    pub const ENUMERATE_EXISTING: DeviceChangeMask = DeviceChangeMask(0x200);

    pub fn contains(self, other: DeviceChangeMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeviceChangeMask {
    type Output = DeviceChangeMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        DeviceChangeMask(self.0 | rhs.0)
    }
}

/// Virtual device id prefix of a binding: `ZWayVDev_{name}_`.
pub fn vdev_prefix(binding_name: &str) -> String {
    format!("ZWayVDev_{}_", binding_name)
}

/// Id prefix shared by every vDev of a node: `ZWayVDev_{name}_{node}-`.
pub fn node_prefix(binding_name: &str, node: NodeId) -> String {
    format!("ZWayVDev_{}_{}-", binding_name, node)
}

/// Namespace of a command class tuple: `ZWayVDev_{name}_{node}-{instance}-{cc}`.
pub fn vdev_namespace(binding_name: &str, key: CcKey) -> String {
    format!("ZWayVDev_{}_{}", binding_name, key)
}
