//! Notification category.

use serde::{Deserialize, Serialize};

/// Category tag used for downstream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NotificationCategory {
    /// Mapping engine failures
    #[serde(rename = "core")]
    #[default]
    Core,
    /// Node reachability
    #[serde(rename = "connection")]
    Connection,
    /// Module configuration and postfix problems
    #[serde(rename = "module")]
    Module,
    /// Device-originated information
    #[serde(rename = "device")]
    Device,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Core => "core",
            Self::Connection => "connection",
            Self::Module => "module",
            Self::Device => "device",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "core" => Some(Self::Core),
            "connection" => Some(Self::Connection),
            "module" => Some(Self::Module),
            "device" => Some(Self::Device),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
