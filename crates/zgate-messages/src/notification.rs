//! Notification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::category::NotificationCategory;

/// Unique notification identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum NotificationSeverity {
    #[default]
    Info = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl NotificationSeverity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "notification" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        *self as u8
    }

    // Serialize as lowercase string
    pub fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_string(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid severity: {}", s)))
    }
}

impl std::fmt::Display for NotificationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-visible notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(
        serialize_with = "NotificationSeverity::serialize",
        deserialize_with = "NotificationSeverity::deserialize"
    )]
    pub severity: NotificationSeverity,
    pub category: NotificationCategory,
    pub message: String,
    /// Emitting component, e.g. the binding name
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        severity: NotificationSeverity,
        message: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            severity,
            category,
            message: message.into(),
            source: "zwave".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn summary(&self) -> String {
        format!(
            "[{}/{}] {} ({})",
            self.severity, self.category, self.message, self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(NotificationSeverity::Critical > NotificationSeverity::Error);
        assert!(NotificationSeverity::Warning > NotificationSeverity::Info);
        assert_eq!(NotificationSeverity::Error.level(), 2);
    }

    #[test]
    fn test_severity_aliases() {
        assert_eq!(
            NotificationSeverity::from_string("notification"),
            Some(NotificationSeverity::Info)
        );
        assert_eq!(
            NotificationSeverity::from_string("ERROR"),
            Some(NotificationSeverity::Error)
        );
        assert_eq!(NotificationSeverity::from_string("fatal"), None);
    }

    #[test]
    fn test_serialization() {
        let n = Notification::new(
            NotificationSeverity::Critical,
            "Connection lost to Z-Wave device ID #5",
            NotificationCategory::Connection,
        )
        .with_source("zway");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["category"], "connection");
        assert_eq!(json["source"], "zway");

        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back.severity, NotificationSeverity::Critical);
    }
}
