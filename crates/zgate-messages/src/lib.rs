//! User-visible notifications.
//!
//! The gateway reports failures and noteworthy device events as
//! notifications: fire-and-forget `(severity, message, category)` records.
//! Categories let downstream consumers filter:
//!
//! | Category | Used for |
//! |----------|----------|
//! | `core` | per-command-class mapping failures |
//! | `connection` | dead/alive transitions, local device resets |
//! | `module` | malformed postfix directives and configuration problems |
//! | `device` | device-originated information |
//!
//! ## Example
//!
//! ```rust
//! use zgate_messages::{NotificationCategory, NotificationManager, NotificationSeverity, NotificationSink};
//!
//! let manager = NotificationManager::new();
//! manager.notify(NotificationSeverity::Error, "3-0-37: missing level", NotificationCategory::Core);
//! assert_eq!(manager.list().len(), 1);
//! ```

pub mod category;
pub mod error;
pub mod manager;
pub mod notification;

pub use category::NotificationCategory;
pub use error::{Error, Result};
pub use manager::{NotificationManager, NotificationSink, NotificationStats, DEFAULT_HISTORY};
pub use notification::{Notification, NotificationId, NotificationSeverity};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
