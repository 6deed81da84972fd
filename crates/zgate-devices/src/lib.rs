//! Virtual device registry.
//!
//! Virtual devices (vDevs) are the application-facing view of Z-Wave
//! end-points. The registry exclusively owns them: it stores their metrics,
//! associates each with a [`CommandHandler`], and publishes lifecycle and
//! metric events on the core [`EventBus`](zgate_core::EventBus).
//!
//! ```rust
//! use std::sync::Arc;
//! use zgate_devices::{CommandArgs, DeviceType, NoopHandler, VDevDefaults, VirtualDeviceRegistry};
//!
//! let registry = VirtualDeviceRegistry::new();
//! registry
//!     .create(
//!         "ZWayVDev_zway_2-0-37",
//!         VDevDefaults::new(DeviceType::SwitchBinary).metric("level", "off"),
//!         Arc::new(NoopHandler),
//!     )
//!     .unwrap();
//! registry.dispatch("ZWayVDev_zway_2-0-37", "update", &CommandArgs::new()).unwrap();
//! ```

pub mod command;
pub mod device;
pub mod error;
pub mod registry;

pub use command::{CommandArgs, CommandHandler, HandlerContext, NoopHandler, Verb};
pub use device::{DeviceInfo, DeviceType, VDevDefaults, VirtualDevice};
pub use error::{DeviceError, Result};
pub use registry::VirtualDeviceRegistry;

pub use zgate_core::MetricValue;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
