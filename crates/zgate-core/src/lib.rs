//! Core types shared across the zgate crates.
//!
//! This crate holds the pieces every other crate depends on:
//!
//! - [`config`]: gateway configuration loaded from TOML plus `ZGATE_*` overrides
//! - [`event`]: metric values and the events published by the device registry
//! - [`eventbus`]: a broadcast event bus for [`GatewayEvent`]s
//! - [`error`]: the core error type

pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use event::{EventMetadata, GatewayEvent, MetricValue};
pub use eventbus::{EventBus, EventBusReceiver, DEFAULT_CHANNEL_CAPACITY};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
