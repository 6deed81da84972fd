//! Z-Wave binding: maps the command classes of a Z-Wave network onto
//! virtual devices.
//!
//! The protocol engine exposes its state as a [`DataTree`]. The [`Mapper`]
//! watches that tree and, for every interviewed command class, creates
//! virtual devices in the [`VirtualDeviceRegistry`](zgate_devices::VirtualDeviceRegistry),
//! keeps their metrics in sync with the tree and turns vDev commands into
//! [`CcRequest`]s for the [`ZWaveEngine`]. Per-product quirks come from the
//! [`PostfixStore`].
//!
//! Around the mapper run a few network services:
//!
//! - [`DeadDetector`]: propagates node failures to vDevs
//! - [`NetworkReorganizer`]: tiered neighbour update and route rebuild
//! - [`TimeSync`]: periodic clock updates
//! - [`DskCollection`]: SmartStart provisioning list
//!
//! [`ZWaveGateway`] wires all of them from a [`GatewayConfig`](zgate_core::GatewayConfig).

pub mod binding;
pub mod clock;
pub mod dsk;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod liveness;
pub mod mapper;
pub mod postfix;
pub mod reorg;
pub mod tree;
pub mod types;

pub use binding::DataBindings;
pub use clock::TimeSync;
pub use dsk::{DskCollection, DskEntry, DskState, QrCode};
pub use engine::{CcCommand, CcRequest, RouteCallback, ZWaveEngine};
pub use error::{Result, ZWaveError};
pub use gateway::ZWaveGateway;
pub use liveness::{sleeping_node_failed, DeadDetector, WakeupState};
pub use mapper::{Mapper, MapperOptions};
pub use postfix::{DeviceIdentity, FixRecord, PostfixFile, PostfixStore};
pub use reorg::{NetworkReorganizer, ReorgLogEntry, ReorgNode, Tier};
pub use tree::{BindMode, DataPath, DataSnapshot, DataTree, DataValue};
pub use types::{cc, CcId, CcKey, ChangeKind, DeviceChange, DeviceChangeMask, InstanceId, NodeId};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
