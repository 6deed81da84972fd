//! Interface to the Z-Wave protocol engine.
//!
//! The mapper never talks to the radio directly. Command class requests
//! and network maintenance calls go through [`ZWaveEngine`], implemented by
//! the host that owns the serial link (and by recording fakes in tests).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{CcKey, NodeId};

/// A command class request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CcCommand {
    Get(Vec<i64>),
    Set(Vec<i64>),
    SetWithDuration { args: Vec<i64>, duration: i64 },
    /// Set several channels at once (SwitchColor).
    SetMultiple { keys: Vec<i64>, values: Vec<i64> },
    StartLevelChange { down: bool },
    StopLevelChange,
    SetPointSet { mode: i64, value: f64 },
    TonePlay(i64),
    SoundConfigurationSet { tone: i64, volume: i64 },
    SoundConfigurationGet,
    ConfigurationSet { parameter: i64, value: i64, size: i64 },
    ClockSet,
    TimeParametersSet,
}

/// A command addressed to one command class of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcRequest {
    pub key: CcKey,
    pub command: CcCommand,
}

impl CcRequest {
    pub fn new(key: CcKey, command: CcCommand) -> Self {
        Self { key, command }
    }
}

/// Completion of a network management call: `true` on success.
pub type RouteCallback = Box<dyn FnOnce(bool) + Send>;

/// The protocol engine.
///
/// Management calls complete asynchronously through their callback, which
/// may run on any thread and must be invoked exactly once.
pub trait ZWaveEngine: Send + Sync {
    /// Queue a command class request.
    fn send(&self, request: CcRequest) -> Result<()>;

    fn request_node_neighbour_update(&self, node: NodeId, done: RouteCallback);

    fn delete_suc_return_route(&self, node: NodeId, done: RouteCallback);

    fn delete_return_route(&self, node: NodeId, done: RouteCallback);

    fn assign_suc_return_route(&self, node: NodeId, done: RouteCallback);

    fn assign_return_route(&self, node: NodeId, target: NodeId, done: RouteCallback);
}
