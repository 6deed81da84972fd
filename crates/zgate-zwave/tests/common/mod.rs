//! Shared fixtures for the Z-Wave integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use zgate_devices::VirtualDeviceRegistry;
use zgate_messages::{Notification, NotificationSink};
use zgate_storage::MemoryObjectStore;
use zgate_zwave::{
    CcKey, CcRequest, DataPath, DataTree, DataValue, Mapper, MapperOptions, NodeId, PostfixStore,
    RouteCallback, ZWaveEngine,
};

pub const CONTROLLER: NodeId = 1;

/// Network management call seen by [`FakeEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    NeighbourUpdate(NodeId),
    DeleteSucReturnRoute(NodeId),
    DeleteReturnRoute(NodeId),
    AssignSucReturnRoute(NodeId),
    AssignReturnRoute(NodeId, NodeId),
}

/// Records everything sent to it. Neighbour updates stay pending until
/// [`complete`](Self::complete) is called; route calls succeed at once.
#[derive(Default)]
pub struct FakeEngine {
    sent: Mutex<Vec<CcRequest>>,
    calls: Mutex<Vec<EngineCall>>,
    pending: Mutex<Vec<(NodeId, RouteCallback)>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_sent(&self) -> Vec<CcRequest> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Nodes with a neighbour update in flight, oldest first.
    pub fn pending(&self) -> Vec<NodeId> {
        self.pending.lock().iter().map(|(n, _)| *n).collect()
    }

    /// Complete the oldest pending neighbour update of `node`.
    pub fn complete(&self, node: NodeId, ok: bool) {
        let done = {
            let mut pending = self.pending.lock();
            let index = pending
                .iter()
                .position(|(n, _)| *n == node)
                .unwrap_or_else(|| panic!("no neighbour update pending for node {}", node));
            pending.remove(index).1
        };
        done(ok);
    }

    /// Complete every pending update, oldest first, until none is left.
    pub fn complete_all(&self, ok: bool) {
        loop {
            let next = {
                let mut pending = self.pending.lock();
                if pending.is_empty() {
                    return;
                }
                pending.remove(0).1
            };
            next(ok);
        }
    }
}

impl ZWaveEngine for FakeEngine {
    fn send(&self, request: CcRequest) -> zgate_zwave::Result<()> {
        self.sent.lock().push(request);
        Ok(())
    }

    fn request_node_neighbour_update(&self, node: NodeId, done: RouteCallback) {
        self.calls.lock().push(EngineCall::NeighbourUpdate(node));
        self.pending.lock().push((node, done));
    }

    fn delete_suc_return_route(&self, node: NodeId, done: RouteCallback) {
        self.calls.lock().push(EngineCall::DeleteSucReturnRoute(node));
        done(true);
    }

    fn delete_return_route(&self, node: NodeId, done: RouteCallback) {
        self.calls.lock().push(EngineCall::DeleteReturnRoute(node));
        done(true);
    }

    fn assign_suc_return_route(&self, node: NodeId, done: RouteCallback) {
        self.calls.lock().push(EngineCall::AssignSucReturnRoute(node));
        done(true);
    }

    fn assign_return_route(&self, node: NodeId, target: NodeId, done: RouteCallback) {
        self.calls.lock().push(EngineCall::AssignReturnRoute(node, target));
        done(true);
    }
}

/// Keeps every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen.lock().iter().map(|n| n.message.clone()).collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn push(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

/// A tree with a controller (node 1).
pub fn network() -> Arc<DataTree> {
    let tree = Arc::new(DataTree::new());
    tree.set(&DataPath::controller("nodeId"), CONTROLLER as i64);
    tree.set(&DataPath::controller("lastIncludedDevice"), 0i64);
    tree.set(&DataPath::controller("lastExcludedDevice"), 0i64);
    tree.add_device(CONTROLLER);
    tree.set(&DataPath::device(CONTROLLER, "basicType"), 2i64);
    tree.set(&DataPath::device(CONTROLLER, "specificType"), 1i64);
    tree
}

/// Add a node with a known product identity (0x0086.0x0002.0x0064).
pub fn add_node(tree: &DataTree, node: NodeId, listening: bool) {
    tree.add_device(node);
    let set = |name: &str, value: DataValue| tree.set(&DataPath::device(node, name), value);
    set("isListening", listening.into());
    set("isFailed", false.into());
    set("failureCount", 0i64.into());
    set("basicType", 4i64.into());
    set("genericType", 0x10i64.into());
    set("specificType", 1i64.into());
    set("manufacturerId", 0x86i64.into());
    set("manufacturerProductType", 2i64.into());
    set("manufacturerProductId", 0x64i64.into());
    set("applicationMajor", 1i64.into());
    set("applicationMinor", 2i64.into());
    set("givenName", "".into());
}

/// `p_id` of nodes added by [`add_node`].
pub const PRODUCT: &str = "134.2.100";

/// Add a class and fill its data. The interview stays pending.
pub fn add_class(tree: &DataTree, key: CcKey, data: &[(&str, DataValue)]) {
    tree.add_command_class(key);
    for (path, value) in data {
        tree.set(&DataPath::cc(key, path), value.clone());
    }
}

pub fn finish_interview(tree: &DataTree, key: CcKey) {
    tree.set(&DataPath::cc(key, "interviewDone"), true);
}

/// The mapper with all of its collaborators.
pub struct Harness {
    pub tree: Arc<DataTree>,
    pub engine: Arc<FakeEngine>,
    pub registry: Arc<VirtualDeviceRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub postfix: Arc<PostfixStore>,
    pub mapper: Arc<Mapper>,
}

impl Harness {
    pub fn new(tree: Arc<DataTree>) -> Self {
        Self::with_options(tree, MapperOptions::default())
    }

    pub fn with_options(tree: Arc<DataTree>, options: MapperOptions) -> Self {
        let engine = FakeEngine::new();
        let registry = Arc::new(VirtualDeviceRegistry::new());
        let notifier = RecordingNotifier::new();
        let postfix = Arc::new(PostfixStore::open(None, Arc::new(MemoryObjectStore::new())).unwrap());
        let mapper = Mapper::new(
            options,
            tree.clone(),
            engine.clone(),
            registry.clone(),
            notifier.clone(),
            postfix.clone(),
            None,
        );
        Self {
            tree,
            engine,
            registry,
            notifier,
            postfix,
            mapper,
        }
    }

    /// Full id of a vDev of the default binding.
    pub fn id(&self, suffix: &str) -> String {
        format!("ZWayVDev_zway_{}", suffix)
    }

    pub fn level(&self, suffix: &str) -> Option<zgate_core::MetricValue> {
        self.registry.metric(&self.id(suffix), "level")
    }
}
