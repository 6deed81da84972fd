//! Dead node detection.
//!
//! Listening nodes are judged by the engine's own `isFailed` and
//! `failureCount` flags. Sleeping nodes never answer between wake ups, so a
//! periodic sweep marks them failed when they missed three wake up intervals
//! in a row.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use zgate_devices::VirtualDeviceRegistry;
use zgate_messages::{NotificationCategory, NotificationSeverity, NotificationSink};

use crate::binding::DataBindings;
use crate::tree::{DataPath, DataTree, SubscriptionId};
use crate::types::{cc, node_prefix, CcKey, ChangeKind, DeviceChange, DeviceChangeMask, NodeId};

/// Failure count at which a failed node is reported.
const REPORTED_FAILURE_COUNT: i64 = 2;

/// Missed wake up intervals before a sleeping node is considered dead.
const MISSED_WAKEUPS: i64 = 3;

/// Wake up state of a sleeping node, in unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeupState {
    pub interval: i64,
    pub last_wakeup: i64,
    pub last_sleep: i64,
    /// Node the device sends its wake up notifications to.
    pub destination: i64,
}

/// Whether a sleeping node has to be considered dead at `now`.
///
/// Only nodes reporting to `controller` with a non-zero interval qualify,
/// and both their last wake up and last sleep must be known and older than
/// three intervals.
pub fn sleeping_node_failed(wakeup: &WakeupState, controller: i64, now: i64) -> bool {
    let timed_out = |at: i64| at != 0 && at + MISSED_WAKEUPS * wakeup.interval < now;
    wakeup.interval > 0
        && wakeup.destination == controller
        && timed_out(wakeup.last_wakeup)
        && timed_out(wakeup.last_sleep)
}

#[derive(Default)]
struct NodeWatch {
    bindings: DataBindings,
    bound: HashSet<&'static str>,
}

#[derive(Default)]
struct DetectorState {
    started: bool,
    subscription: Option<SubscriptionId>,
    nodes: HashMap<NodeId, NodeWatch>,
    failed: HashSet<NodeId>,
    sweep: Option<JoinHandle<()>>,
}

/// Marks the vDevs of unreachable nodes as failed.
pub struct DeadDetector {
    this: Weak<DeadDetector>,
    binding_name: String,
    tree: Arc<DataTree>,
    registry: Arc<VirtualDeviceRegistry>,
    notifier: Arc<dyn NotificationSink>,
    interval: Duration,
    state: Mutex<DetectorState>,
}

impl DeadDetector {
    pub fn new(
        binding_name: impl Into<String>,
        tree: Arc<DataTree>,
        registry: Arc<VirtualDeviceRegistry>,
        notifier: Arc<dyn NotificationSink>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            binding_name: binding_name.into(),
            tree,
            registry,
            notifier,
            interval,
            state: Mutex::new(DetectorState::default()),
        })
    }

    /// Watch all current and future nodes and start the periodic sweep.
    pub fn start(&self) {
        {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
        }

        let weak = self.this.clone();
        let subscription = self.tree.bind_devices(
            DeviceChangeMask::DEVICE_ADDED
                | DeviceChangeMask::DEVICE_REMOVED
                | DeviceChangeMask::COMMAND_ADDED
                | DeviceChangeMask::ENUMERATE_EXISTING,
            Arc::new(move |change: DeviceChange| {
                if let Some(detector) = weak.upgrade() {
                    detector.on_device_change(change);
                }
            }),
        );

        let sweep = self.spawn_sweep();
        let mut state = self.state.lock();
        state.subscription = Some(subscription);
        state.sweep = sweep;
    }

    pub fn stop(&self) {
        let mut state = std::mem::take(&mut *self.state.lock());
        if let Some(subscription) = state.subscription.take() {
            self.tree.unbind_devices(subscription);
        }
        if let Some(sweep) = state.sweep.take() {
            sweep.abort();
        }
        for (_, mut watch) in state.nodes.drain() {
            watch.bindings.unbind_all(&self.tree);
        }
    }

    /// Nodes currently reported as failed.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.state.lock().failed.iter().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    fn spawn_sweep(&self) -> Option<JoinHandle<()>> {
        if self.interval.is_zero() {
            return None;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime, dead detection sweep not scheduled");
            return None;
        };
        let weak = self.this.clone();
        let period = self.interval;
        Some(handle.spawn(async move {
            let mut timer = tokio::time::interval(period);
            // the first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                match weak.upgrade() {
                    Some(detector) => detector.sweep(),
                    None => break,
                }
            }
        }))
    }

    fn on_device_change(&self, change: DeviceChange) {
        match change {
            DeviceChange::DeviceAdded(node) => self.attach(node),
            DeviceChange::CommandAdded(key) => self.attach(key.node),
            DeviceChange::DeviceRemoved(node) => {
                let watch = {
                    let mut state = self.state.lock();
                    state.failed.remove(&node);
                    state.nodes.remove(&node)
                };
                if let Some(mut watch) = watch {
                    watch.bindings.unbind_all(&self.tree);
                }
            }
            _ => {}
        }
    }

    /// Bind the liveness holders of a node. Holders that do not exist yet
    /// are picked up on a later structural change of the node.
    fn attach(&self, node: NodeId) {
        let mut state = self.state.lock();
        let watch = state.nodes.entry(node).or_default();

        for name in ["isFailed", "failureCount"] {
            if watch.bound.contains(name) {
                continue;
            }
            let weak = self.this.clone();
            let bound = watch.bindings.bind_without_sync(
                &self.tree,
                &DataPath::device(node, name),
                move |kind: ChangeKind| {
                    if kind.is_deleted() || kind.is_phantom() {
                        return;
                    }
                    if let Some(detector) = weak.upgrade() {
                        detector.check_device(node);
                    }
                },
            );
            if bound {
                watch.bound.insert(name);
            }
        }

        let wakeup = CcKey::new(node, 0, cc::WAKEUP);
        if !watch.bound.contains("lastWakeup") && self.tree.has_command_class(wakeup) {
            let weak = self.this.clone();
            let bound = watch.bindings.bind_without_sync(
                &self.tree,
                &DataPath::cc(wakeup, "lastWakeup"),
                move |kind: ChangeKind| {
                    if kind.is_deleted() || kind.is_phantom() {
                        return;
                    }
                    if let Some(detector) = weak.upgrade() {
                        detector.mark(node, false);
                    }
                },
            );
            if bound {
                watch.bound.insert("lastWakeup");
            }
        }
    }

    fn node_name(&self, node: NodeId) -> String {
        self.tree
            .string(&DataPath::device(node, "givenName"))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Device {}", node))
    }

    /// React to a change of the engine's failure flags.
    pub fn check_device(&self, node: NodeId) {
        let failed = self.tree.flag(&DataPath::device(node, "isFailed"));
        if failed {
            let count = self.tree.int(&DataPath::device(node, "failureCount")).unwrap_or(0);
            if count == REPORTED_FAILURE_COUNT {
                self.mark(node, true);
                self.notifier.notify(
                    NotificationSeverity::Error,
                    &format!("Connection lost to {} ({})", self.node_name(node), node),
                    NotificationCategory::Connection,
                );
            }
            return;
        }

        if self.mark(node, false) {
            self.notifier.notify(
                NotificationSeverity::Info,
                &format!("{} ({}) is back to life", self.node_name(node), node),
                NotificationCategory::Connection,
            );
        }
    }

    /// Propagate the failed flag to every vDev of the node. Returns whether
    /// the node was failed before.
    fn mark(&self, node: NodeId, failed: bool) -> bool {
        let was_failed = {
            let mut state = self.state.lock();
            if failed {
                !state.failed.insert(node)
            } else {
                state.failed.remove(&node)
            }
        };
        let count = self
            .registry
            .set_failed_for_prefix(&node_prefix(&self.binding_name, node), failed);
        if failed != was_failed {
            tracing::info!(
                "Node {} marked {} ({} vDevs)",
                node,
                if failed { "failed" } else { "alive" },
                count
            );
        }
        was_failed
    }

    fn wakeup_state(&self, node: NodeId) -> Option<WakeupState> {
        let key = CcKey::new(node, 0, cc::WAKEUP);
        if !self.tree.has_command_class(key) {
            return None;
        }
        let int = |name: &str| self.tree.int(&DataPath::cc(key, name)).unwrap_or(0);
        Some(WakeupState {
            interval: int("interval"),
            last_wakeup: int("lastWakeup"),
            last_sleep: int("lastSleep"),
            destination: int("nodeId"),
        })
    }

    /// Re-evaluate the liveness of one node.
    pub fn check_sleeping_node(&self, node: NodeId, now: i64) {
        let controller = self.tree.controller_node_id();
        if controller == Some(node) {
            return;
        }
        let raw_failed = self.tree.flag(&DataPath::device(node, "isFailed"));
        let portable_controller = self.tree.int(&DataPath::device(node, "basicType")) == Some(1);

        let failed = match self.wakeup_state(node) {
            Some(wakeup) if !portable_controller => {
                let controller = controller.map(i64::from).unwrap_or(0);
                sleeping_node_failed(&wakeup, controller, now) || raw_failed
            }
            _ => raw_failed,
        };
        self.mark(node, failed);
    }

    /// Re-evaluate every node except the controller.
    pub fn sweep(&self) {
        let now = zgate_core::unix_now();
        let nodes = self.tree.nodes();
        tracing::debug!("Dead detection sweep over {} nodes", nodes.len());
        for node in nodes {
            self.check_sleeping_node(node, now);
        }
    }
}

impl Drop for DeadDetector {
    fn drop(&mut self) {
        if let Some(sweep) = self.state.get_mut().sweep.take() {
            sweep.abort();
        }
    }
}
