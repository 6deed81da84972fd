//! Change-notified device data tree.
//!
//! The network engine publishes everything it knows about the controller
//! and the nodes as a tree of data holders:
//!
//! ```text
//! controller.data.<path>
//! devices.<n>.data.<path>
//! devices.<n>.instances.<i>.commandClasses.<cc>.data.<path>
//! ```
//!
//! Every holder has a value, an update and an invalidate timestamp, and
//! named children. Callbacks bound to a holder are told what changed via a
//! [`ChangeKind`]; `Child` mode bindings additionally hear about every
//! descendant, flagged with [`ChangeKind::CHILD_EVENT`].
//!
//! Events are collected while the tree lock is held and delivered after it
//! is released, so callbacks may read, write, bind and unbind freely.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zgate_core::{unix_now, MetricValue};

use crate::types::{CcId, CcKey, ChangeKind, DeviceChange, DeviceChangeMask, InstanceId, NodeId};

/// Value stored in a data holder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Binary(Vec<u8>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StrArray(Vec<String>),
}

impl DataValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Truthiness: non-zero numbers, `true`, non-empty strings and arrays.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Binary(b) => !b.is_empty(),
            Self::IntArray(a) => !a.is_empty(),
            Self::FloatArray(a) => !a.is_empty(),
            Self::StrArray(a) => !a.is_empty(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(*b as i64),
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Self::IntArray(a) => Some(a),
            _ => None,
        }
    }

    /// Convert to a vDev metric value.
    pub fn to_metric(&self) -> MetricValue {
        match self {
            Self::Empty => MetricValue::Null,
            Self::Bool(b) => MetricValue::Boolean(*b),
            Self::Int(i) => MetricValue::Integer(*i),
            Self::Float(f) => MetricValue::Float(*f),
            Self::Str(s) => MetricValue::String(s.clone()),
            Self::Binary(b) => {
                MetricValue::Array(b.iter().map(|v| MetricValue::Integer(*v as i64)).collect())
            }
            Self::IntArray(a) => {
                MetricValue::Array(a.iter().map(|v| MetricValue::Integer(*v)).collect())
            }
            Self::FloatArray(a) => {
                MetricValue::Array(a.iter().map(|v| MetricValue::Float(*v)).collect())
            }
            Self::StrArray(a) => {
                MetricValue::Array(a.iter().map(|v| MetricValue::String(v.clone())).collect())
            }
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for DataValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<Vec<i64>> for DataValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<String>> for DataValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrArray(v)
    }
}

/// Which data subtree a path is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Controller,
    Device(NodeId),
    CommandClass(CcKey),
}

/// Address of a data holder: a scope plus a dotted path inside its `data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPath {
    scope: Scope,
    path: String,
}

impl DataPath {
    pub fn controller(path: &str) -> Self {
        Self {
            scope: Scope::Controller,
            path: path.to_string(),
        }
    }

    pub fn device(node: NodeId, path: &str) -> Self {
        Self {
            scope: Scope::Device(node),
            path: path.to_string(),
        }
    }

    /// Path inside a command class' data; `""` is the class root.
    pub fn cc(key: CcKey, path: &str) -> Self {
        Self {
            scope: Scope::CommandClass(key),
            path: path.to_string(),
        }
    }

    /// A descendant of this path.
    pub fn child(&self, sub: &str) -> Self {
        let path = if self.path.is_empty() {
            sub.to_string()
        } else {
            format!("{}.{}", self.path, sub)
        };
        Self {
            scope: self.scope,
            path,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn segments(&self) -> Vec<String> {
        let mut segs: Vec<String> = match self.scope {
            Scope::Controller => vec!["controller".into(), "data".into()],
            Scope::Device(node) => vec!["devices".into(), node.to_string(), "data".into()],
            Scope::CommandClass(key) => cc_segments(key),
        };
        segs.extend(
            self.path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        segs
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

fn device_segments(node: NodeId) -> Vec<String> {
    vec!["devices".into(), node.to_string()]
}

fn instance_segments(node: NodeId, instance: InstanceId) -> Vec<String> {
    vec![
        "devices".into(),
        node.to_string(),
        "instances".into(),
        instance.to_string(),
    ]
}

fn cc_node_segments(key: CcKey) -> Vec<String> {
    let mut segs = instance_segments(key.node, key.instance);
    segs.push("commandClasses".into());
    segs.push(key.cc.to_string());
    segs
}

fn cc_segments(key: CcKey) -> Vec<String> {
    let mut segs = cc_node_segments(key);
    segs.push("data".into());
    segs
}

/// Snapshot of one data holder.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    pub value: DataValue,
    /// Unix seconds
    pub update_time: i64,
    /// Unix seconds, 0 if never invalidated
    pub invalidate_time: i64,
}

/// Binding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Changes of the holder itself.
    Value,
    /// Changes of the holder and of all its descendants.
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type DataCallback = Arc<dyn Fn(ChangeKind) + Send + Sync>;
pub type DeviceCallback = Arc<dyn Fn(DeviceChange) + Send + Sync>;

#[derive(Default)]
struct Node {
    value: DataValue,
    update_time: i64,
    invalidate_time: i64,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn find(&self, segs: &[String]) -> Option<&Node> {
        segs.iter().try_fold(self, |node, seg| node.children.get(seg))
    }

    fn find_mut(&mut self, segs: &[String]) -> Option<&mut Node> {
        let mut cur = self;
        for seg in segs {
            cur = cur.children.get_mut(seg)?;
        }
        Some(cur)
    }

    /// Walk to `segs`, creating missing holders. Records the depth of every
    /// holder created on the way.
    fn ensure(&mut self, segs: &[String], created: &mut Vec<usize>) -> &mut Node {
        let mut cur = self;
        for (i, seg) in segs.iter().enumerate() {
            if !cur.children.contains_key(seg) {
                created.push(i + 1);
            }
            cur = cur.children.entry(seg.clone()).or_default();
        }
        cur
    }

    fn child_keys(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }
}

struct Slot {
    id: u64,
    mode: BindMode,
    callback: DataCallback,
}

struct DeviceSub {
    id: u64,
    mask: DeviceChangeMask,
    callback: DeviceCallback,
}

/// Callback to run once the lock is released. `last` callbacks belong to
/// bindings that were dropped by the same operation and always run.
struct PendingCall {
    binding: u64,
    callback: DataCallback,
    kind: ChangeKind,
    last: bool,
}

#[derive(Default)]
struct Pending {
    data: Vec<PendingCall>,
    devices: Vec<(DeviceCallback, DeviceChange)>,
}

#[derive(Default)]
struct Inner {
    root: Node,
    bindings: HashMap<Vec<String>, Vec<Slot>>,
    index: HashMap<u64, Vec<String>>,
    next_binding: u64,
    subscriptions: Vec<DeviceSub>,
    next_subscription: u64,
}

impl Inner {
    /// Queue `kind` for bindings on `path` and relay it to child-mode
    /// bindings of every ancestor.
    fn collect(&self, path: &[String], kind: ChangeKind, out: &mut Pending) {
        if let Some(slots) = self.bindings.get(path) {
            for slot in slots {
                out.data.push(PendingCall {
                    binding: slot.id,
                    callback: slot.callback.clone(),
                    kind,
                    last: false,
                });
            }
        }
        self.collect_ancestors(path, kind, out);
    }

    fn collect_ancestors(&self, path: &[String], kind: ChangeKind, out: &mut Pending) {
        for depth in (0..path.len()).rev() {
            if let Some(slots) = self.bindings.get(&path[..depth]) {
                for slot in slots.iter().filter(|s| s.mode == BindMode::Child) {
                    out.data.push(PendingCall {
                        binding: slot.id,
                        callback: slot.callback.clone(),
                        kind: kind | ChangeKind::CHILD_EVENT,
                        last: false,
                    });
                }
            }
        }
    }

    /// A holder appeared under `parent`.
    fn collect_child_created(&self, parent: &[String], out: &mut Pending) {
        if let Some(slots) = self.bindings.get(parent) {
            for slot in slots.iter().filter(|s| s.mode == BindMode::Child) {
                out.data.push(PendingCall {
                    binding: slot.id,
                    callback: slot.callback.clone(),
                    kind: ChangeKind::CHILD_CREATED,
                    last: false,
                });
            }
        }
        self.collect_ancestors(parent, ChangeKind::CHILD_CREATED, out);
    }

    fn collect_device(&self, change: DeviceChange, out: &mut Pending) {
        for sub in &self.subscriptions {
            if sub.mask.contains(change.mask()) {
                out.devices.push((sub.callback.clone(), change));
            }
        }
    }

    fn set(&mut self, segs: &[String], value: DataValue, time: i64, out: &mut Pending) {
        let mut created = Vec::new();
        let phantom = {
            let node = self.root.ensure(segs, &mut created);
            let phantom = node.value == value;
            node.value = value;
            node.update_time = time;
            phantom
        };
        for depth in created {
            self.collect_child_created(&segs[..depth - 1], out);
        }
        let kind = if phantom {
            ChangeKind::UPDATED | ChangeKind::PHANTOM_UPDATE
        } else {
            ChangeKind::UPDATED
        };
        self.collect(segs, kind, out);
    }

    /// Create a holder without touching its value if it exists.
    fn touch(&mut self, segs: &[String], out: &mut Pending) -> bool {
        let mut created = Vec::new();
        self.root.ensure(segs, &mut created);
        let fresh = !created.is_empty();
        for depth in created {
            self.collect_child_created(&segs[..depth - 1], out);
        }
        fresh
    }

    fn remove(&mut self, segs: &[String], out: &mut Pending) -> bool {
        let Some((last, parent)) = segs.split_last() else {
            return false;
        };
        let removed = self
            .root
            .find_mut(parent)
            .and_then(|p| p.children.remove(last))
            .is_some();
        if !removed {
            return false;
        }

        let mut doomed: Vec<Vec<String>> = self
            .bindings
            .keys()
            .filter(|path| path.starts_with(segs))
            .cloned()
            .collect();
        // deepest holders first
        doomed.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        for path in doomed {
            for slot in self.bindings.remove(&path).unwrap_or_default() {
                self.index.remove(&slot.id);
                out.data.push(PendingCall {
                    binding: slot.id,
                    callback: slot.callback,
                    kind: ChangeKind::DELETED,
                    last: true,
                });
            }
        }
        self.collect_ancestors(segs, ChangeKind::DELETED, out);
        true
    }

    fn numeric_children<T: std::str::FromStr + Ord>(&self, segs: &[String]) -> Vec<T> {
        let mut ids: Vec<T> = self
            .root
            .find(segs)
            .map(|n| n.children.keys().filter_map(|k| k.parse().ok()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// The engine's data tree.
pub struct DataTree {
    inner: Mutex<Inner>,
}

impl DataTree {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        let mut scratch = Vec::new();
        inner
            .root
            .ensure(&["controller".to_string(), "data".to_string()], &mut scratch);
        inner.root.ensure(&["devices".to_string()], &mut scratch);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn run<R>(&self, f: impl FnOnce(&mut Inner, &mut Pending) -> R) -> R {
        let mut pending = Pending::default();
        let result = {
            let mut inner = self.inner.lock();
            f(&mut inner, &mut pending)
        };
        self.fire(pending);
        result
    }

    fn fire(&self, pending: Pending) {
        for call in pending.data {
            if !call.last && !self.inner.lock().index.contains_key(&call.binding) {
                // unbound by an earlier callback of the same batch
                continue;
            }
            (call.callback)(call.kind);
        }
        for (callback, change) in pending.devices {
            callback(change);
        }
    }

    /// Read a holder.
    pub fn get(&self, path: &DataPath) -> Option<DataSnapshot> {
        let inner = self.inner.lock();
        inner.root.find(&path.segments()).map(|n| DataSnapshot {
            value: n.value.clone(),
            update_time: n.update_time,
            invalidate_time: n.invalidate_time,
        })
    }

    pub fn value(&self, path: &DataPath) -> Option<DataValue> {
        let inner = self.inner.lock();
        inner.root.find(&path.segments()).map(|n| n.value.clone())
    }

    pub fn int(&self, path: &DataPath) -> Option<i64> {
        self.value(path).and_then(|v| v.as_i64())
    }

    /// Truthiness of a holder; missing holders are false.
    pub fn flag(&self, path: &DataPath) -> bool {
        self.value(path).map(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn string(&self, path: &DataPath) -> Option<String> {
        self.value(path).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn exists(&self, path: &DataPath) -> bool {
        self.inner.lock().root.find(&path.segments()).is_some()
    }

    /// Names of the children of a holder.
    pub fn children(&self, path: &DataPath) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .root
            .find(&path.segments())
            .map(Node::child_keys)
            .unwrap_or_default()
    }

    /// Set a value, creating missing holders.
    pub fn set(&self, path: &DataPath, value: impl Into<DataValue>) {
        self.set_at(path, value, unix_now());
    }

    /// Set a value with an explicit update time.
    pub fn set_at(&self, path: &DataPath, value: impl Into<DataValue>, time: i64) {
        let segs = path.segments();
        let value = value.into();
        self.run(|inner, out| inner.set(&segs, value, time, out));
    }

    /// Mark a value as outdated. No-op for missing holders.
    pub fn invalidate(&self, path: &DataPath) {
        let segs = path.segments();
        self.run(|inner, out| {
            if let Some(node) = inner.root.find_mut(&segs) {
                node.invalidate_time = unix_now();
                inner.collect(&segs, ChangeKind::INVALIDATED, out);
            }
        });
    }

    /// Delete a holder and its subtree. Bound descendants receive `Deleted`
    /// and their bindings are dropped.
    pub fn remove(&self, path: &DataPath) -> bool {
        let segs = path.segments();
        self.run(|inner, out| inner.remove(&segs, out))
    }

    /// Register a callback. Returns `None` when the holder does not exist.
    pub fn bind(&self, path: &DataPath, mode: BindMode, callback: DataCallback) -> Option<BindingId> {
        let segs = path.segments();
        let mut inner = self.inner.lock();
        inner.root.find(&segs)?;
        let id = inner.next_binding;
        inner.next_binding += 1;
        inner.bindings.entry(segs.clone()).or_default().push(Slot {
            id,
            mode,
            callback,
        });
        inner.index.insert(id, segs);
        Some(BindingId(id))
    }

    /// Drop a binding. Unknown ids (already dropped with their holder) are ignored.
    pub fn unbind(&self, id: BindingId) -> bool {
        let mut inner = self.inner.lock();
        let Some(path) = inner.index.remove(&id.0) else {
            return false;
        };
        if let Some(slots) = inner.bindings.get_mut(&path) {
            slots.retain(|s| s.id != id.0);
            if slots.is_empty() {
                inner.bindings.remove(&path);
            }
        }
        true
    }

    /// Number of live data bindings.
    pub fn binding_count(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Subscribe to structural changes. With
    /// [`ENUMERATE_EXISTING`](DeviceChangeMask::ENUMERATE_EXISTING) the current
    /// structure is replayed to `callback` before this returns.
    pub fn bind_devices(&self, mask: DeviceChangeMask, callback: DeviceCallback) -> SubscriptionId {
        let (id, replay) = {
            let mut inner = self.inner.lock();
            let id = inner.next_subscription;
            inner.next_subscription += 1;
            inner.subscriptions.push(DeviceSub {
                id,
                mask,
                callback: callback.clone(),
            });

            let mut replay = Vec::new();
            if mask.contains(DeviceChangeMask::ENUMERATE_EXISTING) {
                for node in inner.numeric_children::<NodeId>(&["devices".to_string()]) {
                    replay.push(DeviceChange::DeviceAdded(node));
                    let mut isegs = device_segments(node);
                    isegs.push("instances".into());
                    for instance in inner.numeric_children::<InstanceId>(&isegs) {
                        replay.push(DeviceChange::InstanceAdded(node, instance));
                        let mut csegs = instance_segments(node, instance);
                        csegs.push("commandClasses".into());
                        for cc in inner.numeric_children::<CcId>(&csegs) {
                            replay.push(DeviceChange::CommandAdded(CcKey::new(node, instance, cc)));
                        }
                    }
                }
                replay.retain(|c| mask.contains(c.mask()));
            }
            (id, replay)
        };
        for change in replay {
            callback(change);
        }
        SubscriptionId(id)
    }

    pub fn unbind_devices(&self, id: SubscriptionId) {
        self.inner.lock().subscriptions.retain(|s| s.id != id.0);
    }

    fn ensure_device(inner: &mut Inner, node: NodeId, out: &mut Pending) {
        let mut segs = device_segments(node);
        let fresh = !inner.root.children.get("devices").is_some_and(|d| d.children.contains_key(&node.to_string()));
        segs.push("data".into());
        inner.touch(&segs, out);
        segs.pop();
        segs.push("instances".into());
        inner.touch(&segs, out);
        if fresh {
            inner.collect_device(DeviceChange::DeviceAdded(node), out);
        }
    }

    fn ensure_instance(inner: &mut Inner, node: NodeId, instance: InstanceId, out: &mut Pending) {
        Self::ensure_device(inner, node, out);
        let mut segs = instance_segments(node, instance);
        segs.push("commandClasses".into());
        if inner.touch(&segs, out) {
            inner.collect_device(DeviceChange::InstanceAdded(node, instance), out);
        }
    }

    /// Add a node. Emits `DeviceAdded` if it is new.
    pub fn add_device(&self, node: NodeId) {
        self.run(|inner, out| Self::ensure_device(inner, node, out));
    }

    /// Add an instance (and its node). Emits `InstanceAdded` if it is new.
    pub fn add_instance(&self, node: NodeId, instance: InstanceId) {
        self.run(|inner, out| Self::ensure_instance(inner, node, instance, out));
    }

    /// Add a command class with `supported = true`, `version = 1` and
    /// `interviewDone = false`. Emits `CommandAdded` if it is new.
    pub fn add_command_class(&self, key: CcKey) {
        self.run(|inner, out| {
            Self::ensure_instance(inner, key.node, key.instance, out);
            let segs = cc_segments(key);
            if inner.touch(&segs, out) {
                let now = unix_now();
                for (name, value) in [
                    ("supported", DataValue::Bool(true)),
                    ("version", DataValue::Int(1)),
                    ("interviewDone", DataValue::Bool(false)),
                ] {
                    let mut path = segs.clone();
                    path.push(name.into());
                    inner.set(&path, value, now, out);
                }
                inner.collect_device(DeviceChange::CommandAdded(key), out);
            }
        });
    }

    /// Remove a command class. Emits `CommandRemoved` after the `Deleted` events.
    pub fn remove_command_class(&self, key: CcKey) -> bool {
        self.run(|inner, out| {
            let removed = inner.remove(&cc_node_segments(key), out);
            if removed {
                inner.collect_device(DeviceChange::CommandRemoved(key), out);
            }
            removed
        })
    }

    pub fn remove_instance(&self, node: NodeId, instance: InstanceId) -> bool {
        self.run(|inner, out| {
            let removed = inner.remove(&instance_segments(node, instance), out);
            if removed {
                inner.collect_device(DeviceChange::InstanceRemoved(node, instance), out);
            }
            removed
        })
    }

    /// Remove a node. Emits `DeviceRemoved` after the `Deleted` events.
    pub fn remove_device(&self, node: NodeId) -> bool {
        self.run(|inner, out| {
            let removed = inner.remove(&device_segments(node), out);
            if removed {
                inner.collect_device(DeviceChange::DeviceRemoved(node), out);
            }
            removed
        })
    }

    /// All node ids, ascending.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.inner
            .lock()
            .numeric_children(&["devices".to_string()])
    }

    pub fn instances(&self, node: NodeId) -> Vec<InstanceId> {
        let mut segs = device_segments(node);
        segs.push("instances".into());
        self.inner.lock().numeric_children(&segs)
    }

    pub fn command_classes(&self, node: NodeId, instance: InstanceId) -> Vec<CcId> {
        let mut segs = instance_segments(node, instance);
        segs.push("commandClasses".into());
        self.inner.lock().numeric_children(&segs)
    }

    pub fn has_command_class(&self, key: CcKey) -> bool {
        self.inner.lock().root.find(&cc_segments(key)).is_some()
    }

    /// Numeric children of a holder (sensor types, scales, channels, ...), ascending.
    pub fn numeric_children(&self, path: &DataPath) -> Vec<i64> {
        self.inner.lock().numeric_children(&path.segments())
    }

    /// Node id of the controller itself.
    pub fn controller_node_id(&self) -> Option<NodeId> {
        self.int(&DataPath::controller("nodeId"))
            .and_then(|v| NodeId::try_from(v).ok())
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}
