//! Command-class mapper.
//!
//! Watches the structure of the data tree and turns every interviewed
//! command class tuple `(node, instance, cc)` into virtual devices. A tuple
//! is materialized when its `interviewDone` flag becomes true and torn down
//! when the flag drops, the class disappears or the node is excluded.
//!
//! ThermostatMode and ThermostatSetPoint share one entry, keyed by the mode
//! class, so that both are built and removed together.

pub mod builders;
pub mod context;
pub mod handlers;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use zgate_core::GatewayConfig;
use zgate_devices::VirtualDeviceRegistry;
use zgate_messages::{NotificationCategory, NotificationSeverity, NotificationSink};

use crate::binding::DataBindings;
use crate::dsk::{public_key_to_dsk, DskCollection, DskEntry};
use crate::engine::{CcCommand, CcRequest, ZWaveEngine};
use crate::postfix::{
    ChangeVDev, DeviceIdentity, DirectiveScope, FixRecord, PostfixStore, PreInterviewCall,
};
use crate::tree::{BindMode, BindingId, DataPath, DataTree, DataValue, SubscriptionId};
use crate::types::{
    cc, node_prefix, vdev_namespace, vdev_prefix, CcId, CcKey, ChangeKind, DeviceChange,
    DeviceChangeMask, NodeId,
};

pub use context::{BuildContext, VDevContexts};

/// Mapper settings, usually taken from [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct MapperOptions {
    pub binding_name: String,
    pub cosmetic_on_inclusion_only: bool,
    pub pre_interview_wait: Duration,
    pub central_scene_settle: Duration,
}

impl MapperOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            binding_name: config.name.clone(),
            cosmetic_on_inclusion_only: config.cosmetic_fixes_on_inclusion_only,
            pre_interview_wait: config.pre_interview_wait(),
            central_scene_settle: config.central_scene_settle(),
        }
    }
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

struct ClassEntry {
    namespaces: Vec<String>,
    bindings: DataBindings,
    changes: Arc<ChangeVDev>,
    preset: Option<DskEntry>,
}

#[derive(Default)]
struct MapperState {
    started: bool,
    subscription: Option<SubscriptionId>,
    controller_bindings: DataBindings,
    interviews: HashMap<CcKey, BindingId>,
    classes: HashMap<CcKey, ClassEntry>,
    pre_interview_timers: HashMap<NodeId, JoinHandle<()>>,
    pre_interview_done: HashSet<NodeId>,
}

/// Key under which a class is materialized.
fn entry_key(key: CcKey) -> CcKey {
    match key.cc {
        cc::THERMOSTAT_SET_POINT => key.with_cc(cc::THERMOSTAT_MODE),
        _ => key,
    }
}

fn is_thermostat(key: CcKey) -> bool {
    key.cc == cc::THERMOSTAT_MODE
}

/// Pre-interview values are typed loosely: integers, booleans, else strings.
fn loose_value(value: &str) -> DataValue {
    if let Ok(i) = value.parse::<i64>() {
        return DataValue::Int(i);
    }
    match value {
        "true" => DataValue::Bool(true),
        "false" => DataValue::Bool(false),
        other => DataValue::Str(other.to_string()),
    }
}

/// Maps command classes of the data tree onto virtual devices.
pub struct Mapper {
    this: Weak<Mapper>,
    options: MapperOptions,
    tree: Arc<DataTree>,
    engine: Arc<dyn ZWaveEngine>,
    registry: Arc<VirtualDeviceRegistry>,
    notifier: Arc<dyn NotificationSink>,
    postfix: Arc<PostfixStore>,
    dsk: Option<Arc<DskCollection>>,
    contexts: Arc<VDevContexts>,
    state: Mutex<MapperState>,
}

impl Mapper {
    pub fn new(
        options: MapperOptions,
        tree: Arc<DataTree>,
        engine: Arc<dyn ZWaveEngine>,
        registry: Arc<VirtualDeviceRegistry>,
        notifier: Arc<dyn NotificationSink>,
        postfix: Arc<PostfixStore>,
        dsk: Option<Arc<DskCollection>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            options,
            contexts: VDevContexts::new(registry.clone()),
            tree,
            engine,
            registry,
            notifier,
            postfix,
            dsk,
            state: Mutex::new(MapperState::default()),
        })
    }

    pub fn contexts(&self) -> &Arc<VDevContexts> {
        &self.contexts
    }

    /// Subscribe to the data tree and materialize what is already there.
    pub fn start(&self) {
        {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
        }
        tracing::info!("Starting command class mapper for binding {}", self.options.binding_name);

        let mut controller = DataBindings::new();
        let weak = self.this.clone();
        let excluded = DataPath::controller("lastExcludedDevice");
        let read = excluded.clone();
        let tree = Arc::downgrade(&self.tree);
        controller.bind_without_sync(&self.tree, &excluded, move |kind| {
            if !kind.is_valid() {
                return;
            }
            let node = tree.upgrade().and_then(|t| t.int(&read));
            if let (Some(mapper), Some(node)) = (weak.upgrade(), node) {
                if let Ok(node) = NodeId::try_from(node) {
                    if node > 0 {
                        mapper.node_excluded(node);
                    }
                }
            }
        });
        self.state.lock().controller_bindings = controller;

        let weak = self.this.clone();
        let subscription = self.tree.bind_devices(
            DeviceChangeMask::COMMAND_ADDED
                | DeviceChangeMask::COMMAND_REMOVED
                | DeviceChangeMask::DEVICE_REMOVED
                | DeviceChangeMask::ENUMERATE_EXISTING,
            Arc::new(move |change: DeviceChange| {
                if let Some(mapper) = weak.upgrade() {
                    mapper.on_device_change(change);
                }
            }),
        );
        self.state.lock().subscription = Some(subscription);
    }

    /// Remove every vDev of the binding and release all bindings and timers.
    pub fn stop(&self) {
        let mut state = std::mem::take(&mut *self.state.lock());
        if let Some(subscription) = state.subscription.take() {
            self.tree.unbind_devices(subscription);
        }
        state.controller_bindings.unbind_all(&self.tree);
        for (_, id) in state.interviews.drain() {
            self.tree.unbind(id);
        }
        for (_, mut entry) in state.classes.drain() {
            entry.bindings.unbind_all(&self.tree);
        }
        for (_, timer) in state.pre_interview_timers.drain() {
            timer.abort();
        }
        self.contexts.clear();

        let ids = self.registry.ids_with_prefix(&vdev_prefix(&self.options.binding_name));
        for id in &ids {
            self.registry.remove(id);
        }
        tracing::info!("Mapper stopped, removed {} vDevs", ids.len());
    }

    /// Whether the class tuple currently has an entry.
    pub fn is_materialized(&self, key: CcKey) -> bool {
        self.state.lock().classes.contains_key(&entry_key(key))
    }

    /// Number of class entries, for diagnostics.
    pub fn materialized_count(&self) -> usize {
        self.state.lock().classes.len()
    }

    fn on_device_change(&self, change: DeviceChange) {
        match change {
            DeviceChange::CommandAdded(key) => self.command_added(key),
            DeviceChange::CommandRemoved(key) => self.command_removed(key),
            DeviceChange::DeviceRemoved(node) => self.device_removed(node),
            _ => {}
        }
    }

    fn is_static_controller(&self, node: NodeId) -> bool {
        self.tree.int(&DataPath::device(node, "basicType")) == Some(2)
            && self.tree.int(&DataPath::device(node, "specificType")) == Some(1)
    }

    fn command_added(&self, key: CcKey) {
        if self.is_static_controller(key.node) {
            return;
        }
        self.schedule_pre_interview(key.node);
        if !builders::is_mapped(key.cc) {
            return;
        }

        let weak = self.this.clone();
        let tree = Arc::downgrade(&self.tree);
        let path = DataPath::cc(key, "interviewDone");
        let read = path.clone();
        let callback: Arc<dyn Fn(ChangeKind) + Send + Sync> = Arc::new(move |kind: ChangeKind| {
            let Some(mapper) = weak.upgrade() else {
                return;
            };
            if kind.is_deleted() {
                mapper.dematerialize(key);
                return;
            }
            if !kind.is_valid() {
                return;
            }
            let done = tree.upgrade().is_some_and(|t| t.flag(&read));
            if done {
                mapper.materialize(key);
            } else {
                mapper.dematerialize(key);
            }
        });

        {
            let mut state = self.state.lock();
            if state.interviews.contains_key(&key) {
                return;
            }
            match self.tree.bind(&path, BindMode::Value, callback.clone()) {
                Some(id) => {
                    state.interviews.insert(key, id);
                }
                None => {
                    tracing::debug!("No interview state for {}", key);
                    return;
                }
            }
        }
        callback(ChangeKind::UPDATED);
    }

    fn command_removed(&self, key: CcKey) {
        let binding = self.state.lock().interviews.remove(&key);
        if let Some(id) = binding {
            self.tree.unbind(id);
        }
        self.dematerialize(key);
    }

    fn device_removed(&self, node: NodeId) {
        let (bindings, keys): (Vec<BindingId>, Vec<CcKey>) = {
            let mut state = self.state.lock();
            let doomed: Vec<CcKey> = state.interviews.keys().filter(|k| k.node == node).copied().collect();
            let bindings = doomed.iter().filter_map(|k| state.interviews.remove(k)).collect();
            let keys = state.classes.keys().filter(|k| k.node == node).copied().collect();
            if let Some(timer) = state.pre_interview_timers.remove(&node) {
                timer.abort();
            }
            (bindings, keys)
        };
        for id in bindings {
            self.tree.unbind(id);
        }
        for key in keys {
            self.dematerialize(key);
        }
    }

    fn identity(&self, node: NodeId) -> DeviceIdentity {
        let int = |name: &str| self.tree.int(&DataPath::device(node, name)).unwrap_or(0);
        DeviceIdentity {
            manufacturer_id: int("manufacturerId"),
            product_type: int("manufacturerProductType"),
            product_id: int("manufacturerProductId"),
            app_major: int("applicationMajor"),
            app_minor: int("applicationMinor"),
        }
    }

    fn is_including(&self, node: NodeId) -> bool {
        self.tree.int(&DataPath::controller("lastIncludedDevice")) == Some(node as i64)
    }

    fn collect_changes(&self, key: CcKey, fixes: &[FixRecord], including: bool) -> ChangeVDev {
        let scope = |class: CcId| DirectiveScope {
            node: key.node,
            instance: key.instance,
            cc: class,
            including,
            cosmetic_on_inclusion_only: self.options.cosmetic_on_inclusion_only,
        };
        let mut changes = ChangeVDev::collect(fixes, &scope(key.cc), self.notifier.as_ref());
        if is_thermostat(key) {
            changes.merge(ChangeVDev::collect(
                fixes,
                &scope(cc::THERMOSTAT_SET_POINT),
                self.notifier.as_ref(),
            ));
        }
        changes
    }

    /// Smart-start entry of a node included via S2, marked as included.
    /// It only presets names while the node is being included.
    fn smart_start_preset(&self, node: NodeId, including: bool) -> Option<DskEntry> {
        let dsk = self.dsk.as_ref()?;
        let key = self.tree.value(&DataPath::cc(CcKey::new(node, 0, cc::SECURITY_2), "publicKey"))?;
        let dsk_string = public_key_to_dsk(key.as_bytes()?)?;
        match dsk.mark_included(&dsk_string, node) {
            Ok(entry) => entry.filter(|_| including),
            Err(e) => {
                tracing::warn!("Cannot update DSK entry of node {}: {}", node, e);
                None
            }
        }
    }

    fn materialize(&self, key: CcKey) {
        let entry_key = entry_key(key);
        if is_thermostat(entry_key) && !builders::thermostat_ready(&self.tree, entry_key) {
            return;
        }
        if self.state.lock().classes.contains_key(&entry_key) {
            return;
        }

        let node = key.node;
        let including = self.is_including(node);
        let fixes = self.postfix.lookup(&self.identity(node));
        let changes = self.collect_changes(entry_key, &fixes, including);
        let preset = self.smart_start_preset(node, including);

        if changes.suppressed(&entry_key.to_string()) {
            tracing::debug!("{} suppressed by noVDev", entry_key);
            return;
        }

        let namespaces = if is_thermostat(entry_key) {
            vec![
                vdev_namespace(&self.options.binding_name, entry_key),
                vdev_namespace(&self.options.binding_name, entry_key.with_cc(cc::THERMOSTAT_SET_POINT)),
            ]
        } else {
            vec![vdev_namespace(&self.options.binding_name, entry_key)]
        };
        let changes = Arc::new(changes);
        {
            let mut state = self.state.lock();
            if state.classes.contains_key(&entry_key) {
                return;
            }
            state.classes.insert(
                entry_key,
                ClassEntry {
                    namespaces,
                    bindings: DataBindings::new(),
                    changes: changes.clone(),
                    preset: preset.clone(),
                },
            );
        }
        tracing::debug!("Materializing {}", entry_key);
        self.build(entry_key, &changes, preset.as_ref(), false);
        self.name_node(node, &changes, preset.as_ref());
    }

    fn build(&self, key: CcKey, changes: &ChangeVDev, preset: Option<&DskEntry>, rebuild: bool) {
        let weak = self.this.clone();
        let on_new_keys: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(mapper) = weak.upgrade() {
                mapper.rebuild(key);
            }
        });
        let mut bindings = DataBindings::new();
        let mut ctx = BuildContext {
            key,
            binding_name: &self.options.binding_name,
            changes,
            preset,
            tree: &self.tree,
            engine: &self.engine,
            registry: &self.registry,
            notifier: &self.notifier,
            contexts: &self.contexts,
            bindings: &mut bindings,
            settle: self.options.central_scene_settle,
            rebuild,
            on_new_keys: Some(on_new_keys),
        };
        if let Err(e) = builders::build(&mut ctx) {
            tracing::error!("Cannot map {}: {}", key, e);
            self.notifier.notify(
                NotificationSeverity::Error,
                &format!("{}: {}", key, e),
                NotificationCategory::Core,
            );
        }

        let mut state = self.state.lock();
        match state.classes.get_mut(&key) {
            Some(entry) => entry.bindings.extend(bindings),
            None => {
                drop(state);
                // torn down while building
                bindings.unbind_all(&self.tree);
            }
        }
    }

    /// New data keys appeared under a materialized class.
    fn rebuild(&self, key: CcKey) {
        let (changes, preset) = {
            let state = self.state.lock();
            match state.classes.get(&key) {
                Some(entry) => (entry.changes.clone(), entry.preset.clone()),
                None => return,
            }
        };
        self.build(key, &changes, preset.as_ref(), true);
    }

    fn dematerialize(&self, key: CcKey) {
        let entry_key = entry_key(key);
        let Some(mut entry) = self.state.lock().classes.remove(&entry_key) else {
            return;
        };
        tracing::debug!("Dematerializing {}", entry_key);
        entry.bindings.unbind_all(&self.tree);
        for namespace in &entry.namespaces {
            let nested = format!("{}-", namespace);
            for id in self.registry.ids_with_prefix(namespace) {
                if id == *namespace || id.starts_with(&nested) {
                    self.registry.remove(&id);
                }
            }
            self.contexts.remove_namespace(namespace);
        }

        // the other half of the thermostat pair may still be mapped
        if is_thermostat(entry_key) && builders::thermostat_ready(&self.tree, entry_key) {
            self.materialize(entry_key);
        }
    }

    fn name_node(&self, node: NodeId, changes: &ChangeVDev, preset: Option<&DskEntry>) {
        let path = DataPath::device(node, "givenName");
        if let Some(name) = changes.node_name.as_deref().filter(|n| !n.is_empty()) {
            if self.tree.string(&path).as_deref() != Some(name) {
                self.tree.set(&path, name);
            }
            return;
        }
        if self.tree.string(&path).is_some_and(|n| !n.is_empty()) {
            return;
        }
        let name = match preset.and_then(|p| p.given_name.clone()).filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => {
                let listening = self.tree.flag(&DataPath::device(node, "isListening"));
                let kind = if listening { "Mains" } else { "Battery" };
                format!("{}Device _{}", kind, node)
            }
        };
        self.tree.set(&path, name);
    }

    fn node_excluded(&self, node: NodeId) {
        tracing::info!("Node {} excluded, removing its vDevs", node);
        let keys: Vec<CcKey> = self.state.lock().classes.keys().filter(|k| k.node == node).copied().collect();
        for key in keys {
            self.dematerialize(key);
        }

        let prefix = node_prefix(&self.options.binding_name, node);
        for id in self.registry.ids_with_prefix(&prefix) {
            self.contexts.remove(&id);
            self.registry.remove(&id);
        }
        for id in self.registry.known_ids_with_prefix(&prefix) {
            self.registry.cleanup(&id);
        }
        {
            let mut state = self.state.lock();
            state.pre_interview_done.remove(&node);
            if let Some(timer) = state.pre_interview_timers.remove(&node) {
                timer.abort();
            }
        }
        if let Some(dsk) = &self.dsk {
            if let Err(e) = dsk.reset_pending_for_node(node) {
                tracing::warn!("Cannot reset DSK entry of node {}: {}", node, e);
            }
        }
    }

    fn interview_complete(&self, node: NodeId) -> bool {
        self.tree.instances(node).into_iter().all(|instance| {
            self.tree
                .command_classes(node, instance)
                .into_iter()
                .all(|cc| self.tree.flag(&DataPath::cc(CcKey::new(node, instance, cc), "interviewDone")))
        })
    }

    /// Arm the pre-interview timer of a node being included.
    fn schedule_pre_interview(&self, node: NodeId) {
        if !self.is_including(node) {
            return;
        }
        {
            let state = self.state.lock();
            if state.pre_interview_done.contains(&node) || state.pre_interview_timers.contains_key(&node) {
                return;
            }
        }
        let fixes = self.postfix.lookup(&self.identity(node));
        if fixes.iter().all(|f| f.pre_interview().is_empty()) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime, pre-interview fixes of node {} not scheduled", node);
            return;
        };

        let weak = self.this.clone();
        let wait = self.options.pre_interview_wait;
        let timer = handle.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(mapper) = weak.upgrade() {
                mapper.state.lock().pre_interview_timers.remove(&node);
                if !mapper.interview_complete(node) {
                    mapper.run_pre_interview(node);
                }
            }
        });
        self.state.lock().pre_interview_timers.insert(node, timer);
    }

    /// Apply `preInterview` fixes of a node, once.
    pub fn run_pre_interview(&self, node: NodeId) {
        if !self.state.lock().pre_interview_done.insert(node) {
            return;
        }
        let fixes = self.postfix.lookup(&self.identity(node));
        for fix in &fixes {
            for entry in fix.pre_interview() {
                match PreInterviewCall::parse(entry) {
                    Ok(call) => self.pre_interview_call(node, call),
                    Err(e) => {
                        tracing::warn!("Postfix {}: rejected '{}': {}", fix.p_id, entry, e);
                        self.notifier.notify(
                            NotificationSeverity::Warning,
                            &format!("Postfix {}: rejected '{}': {}", fix.p_id, entry, e),
                            NotificationCategory::Module,
                        );
                    }
                }
            }
        }
    }

    fn pre_interview_call(&self, node: NodeId, call: PreInterviewCall) {
        match call {
            PreInterviewCall::SetConfig {
                instance,
                parameter,
                value,
                size,
            } => {
                let key = CcKey::new(node, instance, cc::CONFIGURATION);
                let current = self.tree.int(&DataPath::cc(key, &format!("{}.val", parameter)));
                if current == Some(value) {
                    return;
                }
                let request = CcRequest::new(key, CcCommand::ConfigurationSet { parameter, value, size });
                if let Err(e) = self.engine.send(request) {
                    tracing::warn!("Pre-interview setConfig on {} failed: {}", key, e);
                }
            }
            PreInterviewCall::SetCcData {
                instance,
                cc,
                data_type,
                key,
                value,
            } => {
                let holder = DataPath::cc(CcKey::new(node, instance, cc), &data_type);
                if self.tree.exists(&holder) {
                    self.tree.set(&holder.child(&key), loose_value(&value));
                }
            }
            PreInterviewCall::SetDeviceData { data_type, key, value } => {
                let holder = DataPath::device(node, &data_type);
                if self.tree.exists(&holder) {
                    self.tree.set(&holder.child(&key), loose_value(&value));
                }
            }
            PreInterviewCall::RenameNode { name } => {
                self.tree.set(&DataPath::device(node, "givenName"), name);
            }
        }
    }
}

impl Drop for Mapper {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, timer) in state.pre_interview_timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_key_joins_thermostat() {
        let setpoint = CcKey::new(3, 0, cc::THERMOSTAT_SET_POINT);
        assert_eq!(entry_key(setpoint), CcKey::new(3, 0, cc::THERMOSTAT_MODE));
        let meter = CcKey::new(3, 1, cc::METER);
        assert_eq!(entry_key(meter), meter);
    }

    #[test]
    fn test_loose_value() {
        assert_eq!(loose_value("12"), DataValue::Int(12));
        assert_eq!(loose_value("true"), DataValue::Bool(true));
        assert_eq!(loose_value("Kitchen"), DataValue::Str("Kitchen".to_string()));
    }
}
