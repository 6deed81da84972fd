//! Build context handed to the per-class builders, and the arena of
//! per-vDev runtime state (emulate-off timers, scene settle deadlines).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use zgate_core::MetricValue;
use zgate_devices::{CommandHandler, DeviceInfo, VDevDefaults, VirtualDeviceRegistry};
use zgate_messages::NotificationSink;

use crate::binding::DataBindings;
use crate::dsk::DskEntry;
use crate::engine::ZWaveEngine;
use crate::error::Result;
use crate::postfix::{ChangeVDev, VDevChange};
use crate::tree::{BindMode, DataPath, DataTree, DataValue};
use crate::types::{vdev_namespace, CcKey, ChangeKind};

use super::handlers::CcSender;

#[derive(Default)]
struct VDevContext {
    emulate_off: Option<Duration>,
    off_timer: Option<JoinHandle<()>>,
    generation: u64,
    settle_until: Option<Instant>,
    value_bound: bool,
}

impl VDevContext {
    fn abort_timer(&mut self) -> bool {
        match self.off_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

/// Runtime state of materialized vDevs, indexed by vDev id.
pub struct VDevContexts {
    entries: Mutex<HashMap<String, VDevContext>>,
    registry: Arc<VirtualDeviceRegistry>,
}

impl VDevContexts {
    pub fn new(registry: Arc<VirtualDeviceRegistry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            registry,
        })
    }

    /// Revert `level` to `off` this long after the last `on`.
    pub fn set_emulate_off(&self, id: &str, timeout: Duration) {
        self.entries.lock().entry(id.to_string()).or_default().emulate_off = Some(timeout);
    }

    pub fn emulate_off(&self, id: &str) -> Option<Duration> {
        self.entries.lock().get(id).and_then(|c| c.emulate_off)
    }

    /// Whether an emulate-off timer is pending for `id`.
    pub fn has_timer(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|c| c.off_timer.is_some())
    }

    /// The sensor behind `id` reported `on`. Returns `false` when the vDev
    /// has no emulate-off timeout and the caller should set the level itself.
    pub fn report_on(self: &Arc<Self>, id: &str) -> bool {
        let (timeout, generation, had_timer) = {
            let mut entries = self.entries.lock();
            let Some(ctx) = entries.get_mut(id) else {
                return false;
            };
            let Some(timeout) = ctx.emulate_off else {
                return false;
            };
            let had_timer = ctx.abort_timer();
            ctx.generation += 1;
            (timeout, ctx.generation, had_timer)
        };

        let is_on = self
            .registry
            .metric(id, "level")
            .is_some_and(|v| v.as_str() == Some("on"));
        if !is_on || !had_timer {
            self.registry.set_metric(id, "level", "on");
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No runtime, emulate-off timer for {} not started", id);
                return true;
            }
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let device_id = id.to_string();
        let timer = handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(this) = weak.upgrade() {
                this.expire(&device_id, generation);
            }
        });

        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(ctx) if ctx.generation == generation => ctx.off_timer = Some(timer),
            // removed or superseded meanwhile
            _ => timer.abort(),
        }
        true
    }

    fn expire(&self, id: &str, generation: u64) {
        {
            let mut entries = self.entries.lock();
            match entries.get_mut(id) {
                Some(ctx) if ctx.generation == generation => ctx.off_timer = None,
                _ => return,
            }
        }
        tracing::debug!("Emulated off for {}", id);
        self.registry.set_metric(id, "level", "off");
    }

    /// Record that the value holder of `id` is bound.
    pub fn mark_bound(&self, id: &str) {
        self.entries.lock().entry(id.to_string()).or_default().value_bound = true;
    }

    pub fn is_bound(&self, id: &str) -> bool {
        self.entries.lock().get(id).is_some_and(|c| c.value_bound)
    }

    /// Ignore values reported for `id` during `settle`.
    pub fn start_settle(&self, id: &str, settle: Duration) {
        self.entries.lock().entry(id.to_string()).or_default().settle_until =
            Some(Instant::now() + settle);
    }

    pub fn settling(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .and_then(|c| c.settle_until)
            .is_some_and(|until| Instant::now() < until)
    }

    /// Drop the context of `id`, cancelling its timer.
    pub fn remove(&self, id: &str) {
        if let Some(mut ctx) = self.entries.lock().remove(id) {
            ctx.abort_timer();
        }
    }

    /// Drop every context whose id is `namespace` or starts with `namespace-`.
    pub fn remove_namespace(&self, namespace: &str) {
        let nested = format!("{}-", namespace);
        self.entries.lock().retain(|id, ctx| {
            let doomed = id == namespace || id.starts_with(&nested);
            if doomed {
                ctx.abort_timer();
            }
            !doomed
        });
    }

    pub fn clear(&self) {
        for (_, mut ctx) in self.entries.lock().drain() {
            ctx.abort_timer();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// What a builder may touch while materializing one command class.
pub struct BuildContext<'a> {
    pub key: CcKey,
    pub binding_name: &'a str,
    pub changes: &'a ChangeVDev,
    pub preset: Option<&'a DskEntry>,
    pub tree: &'a Arc<DataTree>,
    pub engine: &'a Arc<dyn ZWaveEngine>,
    pub registry: &'a Arc<VirtualDeviceRegistry>,
    pub notifier: &'a Arc<dyn NotificationSink>,
    pub contexts: &'a Arc<VDevContexts>,
    pub bindings: &'a mut DataBindings,
    pub settle: Duration,
    /// Set when re-running after new data keys appeared under the class.
    pub rebuild: bool,
    /// Re-runs the builder; installed by [`watch_class`](Self::watch_class).
    pub on_new_keys: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl BuildContext<'_> {
    /// `ZWayVDev_{name}_{node}-{instance}-{cc}`
    pub fn namespace(&self) -> String {
        vdev_namespace(self.binding_name, self.key)
    }

    /// Namespace of a sibling class of the same instance.
    pub fn sibling_namespace(&self, cc: u8) -> String {
        vdev_namespace(self.binding_name, self.key.with_cc(cc))
    }

    pub fn vdev_id(&self, suffix: &str) -> String {
        format!("{}-{}", self.namespace(), suffix)
    }

    /// Postfix key of the class itself: `{node}-{instance}-{cc}`.
    pub fn change_key(&self) -> String {
        self.key.to_string()
    }

    pub fn sub_change_key(&self, suffix: &str) -> String {
        format!("{}-{}", self.key, suffix)
    }

    pub fn change(&self, change_key: &str) -> Option<&VDevChange> {
        self.changes.get(change_key)
    }

    pub fn cc_path(&self, path: &str) -> DataPath {
        DataPath::cc(self.key, path)
    }

    pub fn node_path(&self, path: &str) -> DataPath {
        DataPath::device(self.key.node, path)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn sender(&self) -> CcSender {
        CcSender::new(self.engine.clone(), self.key)
    }

    pub fn device_info(&self) -> DeviceInfo {
        let major = self.tree.int(&self.node_path("applicationMajor")).unwrap_or(0);
        let minor = self.tree.int(&self.node_path("applicationMinor")).unwrap_or(0);
        DeviceInfo {
            technology: "Z-Wave".to_string(),
            manufacturer: self.tree.string(&self.node_path("vendorString")).unwrap_or_default(),
            product: self.tree.string(&self.node_path("productString")).unwrap_or_default(),
            firmware: format!("{}.{}", major, minor),
            location: self.preset.map(|p| p.location).unwrap_or(0),
        }
    }

    /// `[presetName] [vendor] title [kind] (node[.instance])`
    pub fn compile_title(&self, title: &str, kind: Option<&str>, add_vendor: bool) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(name) = self.preset.and_then(|p| p.given_name.as_deref()) {
            if !name.is_empty() {
                parts.push(name.to_string());
            }
        }
        if add_vendor {
            if let Some(vendor) = self.tree.string(&self.node_path("vendorString")) {
                if !vendor.is_empty() {
                    parts.push(vendor);
                }
            }
        }
        parts.push(title.to_string());
        if let Some(kind) = kind.filter(|k| !k.is_empty()) {
            parts.push(kind.to_string());
        }
        if self.key.instance != 0 {
            parts.push(format!("({}.{})", self.key.node, self.key.instance));
        } else {
            parts.push(format!("({})", self.key.node));
        }
        parts.join(" ")
    }

    /// Fill in info and title, then apply the postfix override for
    /// `change_key`. Returns `false` when the vDev is suppressed.
    pub fn apply_postfix(
        &self,
        defaults: &mut VDevDefaults,
        change_key: &str,
        title: &str,
        kind: Option<&str>,
    ) -> bool {
        defaults.info = self.device_info();
        defaults.set_metric("title", self.compile_title(title, kind, true));

        let Some(change) = self.change(change_key) else {
            return true;
        };
        if change.no_vdev {
            return false;
        }
        if let Some(probe_type) = &change.probe_type {
            defaults.probe_type = probe_type.clone();
        }
        if let Some(icon) = &change.icon {
            defaults.set_metric("icon", icon.as_str());
        }
        if let Some(rename) = &change.rename {
            defaults.set_metric("title", self.compile_title(rename, None, false));
        }
        defaults.visibility = !change.hide;
        defaults.permanently_hidden = change.deactivate;

        if !change.discrete_states.is_empty() && defaults.get_metric("discreteStates").is_some() {
            let states = change.discrete_states.iter().map(|(scene, state)| {
                let mut fields = Vec::new();
                if let Some(cnt) = &state.cnt {
                    fields.push(("cnt", MetricValue::from(cnt.as_str())));
                }
                if let Some(action) = &state.action {
                    fields.push(("action", MetricValue::from(action.as_str())));
                }
                if let Some(kind) = &state.kind {
                    fields.push(("type", MetricValue::from(kind.as_str())));
                }
                (scene.clone(), MetricValue::object(fields))
            });
            defaults.set_metric("discreteStates", MetricValue::object(states));
        }
        true
    }

    /// Create a vDev and seed `isFailed` from the node.
    pub fn create(
        &self,
        id: &str,
        defaults: VDevDefaults,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        self.registry.create(id, defaults, handler)?;
        self.registry
            .set_metric(id, "isFailed", self.tree.flag(&self.node_path("isFailed")));
        Ok(())
    }

    /// Bind a value callback that also receives the current value.
    pub fn bind_value<F>(&mut self, path: DataPath, callback: F) -> bool
    where
        F: Fn(ChangeKind, &DataValue) + Send + Sync + 'static,
    {
        let tree = Arc::downgrade(self.tree);
        let read = path.clone();
        self.bindings
            .bind(self.tree, &path, BindMode::Value, move |kind| {
                let Some(tree) = tree.upgrade() else {
                    return;
                };
                let value = tree.value(&read).unwrap_or_default();
                callback(kind, &value);
            })
    }

    /// Re-run the builder whenever a key appears under the class root.
    /// Installed once, on the first run.
    pub fn watch_class(&mut self) {
        if self.rebuild {
            return;
        }
        let Some(hook) = self.on_new_keys.clone() else {
            return;
        };
        let callback = Arc::new(move |kind: ChangeKind| {
            if kind.is_child_created() {
                hook();
            }
        });
        match self.tree.bind(&self.cc_path(""), BindMode::Child, callback) {
            Some(id) => self.bindings.push(id),
            None => tracing::debug!("Class {} vanished before it could be watched", self.key),
        }
    }

    /// Remove a vDev together with its context.
    pub fn remove(registry: &VirtualDeviceRegistry, contexts: &VDevContexts, id: &str) {
        contexts.remove(id);
        registry.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_emulate_off_restarts_on_every_on() {
        let registry = Arc::new(VirtualDeviceRegistry::new());
        registry
            .create(
                "s",
                VDevDefaults::new(zgate_devices::DeviceType::SensorBinary).metric("level", "off"),
                Arc::new(zgate_devices::NoopHandler),
            )
            .unwrap();
        let contexts = VDevContexts::new(registry.clone());
        assert!(!contexts.report_on("s"));

        contexts.set_emulate_off("s", Duration::from_millis(500));
        assert!(contexts.report_on("s"));
        assert_eq!(registry.metric("s", "level"), Some(MetricValue::from("on")));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(contexts.report_on("s"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(registry.metric("s", "level"), Some(MetricValue::from("on")));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.metric("s", "level"), Some(MetricValue::from("off")));
        assert!(!contexts.has_timer("s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_namespace_cancels_timers() {
        let registry = Arc::new(VirtualDeviceRegistry::new());
        let contexts = VDevContexts::new(registry);
        contexts.set_emulate_off("ns-1", Duration::from_millis(100));
        contexts.set_emulate_off("ns-10-2", Duration::from_millis(100));
        contexts.set_emulate_off("nsx", Duration::from_millis(100));
        contexts.report_on("ns-1");
        assert!(contexts.has_timer("ns-1"));

        contexts.remove_namespace("ns");
        assert_eq!(contexts.len(), 1);
        assert!(!contexts.has_timer("ns-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_window() {
        let contexts = VDevContexts::new(Arc::new(VirtualDeviceRegistry::new()));
        contexts.start_settle("ds", Duration::from_millis(1000));
        assert!(contexts.settling("ds"));
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert!(!contexts.settling("ds"));
    }
}
