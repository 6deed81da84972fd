//! Virtual device registry.
//!
//! Devices and their handlers live in concurrent maps. No map guard is ever
//! held while a handler runs or an event is published, so handlers may read
//! and write the registry freely.

use std::sync::Arc;

use dashmap::DashMap;
use zgate_core::{unix_now, EventBus, GatewayEvent, MetricValue};

use crate::command::{CommandArgs, CommandHandler, HandlerContext, Verb};
use crate::device::{VDevDefaults, VirtualDevice};
use crate::error::{DeviceError, Result};

/// Registry of virtual devices.
pub struct VirtualDeviceRegistry {
    devices: DashMap<String, VirtualDevice>,
    handlers: DashMap<String, Arc<dyn CommandHandler>>,
    /// Ids ever created and not yet cleaned up, with first creation time.
    known: DashMap<String, i64>,
    event_bus: Option<EventBus>,
}

impl VirtualDeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
            handlers: DashMap::new(),
            known: DashMap::new(),
            event_bus: None,
        }
    }

    /// Publish lifecycle and metric events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    fn publish(&self, event: GatewayEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_with_source(event, "registry");
        }
    }

    /// Create a device. Fails if `id` is already present.
    pub fn create(
        &self,
        id: impl Into<String>,
        defaults: VDevDefaults,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<VirtualDevice> {
        let id = id.into();
        let now = unix_now();
        let device = match self.devices.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(DeviceError::AlreadyExists(id));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let device = defaults.into_device(id.clone(), now);
                slot.insert(device.clone());
                device
            }
        };
        self.handlers.insert(id.clone(), handler);
        self.known.entry(id.clone()).or_insert(now);

        tracing::debug!("Created vDev {} ({})", id, device.device_type);
        self.publish(GatewayEvent::DeviceCreated {
            device_id: id,
            device_type: device.device_type.as_str().to_string(),
        });
        Ok(device)
    }

    pub fn get(&self, id: &str) -> Option<VirtualDevice> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// All devices sorted by id.
    pub fn list(&self) -> Vec<VirtualDevice> {
        let mut devices: Vec<VirtualDevice> =
            self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Ids starting with `prefix`, sorted.
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .devices
            .iter()
            .filter(|d| d.key().starts_with(prefix))
            .map(|d| d.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Remove a device. Removing an absent id is a no-op returning `false`.
    pub fn remove(&self, id: &str) -> bool {
        self.handlers.remove(id);
        if self.devices.remove(id).is_some() {
            tracing::debug!("Removed vDev {}", id);
            self.publish(GatewayEvent::DeviceRemoved {
                device_id: id.to_string(),
            });
            true
        } else {
            false
        }
    }

    /// Forget that `id` ever existed.
    pub fn cleanup(&self, id: &str) {
        self.known.remove(id);
    }

    /// Whether `id` was created at some point and not cleaned up since.
    pub fn was_created(&self, id: &str) -> bool {
        self.known.contains_key(id)
    }

    /// Ids remembered by [`was_created`](Self::was_created) that start with `prefix`.
    pub fn known_ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.known
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn metric(&self, id: &str, name: &str) -> Option<MetricValue> {
        self.devices
            .get(id)
            .and_then(|d| d.metrics.get(name).cloned())
    }

    /// Set a metric. Returns `false` if the device does not exist.
    ///
    /// An event is published only when the value actually changes.
    pub fn set_metric(&self, id: &str, name: &str, value: impl Into<MetricValue>) -> bool {
        let value = value.into();
        let changed = {
            let Some(mut device) = self.devices.get_mut(id) else {
                return false;
            };
            if device.metrics.get(name) == Some(&value) {
                false
            } else {
                device.metrics.insert(name.to_string(), value.clone());
                device.updated_at = unix_now();
                true
            }
        };

        if changed {
            self.publish(GatewayEvent::MetricChanged {
                device_id: id.to_string(),
                metric: name.to_string(),
                value,
            });
        }
        true
    }

    /// Set several metrics at once.
    pub fn set_metrics<I>(&self, id: &str, metrics: I) -> bool
    where
        I: IntoIterator<Item = (&'static str, MetricValue)>,
    {
        if !self.contains(id) {
            return false;
        }
        for (name, value) in metrics {
            self.set_metric(id, name, value);
        }
        true
    }

    /// Mutate non-metric fields of a device.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut VirtualDevice),
    {
        match self.devices.get_mut(id) {
            Some(mut device) => {
                f(&mut device);
                true
            }
            None => false,
        }
    }

    /// Set `isFailed` on every device whose id starts with `prefix`.
    /// Returns the number of devices touched.
    pub fn set_failed_for_prefix(&self, prefix: &str, failed: bool) -> usize {
        let ids = self.ids_with_prefix(prefix);
        for id in &ids {
            self.set_metric(id, "isFailed", failed);
        }
        ids.len()
    }

    /// Invoke the device's handler with a verb given as text.
    pub fn dispatch(&self, id: &str, command: &str, args: &CommandArgs) -> Result<()> {
        let verb = Verb::from_string(command).ok_or_else(|| DeviceError::UnsupportedCommand {
            device: id.to_string(),
            command: command.to_string(),
        })?;
        self.dispatch_verb(id, verb, args)
    }

    /// Invoke the device's handler synchronously.
    pub fn dispatch_verb(&self, id: &str, verb: Verb, args: &CommandArgs) -> Result<()> {
        let handler = self
            .handlers
            .get(id)
            .map(|h| h.value().clone())
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))?;

        let ctx = HandlerContext {
            device_id: id,
            registry: self,
        };
        handler.handle(&ctx, verb, args)?;

        self.publish(GatewayEvent::CommandDispatched {
            device_id: id.to_string(),
            command: verb.as_str().to_string(),
        });
        Ok(())
    }
}

impl Default for VirtualDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
