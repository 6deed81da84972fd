//! Virtual device model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zgate_core::MetricValue;

/// Kind of virtual device. Determines which command verbs the UI offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "switchBinary")]
    SwitchBinary,
    #[serde(rename = "switchMultilevel")]
    SwitchMultilevel,
    #[serde(rename = "switchRGBW")]
    SwitchRgbw,
    #[serde(rename = "sensorBinary")]
    SensorBinary,
    #[serde(rename = "sensorMultilevel")]
    SensorMultilevel,
    #[serde(rename = "sensorDiscrete")]
    SensorDiscrete,
    #[serde(rename = "battery")]
    Battery,
    #[serde(rename = "doorlock")]
    Doorlock,
    #[serde(rename = "thermostat")]
    Thermostat,
    #[serde(rename = "toggleButton")]
    ToggleButton,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwitchBinary => "switchBinary",
            Self::SwitchMultilevel => "switchMultilevel",
            Self::SwitchRgbw => "switchRGBW",
            Self::SensorBinary => "sensorBinary",
            Self::SensorMultilevel => "sensorMultilevel",
            Self::SensorDiscrete => "sensorDiscrete",
            Self::Battery => "battery",
            Self::Doorlock => "doorlock",
            Self::Thermostat => "thermostat",
            Self::ToggleButton => "toggleButton",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "switchBinary" => Some(Self::SwitchBinary),
            "switchMultilevel" => Some(Self::SwitchMultilevel),
            "switchRGBW" => Some(Self::SwitchRgbw),
            "sensorBinary" => Some(Self::SensorBinary),
            "sensorMultilevel" => Some(Self::SensorMultilevel),
            "sensorDiscrete" => Some(Self::SensorDiscrete),
            "battery" => Some(Self::Battery),
            "doorlock" => Some(Self::Doorlock),
            "thermostat" => Some(Self::Thermostat),
            "toggleButton" => Some(Self::ToggleButton),
            _ => None,
        }
    }

    /// Binary-valued types report `level` as `"on"`/`"off"`.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Self::SwitchBinary | Self::SensorBinary | Self::ToggleButton | Self::Doorlock
        )
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptive information about the physical device behind a vDev.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub technology: String,
    pub manufacturer: String,
    pub product: String,
    pub firmware: String,
    /// Room id, 0 when unassigned.
    pub location: i64,
}

/// A virtual device as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualDevice {
    pub id: String,
    #[serde(rename = "deviceType")]
    pub device_type: DeviceType,
    #[serde(rename = "probeType")]
    pub probe_type: String,
    pub metrics: BTreeMap<String, MetricValue>,
    pub visibility: bool,
    pub permanently_hidden: bool,
    pub info: DeviceInfo,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds of the last metric change
    pub updated_at: i64,
}

impl VirtualDevice {
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn level(&self) -> Option<&MetricValue> {
        self.metrics.get("level")
    }

    pub fn title(&self) -> &str {
        self.metrics
            .get("title")
            .and_then(MetricValue::as_str)
            .unwrap_or_default()
    }

    pub fn is_failed(&self) -> bool {
        self.metrics
            .get("isFailed")
            .and_then(MetricValue::as_bool)
            .unwrap_or(false)
    }
}

/// Initial state of a vDev, handed to [`VirtualDeviceRegistry::create`](crate::VirtualDeviceRegistry::create).
#[derive(Debug, Clone, PartialEq)]
pub struct VDevDefaults {
    pub device_type: DeviceType,
    pub probe_type: String,
    pub metrics: BTreeMap<String, MetricValue>,
    pub visibility: bool,
    pub permanently_hidden: bool,
    pub info: DeviceInfo,
}

impl VDevDefaults {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            probe_type: String::new(),
            metrics: BTreeMap::new(),
            visibility: true,
            permanently_hidden: false,
            info: DeviceInfo::default(),
        }
    }

    pub fn probe_type(mut self, probe_type: impl Into<String>) -> Self {
        self.probe_type = probe_type.into();
        self
    }

    pub fn metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn visible(mut self, visibility: bool) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    pub fn set_metric(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.insert(name.into(), value.into());
    }

    pub fn get_metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn title(&self) -> &str {
        self.metrics
            .get("title")
            .and_then(MetricValue::as_str)
            .unwrap_or_default()
    }

    pub(crate) fn into_device(self, id: String, now: i64) -> VirtualDevice {
        VirtualDevice {
            id,
            device_type: self.device_type,
            probe_type: self.probe_type,
            metrics: self.metrics,
            visibility: self.visibility,
            permanently_hidden: self.permanently_hidden,
            info: self.info,
            created_at: now,
            updated_at: now,
        }
    }
}
