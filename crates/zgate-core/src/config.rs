//! Gateway configuration.
//!
//! Configuration is read from a TOML file and then overridden by `ZGATE_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) yields a working gateway.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    /// Binding name used in every virtual device id.
    pub const BINDING_NAME: &str = "zway";
    /// Directory holding the object store.
    pub const DATA_DIR: &str = "./data";
    /// Dead-detection sweep over sleeping nodes, once a day.
    pub const DEAD_DETECTION_INTERVAL_SECS: u64 = 24 * 60 * 60;
    /// Clock synchronisation, once a day.
    pub const TIME_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;
    /// How long a freshly included node may take to finish its interview
    /// before pre-interview fixes are applied.
    pub const PRE_INTERVIEW_WAIT_MS: u64 = 5_000;
    /// Central scene values reported right after creation are ignored for this long.
    pub const CENTRAL_SCENE_SETTLE_MS: u64 = 1_000;
}

/// Environment variable names.
pub mod env_vars {
    pub const NAME: &str = "ZGATE_NAME";
    pub const DATA_DIR: &str = "ZGATE_DATA_DIR";
    pub const POSTFIX_FILE: &str = "ZGATE_POSTFIX_FILE";
    pub const COSMETIC_FIXES_ON_INCLUSION_ONLY: &str = "ZGATE_COSMETIC_FIXES_ON_INCLUSION_ONLY";
    pub const DEAD_DETECTION_INTERVAL_SECS: &str = "ZGATE_DEAD_DETECTION_INTERVAL_SECS";
    pub const TIME_SYNC: &str = "ZGATE_TIME_SYNC";
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Binding name, part of every vDev id (`ZWayVDev_{name}_...`).
    pub name: String,
    /// Directory for the redb object store.
    pub data_dir: PathBuf,
    /// Optional built-in postfix file shipped next to the binary.
    pub postfix_file: Option<PathBuf>,
    /// Apply rename/hide/deactivate/icon/probeType/discreteState/renameNode
    /// fixes only while the node is being included.
    pub cosmetic_fixes_on_inclusion_only: bool,
    /// Interval of the sleeping-node liveness sweep.
    pub dead_detection_interval_secs: u64,
    /// Send Clock/TimeParameters updates periodically.
    pub time_sync: bool,
    /// Interval of the clock synchronisation.
    pub time_sync_interval_secs: u64,
    /// Bounded wait before pre-interview fixes run.
    pub pre_interview_wait_ms: u64,
    /// Startup settle time of central scene vDevs.
    pub central_scene_settle_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: defaults::BINDING_NAME.to_string(),
            data_dir: PathBuf::from(defaults::DATA_DIR),
            postfix_file: None,
            cosmetic_fixes_on_inclusion_only: true,
            dead_detection_interval_secs: defaults::DEAD_DETECTION_INTERVAL_SECS,
            time_sync: true,
            time_sync_interval_secs: defaults::TIME_SYNC_INTERVAL_SECS,
            pre_interview_wait_ms: defaults::PRE_INTERVIEW_WAIT_MS,
            central_scene_settle_ms: defaults::CENTRAL_SCENE_SETTLE_MS,
        }
    }
}

impl GatewayConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::debug!("Loaded gateway config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Load from `path` if given and present, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                tracing::warn!("Config file {} not found, using defaults", p.display());
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Apply `ZGATE_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(env_vars::NAME) {
            self.name = name;
        }
        if let Some(dir) = lookup(env_vars::DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(env_vars::POSTFIX_FILE) {
            self.postfix_file = Some(PathBuf::from(file));
        }
        if let Some(flag) = lookup(env_vars::COSMETIC_FIXES_ON_INCLUSION_ONLY)
            .and_then(|v| v.parse().ok())
        {
            self.cosmetic_fixes_on_inclusion_only = flag;
        }
        if let Some(secs) =
            lookup(env_vars::DEAD_DETECTION_INTERVAL_SECS).and_then(|v| v.parse().ok())
        {
            self.dead_detection_interval_secs = secs;
        }
        if let Some(flag) = lookup(env_vars::TIME_SYNC).and_then(|v| v.parse().ok()) {
            self.time_sync = flag;
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfiguration(
                "binding name must not be empty".to_string(),
            ));
        }
        // The name is embedded in vDev ids which are split on '_' and '-'.
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidConfiguration(format!(
                "binding name '{}' must be alphanumeric",
                self.name
            )));
        }
        if self.dead_detection_interval_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "dead_detection_interval_secs must be positive".to_string(),
            ));
        }
        if self.time_sync && self.time_sync_interval_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "time_sync_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the redb object store inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("zgate.redb")
    }

    pub fn dead_detection_interval(&self) -> Duration {
        Duration::from_secs(self.dead_detection_interval_secs)
    }

    pub fn time_sync_interval(&self) -> Duration {
        Duration::from_secs(self.time_sync_interval_secs)
    }

    pub fn pre_interview_wait(&self) -> Duration {
        Duration::from_millis(self.pre_interview_wait_ms)
    }

    pub fn central_scene_settle(&self) -> Duration {
        Duration::from_millis(self.central_scene_settle_ms)
    }
}
