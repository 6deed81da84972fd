//! Postfix fix records: built-in list plus the custom overlay.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zgate_core::unix_now;
use zgate_storage::{load_json, save_json, ObjectStore};

use crate::error::{Result, ZWaveError};

/// Object name of the custom overlay.
pub const CUSTOM_OBJECT: &str = "postfix";
/// Object name of a downloaded built-in list that supersedes the bundled one.
pub const UPDATED_OBJECT: &str = "postfixUpdated";

/// One fix record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRecord {
    #[serde(default)]
    pub id: u64,
    pub p_id: String,
    #[serde(rename = "preInterview", default, skip_serializing_if = "Option::is_none")]
    pub pre_interview: Option<Vec<String>>,
    #[serde(rename = "postInterview", default, skip_serializing_if = "Option::is_none")]
    pub post_interview: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
    /// Descriptive fields (product name, comments, ...) kept as is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FixRecord {
    pub fn new(p_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            p_id: p_id.into(),
            pre_interview: None,
            post_interview: None,
            last_update: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_post_interview<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_interview = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pre_interview<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_interview = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    pub fn pre_interview(&self) -> &[String] {
        self.pre_interview.as_deref().unwrap_or_default()
    }

    pub fn post_interview(&self) -> &[String] {
        self.post_interview.as_deref().unwrap_or_default()
    }

    /// Copy every field present in `other` onto `self`, keeping `self.id`.
    fn assign(&mut self, other: &FixRecord) {
        if other.pre_interview.is_some() {
            self.pre_interview = other.pre_interview.clone();
        }
        if other.post_interview.is_some() {
            self.post_interview = other.post_interview.clone();
        }
        if other.last_update.is_some() {
            self.last_update = other.last_update;
        }
        for (k, v) in &other.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }
}

/// A fix list as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostfixFile {
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub fixes: Vec<FixRecord>,
}

impl PostfixFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn next_id(&self) -> u64 {
        self.fixes.iter().map(|f| f.id).max().map_or(1, |max| max + 1)
    }
}

/// Identity of a node used for fix lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer_id: i64,
    pub product_type: i64,
    pub product_id: i64,
    pub app_major: i64,
    pub app_minor: i64,
}

impl DeviceIdentity {
    /// `p_id` patterns matching this identity, least specific first.
    /// Empty unless manufacturer, product type and product id are known.
    pub fn patterns(&self) -> Vec<String> {
        if self.manufacturer_id == 0 || self.product_type == 0 || self.product_id == 0 {
            return Vec::new();
        }
        let device = format!(
            "{}.{}.{}",
            self.manufacturer_id, self.product_type, self.product_id
        );
        let mut patterns = vec![self.manufacturer_id.to_string(), device.clone()];
        if self.app_major != 0 {
            patterns.push(format!("{}.{}", device, self.app_major));
            patterns.push(format!("{}.{}.{}", device, self.app_major, self.app_minor));
        }
        patterns
    }
}

/// Merged postfix rules.
pub struct PostfixStore {
    bundled: PostfixFile,
    builtin: RwLock<PostfixFile>,
    custom: RwLock<PostfixFile>,
    merged: RwLock<Vec<FixRecord>>,
    store: Arc<dyn ObjectStore>,
}

impl PostfixStore {
    /// Open with the bundled list at `builtin` (if any) and the overlay from `store`.
    pub fn open(builtin: Option<&Path>, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let bundled = match builtin {
            Some(path) if path.exists() => PostfixFile::load(path)?,
            Some(path) => {
                tracing::warn!("Postfix file {} not found, starting without built-in fixes", path.display());
                PostfixFile::default()
            }
            None => PostfixFile::default(),
        };
        Self::with_builtin(bundled, store)
    }

    pub fn with_builtin(bundled: PostfixFile, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let this = Self {
            bundled,
            builtin: RwLock::new(PostfixFile::default()),
            custom: RwLock::new(PostfixFile::default()),
            merged: RwLock::new(Vec::new()),
            store,
        };
        this.reload()?;
        Ok(this)
    }

    /// Re-read persisted state and rebuild the merged list.
    pub fn reload(&self) -> Result<()> {
        let mut builtin = self.bundled.clone();
        if let Some(updated) = load_json::<PostfixFile>(self.store.as_ref(), UPDATED_OBJECT)? {
            if updated.last_update > builtin.last_update {
                tracing::info!("Using updated postfix list from {}", updated.last_update);
                builtin = updated;
            }
        }
        let custom = load_json::<PostfixFile>(self.store.as_ref(), CUSTOM_OBJECT)?.unwrap_or_default();

        *self.merged.write() = merge(&builtin, &custom);
        *self.builtin.write() = builtin;
        *self.custom.write() = custom;
        Ok(())
    }

    /// Install a downloaded built-in list. Ignored unless it is newer than
    /// the current one and not empty.
    pub fn install_update(&self, file: PostfixFile) -> Result<bool> {
        if file.fixes.is_empty() || file.last_update <= self.builtin.read().last_update {
            return Ok(false);
        }
        save_json(self.store.as_ref(), UPDATED_OBJECT, &file)?;
        self.reload()?;
        Ok(true)
    }

    /// Built-in and custom fixes merged.
    pub fn fixes(&self) -> Vec<FixRecord> {
        self.merged.read().clone()
    }

    /// The custom overlay only.
    pub fn custom(&self) -> PostfixFile {
        self.custom.read().clone()
    }

    pub fn builtin_last_update(&self) -> i64 {
        self.builtin.read().last_update
    }

    /// Fixes for `identity`, least specific first. Later fixes win.
    pub fn lookup(&self, identity: &DeviceIdentity) -> Vec<FixRecord> {
        let patterns = identity.patterns();
        if patterns.is_empty() {
            return Vec::new();
        }
        let merged = self.merged.read();
        let mut found = Vec::new();
        for pattern in &patterns {
            found.extend(merged.iter().filter(|f| &f.p_id == pattern).cloned());
        }
        found
    }

    /// Add a custom fix, or merge it into the custom fix with the same `p_id`.
    pub fn add(&self, fix: FixRecord) -> Result<FixRecord> {
        let stored = {
            let mut custom = self.custom.write();
            let now = unix_now();
            let stored = match custom.fixes.iter_mut().find(|f| f.p_id == fix.p_id) {
                Some(existing) => {
                    existing.assign(&fix);
                    existing.last_update = Some(now);
                    existing.clone()
                }
                None => {
                    let mut fix = fix;
                    fix.id = custom.next_id();
                    fix.last_update = Some(now);
                    custom.fixes.push(fix.clone());
                    fix
                }
            };
            custom.last_update = now;
            save_json(self.store.as_ref(), CUSTOM_OBJECT, &*custom)?;
            stored
        };
        self.rebuild();
        tracing::info!("Stored custom postfix {}", stored.p_id);
        Ok(stored)
    }

    /// Update an existing custom fix.
    pub fn update(&self, fix: FixRecord) -> Result<FixRecord> {
        if !self.custom.read().fixes.iter().any(|f| f.p_id == fix.p_id) {
            return Err(ZWaveError::NotFound(format!("postfix {}", fix.p_id)));
        }
        self.add(fix)
    }

    /// Remove a custom fix.
    pub fn remove(&self, p_id: &str) -> Result<FixRecord> {
        let removed = {
            let mut custom = self.custom.write();
            let index = custom
                .fixes
                .iter()
                .position(|f| f.p_id == p_id)
                .ok_or_else(|| ZWaveError::NotFound(format!("postfix {}", p_id)))?;
            let removed = custom.fixes.remove(index);
            custom.last_update = unix_now();
            save_json(self.store.as_ref(), CUSTOM_OBJECT, &*custom)?;
            removed
        };
        self.rebuild();
        tracing::info!("Removed custom postfix {}", p_id);
        Ok(removed)
    }

    fn rebuild(&self) {
        let merged = merge(&self.builtin.read(), &self.custom.read());
        *self.merged.write() = merged;
    }
}

/// Custom fixes overwrite built-in fixes with the same `p_id` (keeping the
/// built-in id); the rest are appended with fresh ids.
fn merge(builtin: &PostfixFile, custom: &PostfixFile) -> Vec<FixRecord> {
    let mut fixes = builtin.fixes.clone();
    for fix in &custom.fixes {
        match fixes.iter_mut().find(|f| f.p_id == fix.p_id) {
            Some(existing) => existing.assign(fix),
            None => {
                let id = fixes.iter().map(|f| f.id).max().map_or(1, |max| max + 1);
                let mut fix = fix.clone();
                fix.id = id;
                fixes.push(fix);
            }
        }
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use zgate_storage::MemoryObjectStore;

    fn builtin() -> PostfixFile {
        PostfixFile {
            last_update: 100,
            fixes: vec![
                FixRecord {
                    id: 1,
                    ..FixRecord::new("271").with_post_interview(["rename,0-37,Fibaro"])
                },
                FixRecord {
                    id: 2,
                    ..FixRecord::new("271.1538.4096").with_post_interview(["rename,0-37,Wall Plug"])
                },
            ],
        }
    }

    #[test]
    fn test_lookup_orders_by_specificity() {
        let store = PostfixStore::with_builtin(builtin(), Arc::new(MemoryObjectStore::new())).unwrap();
        let identity = DeviceIdentity {
            manufacturer_id: 271,
            product_type: 1538,
            product_id: 4096,
            app_major: 3,
            app_minor: 2,
        };
        let ids: Vec<String> = store.lookup(&identity).into_iter().map(|f| f.p_id).collect();
        assert_eq!(ids, vec!["271".to_string(), "271.1538.4096".to_string()]);

        let unknown = DeviceIdentity {
            product_id: 0,
            ..identity
        };
        assert!(store.lookup(&unknown).is_empty());
    }

    #[test]
    fn test_custom_overlay_merges_and_persists() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = PostfixStore::with_builtin(builtin(), objects.clone()).unwrap();

        let overridden = store
            .add(FixRecord::new("271.1538.4096").with_post_interview(["hide,0-37"]))
            .unwrap();
        assert_eq!(overridden.id, 1);
        let added = store
            .add(FixRecord::new("134").with_post_interview(["noVDev,0-48"]))
            .unwrap();
        assert_eq!(added.id, 2);

        let fixes = store.fixes();
        assert_eq!(fixes.len(), 3);
        let merged = fixes.iter().find(|f| f.p_id == "271.1538.4096").unwrap();
        assert_eq!(merged.id, 2);
        assert_eq!(merged.post_interview(), ["hide,0-37".to_string()]);
        assert_eq!(fixes.iter().find(|f| f.p_id == "134").unwrap().id, 3);

        // survives a restart
        let reopened = PostfixStore::with_builtin(builtin(), objects).unwrap();
        assert_eq!(reopened.fixes(), fixes);
        assert_eq!(reopened.custom().fixes.len(), 2);
    }

    #[test]
    fn test_update_and_remove_unknown() {
        let store = PostfixStore::with_builtin(builtin(), Arc::new(MemoryObjectStore::new())).unwrap();
        assert!(matches!(
            store.update(FixRecord::new("999")),
            Err(ZWaveError::NotFound(_))
        ));
        assert!(matches!(store.remove("271"), Err(ZWaveError::NotFound(_))));

        store.add(FixRecord::new("999")).unwrap();
        store.remove("999").unwrap();
        assert_eq!(store.fixes().len(), 2);
    }

    #[test]
    fn test_newer_builtin_replaces_bundled() {
        let store = PostfixStore::with_builtin(builtin(), Arc::new(MemoryObjectStore::new())).unwrap();
        let older = PostfixFile {
            last_update: 50,
            fixes: vec![FixRecord::new("1")],
        };
        assert!(!store.install_update(older).unwrap());

        let newer = PostfixFile {
            last_update: 200,
            fixes: vec![FixRecord::new("1")],
        };
        assert!(store.install_update(newer).unwrap());
        assert_eq!(store.builtin_last_update(), 200);
        assert_eq!(store.fixes().len(), 1);
    }

    #[test]
    fn test_extra_fields_roundtrip() {
        let fix: FixRecord = serde_json::from_str(
            r#"{"id":4,"p_id":"1.2.3","product":"Dimmer","postInterview":["hide,0-38"]}"#,
        )
        .unwrap();
        assert_eq!(fix.extra["product"], "Dimmer");
        assert!(fix.pre_interview().is_empty());
        let text = serde_json::to_string(&fix).unwrap();
        assert!(text.contains("\"product\":\"Dimmer\""));
    }
}
