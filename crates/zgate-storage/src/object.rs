//! Named JSON object store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::singleton::get_or_open_db;
use crate::Result;

/// Objects table: name -> JSON text.
const OBJECTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("objects");

/// Load/save of JSON documents by name.
///
/// `save` must be durable once it returns.
pub trait ObjectStore: Send + Sync {
    /// Load an object, `None` if it was never saved.
    fn load(&self, name: &str) -> Result<Option<serde_json::Value>>;

    /// Store an object, replacing any previous version.
    fn save(&self, name: &str, value: &serde_json::Value) -> Result<()>;

    /// Remove an object. Returns `true` if it existed.
    fn remove(&self, name: &str) -> Result<bool>;

    /// Names of all stored objects.
    fn names(&self) -> Result<Vec<String>>;
}

/// Load and deserialize an object.
pub fn load_json<T: DeserializeOwned>(store: &dyn ObjectStore, name: &str) -> Result<Option<T>> {
    match store.load(name)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and save an object.
pub fn save_json<T: Serialize>(store: &dyn ObjectStore, name: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.save(name, &value)
}

/// redb-backed object store.
pub struct RedbObjectStore {
    db: Arc<Database>,
}

impl RedbObjectStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = get_or_open_db(path.as_ref())?;

        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write()?;
        {
            let _objects = write_txn.open_table(OBJECTS_TABLE)?;
        }
        write_txn.commit()?;

        tracing::debug!("Opened object store at {}", path.as_ref().display());
        Ok(Self { db })
    }
}

impl ObjectStore for RedbObjectStore {
    fn load(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBJECTS_TABLE)?;
        match table.get(name)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OBJECTS_TABLE)?;
            table.insert(name, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(OBJECTS_TABLE)?;
            let removed = table.remove(name)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn names(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBJECTS_TABLE)?;
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }
}

/// In-memory object store.
#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn load(&self, name: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.objects.read().get(name).cloned())
    }

    fn save(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        self.objects.write().insert(name.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.objects.write().remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self.objects.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u32,
        dsk: String,
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryObjectStore::new();
        assert!(load_json::<Vec<Entry>>(&store, "dskCollection")
            .unwrap()
            .is_none());

        let entries = vec![Entry {
            id: 1,
            dsk: "12345-11111".to_string(),
        }];
        save_json(&store, "dskCollection", &entries).unwrap();

        let loaded: Vec<Entry> = load_json(&store, "dskCollection").unwrap().unwrap();
        assert_eq!(loaded, entries);
        assert_eq!(store.names().unwrap(), vec!["dskCollection".to_string()]);
        assert!(store.remove("dskCollection").unwrap());
        assert!(!store.remove("dskCollection").unwrap());
    }

    #[test]
    fn test_wrong_shape_is_serialization_error() {
        let store = MemoryObjectStore::new();
        store
            .save("postfix", &serde_json::json!({"fixes": "nope"}))
            .unwrap();
        let err = load_json::<Vec<Entry>>(&store, "postfix").unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));
    }
}
