//! Shared redb database handles.
//!
//! redb refuses to open the same file twice in one process, so every store
//! goes through [`get_or_open_db`], which caches one `Database` per path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use redb::Database;

use crate::Result;

fn db_cache() -> &'static RwLock<HashMap<String, Arc<Database>>> {
    static CACHE: OnceLock<RwLock<HashMap<String, Arc<Database>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get or open a database, caching the connection for reuse.
pub fn get_or_open_db<P: AsRef<Path>>(path: P) -> Result<Arc<Database>> {
    let path_str = path.as_ref().to_string_lossy().to_string();

    if let Some(db) = db_cache().read().get(&path_str) {
        return Ok(db.clone());
    }

    let mut cache = db_cache().write();
    // Another caller may have opened it between the two locks.
    if let Some(db) = cache.get(&path_str) {
        return Ok(db.clone());
    }

    let path_ref = path.as_ref();
    let db = if path_ref.exists() {
        Database::open(path_ref)?
    } else {
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Database::create(path_ref)?
    };

    let db = Arc::new(db);
    cache.insert(path_str, db.clone());
    Ok(db)
}

/// Drop the cached handle for `path`. The database stays open while other
/// `Arc`s to it exist.
pub fn close_db<P: AsRef<Path>>(path: P) -> Option<Arc<Database>> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    db_cache().write().remove(&path_str)
}

/// Check if a specific database is currently cached.
pub fn is_cached<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy().to_string();
    db_cache().read().contains_key(&path_str)
}
