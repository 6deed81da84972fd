//! Object persistence for the gateway.
//!
//! The gateway persists a handful of JSON documents by name (the custom
//! postfix overlay, the DSK collection). [`ObjectStore`] is the seam; two
//! backends are provided:
//!
//! - [`RedbObjectStore`]: durable, one redb table keyed by object name
//! - [`MemoryObjectStore`]: in-memory, for tests and dry runs

pub mod error;
pub mod object;
pub mod singleton;

pub use error::{Error, Result};
pub use object::{load_json, save_json, MemoryObjectStore, ObjectStore, RedbObjectStore};
pub use singleton::get_or_open_db;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
