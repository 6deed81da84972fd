//! Storage errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored object does not have the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The redb file could not be opened, read or written.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// redb reports each stage of a transaction with its own error type.
macro_rules! database_error {
    ($($source:ty => $stage:literal),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(e: $source) -> Self {
                    Error::Database(format!("{}: {}", $stage, e))
                }
            }
        )*
    };
}

database_error! {
    redb::DatabaseError => "open",
    redb::TransactionError => "transaction",
    redb::TableError => "table",
    redb::StorageError => "io",
    redb::CommitError => "commit",
}
