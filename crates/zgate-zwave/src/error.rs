//! Z-Wave layer errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ZWaveError>;

#[derive(Debug, Error)]
pub enum ZWaveError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid directive: {0}")]
    InvalidDirective(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid QR code: {0}")]
    InvalidQr(String),

    #[error("Storage error: {0}")]
    Storage(#[from] zgate_storage::Error),

    #[error("Device error: {0}")]
    Device(#[from] zgate_devices::DeviceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZWaveError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}
