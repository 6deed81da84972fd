//! Registry errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device already exists: {0}")]
    AlreadyExists(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device {device} does not support command '{command}'")]
    UnsupportedCommand { device: String, command: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),
}
