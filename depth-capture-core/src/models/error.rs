use std::path::PathBuf;

use thiserror::Error;

/// Device probe failed. Never fatal: the registry logs it and reports no devices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnumerationError {
    #[error("device probe failed: {0}")]
    ProbeFailed(String),

    #[error("device probe timed out")]
    ProbeTimeout,
}

/// Errors opening a single device. Fatal to that device only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("device {0} is already open")]
    AlreadyOpen(String),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

/// Errors from a single grab attempt. Recoverable unless sustained.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabError {
    #[error("grab timed out")]
    Timeout,

    #[error("device disconnected")]
    Disconnected,

    #[error("end of stream")]
    EndOfStream,
}

/// Errors enabling recording on an open device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("device is not open")]
    NotOpen,

    #[error("recording already enabled to {}", .0.display())]
    AlreadyRecording(PathBuf),

    #[error("recording setup failed: {0}")]
    Setup(String),
}

/// Errors enabling result publishing on an open device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publishing is not supported by this device")]
    NotSupported,

    #[error("device is not open")]
    NotOpen,

    #[error("publishing setup failed: {0}")]
    Setup(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// Why a computed output target cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionReason {
    /// A file already occupies the path.
    Exists,
    /// Two devices were assigned the same path.
    Duplicate,
}

/// Run-level failures. All of them abort before any worker is spawned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("no devices available")]
    NoDevicesAvailable,

    #[error("destination collision ({reason:?}): {}", path.display())]
    DestinationCollision {
        path: PathBuf,
        reason: CollisionReason,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for RunError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.0)
    }
}
