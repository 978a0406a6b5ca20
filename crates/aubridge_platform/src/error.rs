//! Platform Error Types

use thiserror::Error;

/// Errors from hardware unit and component operations
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Platform not supported")]
    UnsupportedPlatform,

    #[error("Audio component not found: {0}")]
    ComponentNotFound(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Stream format rejected: {0}")]
    FormatRejected(String),

    #[error("Stream format not set")]
    FormatNotSet,

    #[error("No {0} callback registered")]
    MissingCallback(&'static str),

    #[error("Callback not supported on {0} units")]
    WrongDirection(&'static str),

    #[error("Unit not initialized")]
    NotInitialized,

    #[error("Unit already initialized")]
    AlreadyInitialized,

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamStart(String),

    #[error("Failed to stop audio stream: {0}")]
    StreamStop(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Hardware query failed: {0}")]
    QueryFailed(String),

    #[error("Stream control thread error: {0}")]
    Thread(String),
}

/// Status returned from real-time callbacks
///
/// `Copy` and heap-free so the callback thread never allocates to report it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Hardware render failed with status {0}")]
    Render(i32),

    #[error("Callback buffer has the wrong sample format")]
    FormatMismatch,

    #[error("Unit is not running")]
    NotRunning,
}
