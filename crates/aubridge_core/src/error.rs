//! Bridge Error Types

use thiserror::Error;

use aubridge_dsp::DspError;
use aubridge_platform::PlatformError;

/// What went wrong underneath a [`BridgeError::DeviceUnavailable`]
#[derive(Error, Debug)]
pub enum DeviceFailure {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Converter(#[from] DspError),
}

/// Errors that can occur while allocating or driving a bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Audio device unavailable: {source}")]
    DeviceUnavailable {
        #[source]
        source: DeviceFailure,
    },

    #[error("No audio driver registered as '{0}'")]
    DriverNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PlatformError> for BridgeError {
    fn from(err: PlatformError) -> Self {
        BridgeError::DeviceUnavailable {
            source: DeviceFailure::Platform(err),
        }
    }
}

impl From<DspError> for BridgeError {
    fn from(err: DspError) -> Self {
        BridgeError::DeviceUnavailable {
            source: DeviceFailure::Converter(err),
        }
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
