//! DSP Error Types

use thiserror::Error;

use crate::format::SampleFormat;

/// Errors that can occur while building or running a format converter
///
/// Variants produced by [`crate::FormatConverter::convert`] carry no heap data,
/// so they can be created on the real-time thread.
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("Channel count must be positive, got {0}")]
    InvalidChannels(usize),

    #[error("Source and destination differ in more than sample rate ({what})")]
    IncompatibleFormats { what: &'static str },

    #[error("Failed to construct resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("Requested {requested} frames, converter was built for at most {max}")]
    RequestTooLarge { requested: usize, max: usize },

    #[error("Buffer is {got:?}, expected {expected:?}")]
    FormatMismatch {
        expected: SampleFormat,
        got: SampleFormat,
    },

    #[error("Buffer length {len} is not a whole number of {channels}-channel frames")]
    PartialFrame { len: usize, channels: usize },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("Interleaved buffer adapter rejected {frames} frames")]
    Adapter { frames: usize },

    #[error("Resampler process failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}
