//! aubridge DSP - Sample Formats and Rate Conversion
//!
//! This crate provides the sample-level building blocks shared by the
//! playback and capture bridges:
//! - Linear PCM sample formats (`s16`, `f32`) and typed interleaved buffers
//! - A pull-based sample-rate converter backed by rubato's async sinc resampler
//!
//! # Architecture
//!
//! The converter is driven from the destination side. A hardware callback asks
//! for `N` frames; the converter works out how many source frames that takes
//! and pulls exactly that many from a producer closure. All buffers are sized
//! at construction so the conversion path never allocates.

mod converter;
mod error;
mod format;

pub use converter::{ConverterConfig, FormatConverter, StreamFormat};
pub use error::DspError;
pub use format::{PcmBuf, PcmBufMut, PcmVec, SampleFormat};
