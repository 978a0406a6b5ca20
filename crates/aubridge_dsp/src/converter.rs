//! Pull-Based Format Converter
//!
//! Converts between two linear PCM stream formats that differ only in sample
//! rate. The converter is driven from the destination side: the caller asks
//! for `N` output frames and the converter pulls exactly as many source frames
//! as it needs for those `N` frames from a producer closure.
//!
//! # Real-time Safety Contract
//!
//! All scratch storage is allocated in [`FormatConverter::new`]. `convert()`
//! performs no heap allocation and returns errors that carry no heap data, so
//! it can run inside a hardware callback.
//!
//! ```text
//!  producer(PcmBufMut[needed]) ──▶ source staging ──▶ f32 ──▶ rubato ──▶ f32 ──▶ output
//! ```

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    calculate_cutoff, Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::format::{PcmBufMut, PcmVec, SampleFormat};

/// One side of a conversion: linear PCM, packed, interleaved, native endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub sample_format: SampleFormat,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: usize, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Same format at a different rate
    pub fn with_rate(self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.sample_format.sample_size()
    }
}

/// Resampler quality knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Sinc filter length in taps (longer = steeper filter, more latency)
    pub sinc_len: usize,

    /// Sinc table oversampling (interpolated between table entries)
    pub oversampling_factor: usize,

    /// Headroom for ratio adjustments relative to the nominal ratio
    pub max_ratio_relative: f64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            sinc_len: 128,
            oversampling_factor: 256,
            max_ratio_relative: 1.1,
        }
    }
}

impl ConverterConfig {
    /// Shorter filter for voice paths where latency matters more than stopband
    pub fn low_latency() -> Self {
        Self {
            sinc_len: 64,
            oversampling_factor: 128,
            max_ratio_relative: 1.1,
        }
    }
}

/// Sample-rate converter pulling source frames on demand
pub struct FormatConverter {
    src: StreamFormat,
    dst: StreamFormat,
    max_frames: usize,
    stage: Stage,
}

enum Stage {
    /// Equal rates: the producer writes straight into the output buffer
    Passthrough,
    Sinc(Box<SincStage>),
}

struct SincStage {
    resampler: Box<dyn Resampler<f32>>,
    chunk_frames: usize,
    indexing: Indexing,
    /// Source-format staging handed to the producer
    source: PcmVec,
    source_f32: Vec<f32>,
    output_f32: Vec<f32>,
}

impl FormatConverter {
    /// Build a converter from `src` to `dst`
    ///
    /// `max_frames` is the largest output frame count a single `convert()` call
    /// may request. The two formats must agree on channel count and sample
    /// format.
    pub fn new(
        src: StreamFormat,
        dst: StreamFormat,
        max_frames: usize,
        config: &ConverterConfig,
    ) -> Result<Self, DspError> {
        for fmt in [&src, &dst] {
            if fmt.sample_rate == 0 {
                return Err(DspError::InvalidSampleRate(fmt.sample_rate));
            }
            if fmt.channels == 0 {
                return Err(DspError::InvalidChannels(fmt.channels));
            }
        }
        if src.channels != dst.channels {
            return Err(DspError::IncompatibleFormats { what: "channels" });
        }
        if src.sample_format != dst.sample_format {
            return Err(DspError::IncompatibleFormats {
                what: "sample format",
            });
        }

        let max_frames = max_frames.max(1);

        let stage = if src.sample_rate == dst.sample_rate {
            tracing::debug!(rate_hz = src.sample_rate, "converter pass-through");
            Stage::Passthrough
        } else {
            Stage::Sinc(Box::new(SincStage::new(&src, &dst, max_frames, config)?))
        };

        tracing::debug!(
            from_hz = src.sample_rate,
            to_hz = dst.sample_rate,
            channels = src.channels,
            format = %src.sample_format,
            max_frames,
            "converter ready"
        );

        Ok(Self {
            src,
            dst,
            max_frames,
            stage,
        })
    }

    pub fn source_format(&self) -> StreamFormat {
        self.src
    }

    pub fn destination_format(&self) -> StreamFormat {
        self.dst
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.stage, Stage::Passthrough)
    }

    /// Largest number of source frames a single `convert()` will ask for
    pub fn max_source_frames(&self) -> usize {
        match &self.stage {
            Stage::Passthrough => self.max_frames,
            Stage::Sinc(stage) => stage.resampler.input_frames_max(),
        }
    }

    /// Source frames the next `convert()` of `frames` output frames will pull
    ///
    /// Push-driven callers (capture) use this to hold back a conversion until
    /// that many source frames are buffered.
    pub fn source_frames_for(&mut self, frames: usize) -> Result<usize, DspError> {
        if frames > self.max_frames {
            return Err(DspError::RequestTooLarge {
                requested: frames,
                max: self.max_frames,
            });
        }
        match &mut self.stage {
            Stage::Passthrough => Ok(frames),
            Stage::Sinc(_) if frames == 0 => Ok(0),
            Stage::Sinc(stage) => {
                stage.resize(frames)?;
                Ok(stage.resampler.input_frames_next())
            }
        }
    }

    /// Fill `out` with converted frames, pulling source frames from `producer`
    ///
    /// The number of output frames is `out.len() / channels`. `producer` is
    /// called exactly once with a buffer of exactly the number of source
    /// frames needed; it returns how many frames it actually supplied. A short
    /// supply is padded with silence.
    ///
    /// Returns the number of output frames written. Frames beyond that (only
    /// possible when the resampler is still priming) are set to silence.
    pub fn convert<P>(&mut self, mut out: PcmBufMut<'_>, producer: P) -> Result<usize, DspError>
    where
        P: FnOnce(PcmBufMut<'_>) -> usize,
    {
        let channels = self.dst.channels;
        if out.format() != self.dst.sample_format {
            return Err(DspError::FormatMismatch {
                expected: self.dst.sample_format,
                got: out.format(),
            });
        }
        if out.len() % channels != 0 {
            return Err(DspError::PartialFrame {
                len: out.len(),
                channels,
            });
        }

        let frames = out.len() / channels;
        if frames > self.max_frames {
            return Err(DspError::RequestTooLarge {
                requested: frames,
                max: self.max_frames,
            });
        }
        if frames == 0 {
            return Ok(0);
        }

        match &mut self.stage {
            Stage::Passthrough => {
                let supplied = producer(out.reborrow()).min(frames);
                out.suffix(supplied * channels).fill_silence();
                Ok(frames)
            }
            Stage::Sinc(stage) => stage.convert(out, frames, channels, producer),
        }
    }

    /// Drop resampler history (e.g. after the stream was stopped for a while)
    pub fn reset(&mut self) {
        if let Stage::Sinc(stage) = &mut self.stage {
            stage.resampler.reset();
        }
    }
}

impl std::fmt::Debug for FormatConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatConverter")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("max_frames", &self.max_frames)
            .field("passthrough", &self.is_passthrough())
            .finish()
    }
}

impl SincStage {
    fn new(
        src: &StreamFormat,
        dst: &StreamFormat,
        max_frames: usize,
        config: &ConverterConfig,
    ) -> Result<Self, DspError> {
        let channels = src.channels;
        let f_ratio = dst.sample_rate as f64 / src.sample_rate as f64;

        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len: config.sinc_len,
            f_cutoff: calculate_cutoff(config.sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: config.oversampling_factor,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            config.max_ratio_relative,
            &params,
            max_frames,
            channels,
            FixedAsync::Output,
        )?;

        let max_in = resampler.input_frames_max();
        let max_out = resampler.output_frames_max();

        Ok(Self {
            resampler: Box::new(resampler),
            chunk_frames: max_frames,
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
            source: PcmVec::zeroed(src.sample_format, max_in * channels),
            source_f32: vec![0.0; max_in * channels],
            output_f32: vec![0.0; max_out.max(max_frames) * channels],
        })
    }

    fn resize(&mut self, frames: usize) -> Result<(), DspError> {
        if frames != self.chunk_frames {
            self.resampler.set_chunk_size(frames)?;
            self.chunk_frames = frames;
        }
        Ok(())
    }

    fn convert<P>(
        &mut self,
        mut out: PcmBufMut<'_>,
        frames: usize,
        channels: usize,
        producer: P,
    ) -> Result<usize, DspError>
    where
        P: FnOnce(PcmBufMut<'_>) -> usize,
    {
        self.resize(frames)?;

        let needed = self.resampler.input_frames_next();
        let needed_samples = needed * channels;

        let supplied = producer(self.source.as_buf_mut().prefix(needed_samples)).min(needed);
        let supplied_samples = supplied * channels;

        self.source
            .as_buf()
            .prefix(supplied_samples)
            .write_f32(&mut self.source_f32[..supplied_samples]);
        self.source_f32[supplied_samples..needed_samples].fill(0.0);

        let input = InterleavedSlice::new(&self.source_f32[..needed_samples], channels, needed)
            .map_err(|_| DspError::Adapter { frames: needed })?;

        let out_capacity = self.output_f32.len() / channels;
        let mut output = InterleavedSlice::new_mut(&mut self.output_f32, channels, out_capacity)
            .map_err(|_| DspError::Adapter {
                frames: out_capacity,
            })?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = if supplied < needed {
            Some(supplied)
        } else {
            None
        };

        let (_nbr_in, nbr_out) =
            self.resampler
                .process_into_buffer(&input, &mut output, Some(&self.indexing))?;

        let produced = nbr_out.min(frames);
        out.reborrow().read_f32(&self.output_f32[..produced * channels]);
        out.suffix(produced * channels).fill_silence();

        Ok(produced)
    }
}
