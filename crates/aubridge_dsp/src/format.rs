//! PCM Sample Formats and Interleaved Buffers
//!
//! Everything that crosses a bridge is linear PCM, native endian, packed and
//! interleaved: `[L0, R0, L1, R1, ...]`. The only thing that varies is the
//! sample type, so buffers are small enums over typed slices instead of raw
//! byte pointers plus a size field.

use cpal::Sample;
use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Application/hardware sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit integer
    S16,
    /// 32-bit IEEE float
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub const fn sample_size(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }

    pub const fn bits_per_sample(self) -> usize {
        self.sample_size() * 8
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::S16 => "s16",
            SampleFormat::F32 => "f32",
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of interleaved samples
#[derive(Debug, Clone, Copy)]
pub enum PcmBuf<'a> {
    S16(&'a [i16]),
    F32(&'a [f32]),
}

impl<'a> PcmBuf<'a> {
    pub fn format(&self) -> SampleFormat {
        match self {
            PcmBuf::S16(_) => SampleFormat::S16,
            PcmBuf::F32(_) => SampleFormat::F32,
        }
    }

    /// Number of samples (not frames)
    pub fn len(&self) -> usize {
        match self {
            PcmBuf::S16(s) => s.len(),
            PcmBuf::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of whole frames for the given channel count
    pub fn frames(&self, channels: usize) -> usize {
        self.len() / channels.max(1)
    }

    /// First `samples` samples (clamped to the buffer length)
    pub fn prefix(self, samples: usize) -> PcmBuf<'a> {
        match self {
            PcmBuf::S16(s) => PcmBuf::S16(&s[..samples.min(s.len())]),
            PcmBuf::F32(s) => PcmBuf::F32(&s[..samples.min(s.len())]),
        }
    }

    pub fn as_s16(&self) -> Option<&'a [i16]> {
        match *self {
            PcmBuf::S16(s) => Some(s),
            PcmBuf::F32(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<&'a [f32]> {
        match *self {
            PcmBuf::F32(s) => Some(s),
            PcmBuf::S16(_) => None,
        }
    }

    /// Convert every sample into `dst` as `f32` in `-1.0..=1.0`
    ///
    /// `dst` must be at least `self.len()` long; extra slots are untouched.
    pub fn write_f32(&self, dst: &mut [f32]) {
        match self {
            PcmBuf::S16(src) => {
                for (d, &s) in dst.iter_mut().zip(src.iter()) {
                    *d = s.to_sample::<f32>();
                }
            }
            PcmBuf::F32(src) => {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
            }
        }
    }
}

/// Mutable view of interleaved samples
#[derive(Debug)]
pub enum PcmBufMut<'a> {
    S16(&'a mut [i16]),
    F32(&'a mut [f32]),
}

impl<'a> PcmBufMut<'a> {
    pub fn format(&self) -> SampleFormat {
        match self {
            PcmBufMut::S16(_) => SampleFormat::S16,
            PcmBufMut::F32(_) => SampleFormat::F32,
        }
    }

    /// Number of samples (not frames)
    pub fn len(&self) -> usize {
        match self {
            PcmBufMut::S16(s) => s.len(),
            PcmBufMut::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frames(&self, channels: usize) -> usize {
        self.len() / channels.max(1)
    }

    /// Reborrow with a shorter lifetime so the view can be handed out twice
    pub fn reborrow(&mut self) -> PcmBufMut<'_> {
        match self {
            PcmBufMut::S16(s) => PcmBufMut::S16(s),
            PcmBufMut::F32(s) => PcmBufMut::F32(s),
        }
    }

    pub fn as_buf(&self) -> PcmBuf<'_> {
        match self {
            PcmBufMut::S16(s) => PcmBuf::S16(s),
            PcmBufMut::F32(s) => PcmBuf::F32(s),
        }
    }

    /// First `samples` samples (clamped to the buffer length)
    pub fn prefix(self, samples: usize) -> PcmBufMut<'a> {
        match self {
            PcmBufMut::S16(s) => {
                let n = samples.min(s.len());
                PcmBufMut::S16(&mut s[..n])
            }
            PcmBufMut::F32(s) => {
                let n = samples.min(s.len());
                PcmBufMut::F32(&mut s[..n])
            }
        }
    }

    /// Samples from `start` to the end (empty if `start` is past the end)
    pub fn suffix(self, start: usize) -> PcmBufMut<'a> {
        match self {
            PcmBufMut::S16(s) => {
                let n = start.min(s.len());
                PcmBufMut::S16(&mut s[n..])
            }
            PcmBufMut::F32(s) => {
                let n = start.min(s.len());
                PcmBufMut::F32(&mut s[n..])
            }
        }
    }

    pub fn fill_silence(&mut self) {
        match self {
            PcmBufMut::S16(s) => s.fill(0),
            PcmBufMut::F32(s) => s.fill(0.0),
        }
    }

    /// Store `f32` samples, converting to this buffer's format
    ///
    /// Writes `min(src.len(), self.len())` samples and returns that count.
    pub fn read_f32(&mut self, src: &[f32]) -> usize {
        match self {
            PcmBufMut::S16(dst) => {
                let n = src.len().min(dst.len());
                for (d, &s) in dst[..n].iter_mut().zip(src.iter()) {
                    *d = s.to_sample::<i16>();
                }
                n
            }
            PcmBufMut::F32(dst) => {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
                n
            }
        }
    }

    /// Copy same-format samples from `src`, returning the number copied
    pub fn copy_from(&mut self, src: PcmBuf<'_>) -> Result<usize, DspError> {
        match (self, src) {
            (PcmBufMut::S16(dst), PcmBuf::S16(src)) => {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
                Ok(n)
            }
            (PcmBufMut::F32(dst), PcmBuf::F32(src)) => {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
                Ok(n)
            }
            (dst, src) => Err(DspError::FormatMismatch {
                expected: dst.format(),
                got: src.format(),
            }),
        }
    }
}

/// Owned interleaved sample storage, allocated once and reused
///
/// Bridges keep their per-period scratch buffers in one of these; the length
/// is fixed at construction and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmVec {
    S16(Vec<i16>),
    F32(Vec<f32>),
}

impl PcmVec {
    /// Allocate `samples` zeroed samples
    pub fn zeroed(format: SampleFormat, samples: usize) -> Self {
        match format {
            SampleFormat::S16 => PcmVec::S16(vec![0; samples]),
            SampleFormat::F32 => PcmVec::F32(vec![0.0; samples]),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            PcmVec::S16(_) => SampleFormat::S16,
            PcmVec::F32(_) => SampleFormat::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PcmVec::S16(v) => v.len(),
            PcmVec::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_buf(&self) -> PcmBuf<'_> {
        match self {
            PcmVec::S16(v) => PcmBuf::S16(v),
            PcmVec::F32(v) => PcmBuf::F32(v),
        }
    }

    pub fn as_buf_mut(&mut self) -> PcmBufMut<'_> {
        match self {
            PcmVec::S16(v) => PcmBufMut::S16(v),
            PcmVec::F32(v) => PcmBufMut::F32(v),
        }
    }

    /// Move samples `consumed..filled` to the front, as a FIFO would after
    /// reading `consumed` samples. Returns the samples left in front.
    pub fn discard_front(&mut self, consumed: usize, filled: usize) -> usize {
        let filled = filled.min(self.len());
        let consumed = consumed.min(filled);
        match self {
            PcmVec::S16(v) => v.copy_within(consumed..filled, 0),
            PcmVec::F32(v) => v.copy_within(consumed..filled, 0),
        }
        filled - consumed
    }
}
