//! Hardware Unit Traits
//!
//! Defines the interface every hardware backend must provide. A
//! [`HardwareComponent`] is the process-wide handle to an audio backend; it
//! instantiates [`HardwareUnit`]s, one per stream direction. Units follow the
//! classic output-unit lifecycle:
//!
//! ```text
//! instantiate → set_stream_format → set_*_callback → initialize → start ⇄ stop → uninitialize → drop
//! ```
//!
//! Callbacks run on a thread owned by the backend and must be real-time safe.

use serde::{Deserialize, Serialize};

use aubridge_dsp::{PcmBuf, PcmBufMut, SampleFormat, StreamFormat};

use crate::error::{CallbackError, PlatformError};

/// Stream direction of a hardware unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Playback (render callback)
    Output,
    /// Capture (input-available callback)
    Input,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Output => "output",
            Direction::Input => "input",
        }
    }
}

/// Stream format negotiated with a hardware unit
///
/// Always linear PCM, native endian, packed and interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,

    /// Preferred callback size in frames (the backend may ignore it)
    pub period_frames: Option<u32>,
}

impl HardwareFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.sample_size()
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.channels as usize, self.sample_format)
    }
}

/// Periodic render callback for output units
///
/// Receives the hardware buffer to fill. Returning an error leaves the buffer
/// as silence for that period.
pub type RenderCallback = Box<dyn FnMut(PcmBufMut<'_>) -> Result<(), CallbackError> + Send>;

/// Input-available callback for input units
///
/// Receives the render capability for the captured period and the number of
/// frames the hardware delivered.
pub type InputCallback =
    Box<dyn FnMut(&mut dyn CaptureRender, usize) -> Result<(), CallbackError> + Send>;

/// Asynchronous stream error notification (device lost, backend failure)
pub type ErrorCallback = Box<dyn FnMut(PlatformError) + Send>;

/// Pulls the frames captured for the current period out of the hardware
pub trait CaptureRender {
    /// Frames the hardware delivered for this period
    fn frames(&self) -> usize;

    /// Copy up to `dst.len()` captured samples into `dst`
    ///
    /// Returns the number of samples written.
    fn render(&mut self, dst: PcmBufMut<'_>) -> Result<usize, CallbackError>;
}

/// [`CaptureRender`] over a slice the backend already holds
pub struct SliceRender<'a> {
    data: PcmBuf<'a>,
    channels: usize,
}

impl<'a> SliceRender<'a> {
    pub fn new(data: PcmBuf<'a>, channels: usize) -> Self {
        Self {
            data,
            channels: channels.max(1),
        }
    }
}

impl CaptureRender for SliceRender<'_> {
    fn frames(&self) -> usize {
        self.data.frames(self.channels)
    }

    fn render(&mut self, mut dst: PcmBufMut<'_>) -> Result<usize, CallbackError> {
        dst.copy_from(self.data)
            .map_err(|_| CallbackError::FormatMismatch)
    }
}

/// One hardware stream (output or input) of an audio backend
///
/// All methods take `&self`: `start`/`stop` may be called from an interruption
/// thread while the owner holds the unit. Implementations serialize internally.
pub trait HardwareUnit: Send + Sync {
    fn direction(&self) -> Direction;

    /// Negotiate the stream format (must happen before `initialize`)
    fn set_stream_format(&self, format: HardwareFormat) -> Result<(), PlatformError>;

    fn stream_format(&self) -> Option<HardwareFormat>;

    /// Register the render callback (output units only)
    fn set_render_callback(&self, callback: RenderCallback) -> Result<(), PlatformError>;

    /// Register the input-available callback (input units only)
    fn set_input_callback(&self, callback: InputCallback) -> Result<(), PlatformError>;

    /// Register an asynchronous stream error callback (optional)
    fn set_error_callback(&self, callback: ErrorCallback) -> Result<(), PlatformError>;

    /// Allocate the stream with the negotiated format and callback
    fn initialize(&self) -> Result<(), PlatformError>;

    /// Begin callback delivery (idempotent)
    fn start(&self) -> Result<(), PlatformError>;

    /// Halt callback delivery (idempotent)
    ///
    /// Synchronous: once this returns no callback is running or will run
    /// until the next `start`.
    fn stop(&self) -> Result<(), PlatformError>;

    /// Release the stream; registered callbacks are dropped here
    fn uninitialize(&self) -> Result<(), PlatformError>;

    fn is_running(&self) -> bool;

    /// Nominal sample rate of the unit's hardware side
    fn hardware_sample_rate(&self) -> Result<u32, PlatformError>;
}

/// Process-wide handle to an audio backend
pub trait HardwareComponent: Send + Sync {
    /// Backend name (e.g., "cpal/ALSA", "manual")
    fn name(&self) -> &str;

    /// Create a unit for `direction` on `device` (host default when `None`)
    fn instantiate(
        &self,
        direction: Direction,
        device: Option<&str>,
    ) -> Result<Box<dyn HardwareUnit>, PlatformError>;

    /// Nominal sample rate of the default input device
    fn default_input_sample_rate(&self) -> Result<u32, PlatformError>;

    /// Nominal sample rate of the default output device
    fn default_output_sample_rate(&self) -> Result<u32, PlatformError>;
}
