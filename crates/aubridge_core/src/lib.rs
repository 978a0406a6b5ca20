//! aubridge Core - Playback and Capture Bridges
//!
//! This crate moves PCM between hardware audio units (any native rate) and an
//! application pipeline (fixed rate, format and period):
//! - [`PlaybackBridge`]: pulls from a write handler, renders to an output unit
//! - [`CaptureBridge`]: renders from an input unit, pushes to a read handler
//! - [`InterruptionCoordinator`]: pauses/resumes units on session interruptions
//! - [`DriverRegistry`]: named drivers that allocate bridges
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Thread                          │
//! │  alloc / clear_handler / stop        session begin/end      │
//! └─────────────────────────────────────────────────────────────┘
//!          │ handler slot (Mutex)          │ lifecycle (Mutex)
//!          ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Hardware Callback Thread                   │
//! │  render/capture ──▶ FormatConverter ──▶ handler             │
//! │           (Zero allocation in this path)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod driver;
mod error;
mod handler;
mod interruption;
mod lifecycle;
mod player;
mod recorder;
mod registry;

pub use config::{BridgeConfig, PlaybackRate, StreamParameters};
pub use driver::{AudioDriver, CaptureDriver, CaptureStream, PlaybackDriver, PlaybackStream};
pub use error::{BridgeError, BridgeResult, DeviceFailure};
pub use handler::{CaptureErrorHandler, HandlerSlot, ReadFn, ReadHandler, WriteFn, WriteHandler};
pub use interruption::{
    Interruption, InterruptionCoordinator, InterruptionListener, SessionHandle,
};
pub use lifecycle::BridgeState;
pub use player::PlaybackBridge;
pub use recorder::CaptureBridge;
pub use registry::{DriverRegistry, DEFAULT_DRIVER_NAME};

// Re-export the sample types handlers see
pub use aubridge_dsp::{ConverterConfig, PcmBuf, PcmBufMut, SampleFormat};
