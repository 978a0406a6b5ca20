//! aubridge Platform - Hardware Audio Units
//!
//! This crate provides the hardware side of the audio bridges:
//! - A unit lifecycle trait ([`HardwareUnit`]) modelled on OS output units
//! - Backend components that instantiate units ([`HardwareComponent`])
//! - Typed render/capture callback signatures
//!
//! # Backends
//!
//! | Backend  | Component                  | Used for                          |
//! |----------|----------------------------|-----------------------------------|
//! | cpal     | [`cpal_backend::CpalComponent`] | Real devices on every desktop OS |
//! | manual   | [`manual::ManualComponent`]     | Tests and offline drivers        |
//!
//! # Architecture
//!
//! Bridges only ever talk to `dyn HardwareComponent` / `dyn HardwareUnit`, so
//! the same bridge code runs against real hardware or a hand-fired unit.

mod error;
mod traits;

pub mod cpal_backend;
pub mod manual;

pub use error::{CallbackError, PlatformError};
pub use traits::{
    CaptureRender, Direction, ErrorCallback, HardwareComponent, HardwareFormat, HardwareUnit,
    InputCallback, RenderCallback, SliceRender,
};

/// Get the hardware component for the current OS
///
/// Always the cpal default host; cpal picks the native API per platform.
pub fn default_component() -> Box<dyn HardwareComponent> {
    Box::new(cpal_backend::CpalComponent::new())
}
