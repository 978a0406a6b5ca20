//! cpal Hardware Backend
//!
//! Maps the hardware-unit lifecycle onto cpal streams:
//!
//! | Unit call             | cpal                                          |
//! |-----------------------|-----------------------------------------------|
//! | `set_stream_format`   | checked against `supported_*_configs()`       |
//! | `initialize`          | stream built (paused) on a control thread     |
//! | `start` / `stop`      | `play()` / `pause()` on that thread           |
//! | `uninitialize`        | stream dropped, thread joined                 |
//!
//! Works with whatever host cpal picks by default (ALSA, CoreAudio, WASAPI).

pub mod device;
mod thread;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::PlatformError;
use crate::traits::{
    Direction, ErrorCallback, HardwareComponent, HardwareFormat, HardwareUnit, InputCallback,
    RenderCallback,
};

pub use device::DeviceInfo;
use thread::{StreamCallback, StreamRequest, StreamThreadHandle};

/// Hardware component backed by the default cpal host
pub struct CpalComponent {
    name: String,
}

impl CpalComponent {
    pub fn new() -> Self {
        let host = cpal::default_host();
        let name = format!("cpal/{}", host.id().name());
        info!("Using audio host {}", name);
        Self { name }
    }
}

impl Default for CpalComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareComponent for CpalComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(
        &self,
        direction: Direction,
        device: Option<&str>,
    ) -> Result<Box<dyn HardwareUnit>, PlatformError> {
        // Fail early if nothing matches; the stream thread looks it up again
        let resolved = device::find_device(direction, device)?;
        let device_name = cpal::traits::DeviceTrait::name(&resolved)
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;

        debug!("Instantiated {} unit on '{}'", direction.name(), device_name);

        Ok(Box::new(CpalUnit {
            direction,
            device_name,
            state: Mutex::new(UnitState::default()),
        }))
    }

    fn default_input_sample_rate(&self) -> Result<u32, PlatformError> {
        let device = device::find_device(Direction::Input, None)?;
        device::default_sample_rate(&device, Direction::Input)
    }

    fn default_output_sample_rate(&self) -> Result<u32, PlatformError> {
        let device = device::find_device(Direction::Output, None)?;
        device::default_sample_rate(&device, Direction::Output)
    }
}

#[derive(Default)]
struct UnitState {
    format: Option<HardwareFormat>,
    render: Option<RenderCallback>,
    input: Option<InputCallback>,
    on_error: Option<ErrorCallback>,
    thread: Option<StreamThreadHandle>,
}

/// One cpal stream in unit clothing
pub struct CpalUnit {
    direction: Direction,
    device_name: String,
    state: Mutex<UnitState>,
}

impl CpalUnit {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl HardwareUnit for CpalUnit {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn set_stream_format(&self, format: HardwareFormat) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.thread.is_some() {
            return Err(PlatformError::AlreadyInitialized);
        }

        let device = device::find_device(self.direction, Some(&self.device_name))?;
        if !device::supports_format(&device, self.direction, &format)? {
            return Err(PlatformError::FormatRejected(format!(
                "{} Hz, {} ch, {} on '{}'",
                format.sample_rate, format.channels, format.sample_format, self.device_name
            )));
        }

        state.format = Some(format);
        Ok(())
    }

    fn stream_format(&self) -> Option<HardwareFormat> {
        self.state.lock().format
    }

    fn set_render_callback(&self, callback: RenderCallback) -> Result<(), PlatformError> {
        if self.direction != Direction::Output {
            return Err(PlatformError::WrongDirection("input"));
        }
        self.state.lock().render = Some(callback);
        Ok(())
    }

    fn set_input_callback(&self, callback: InputCallback) -> Result<(), PlatformError> {
        if self.direction != Direction::Input {
            return Err(PlatformError::WrongDirection("output"));
        }
        self.state.lock().input = Some(callback);
        Ok(())
    }

    fn set_error_callback(&self, callback: ErrorCallback) -> Result<(), PlatformError> {
        self.state.lock().on_error = Some(callback);
        Ok(())
    }

    fn initialize(&self) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.thread.is_some() {
            return Err(PlatformError::AlreadyInitialized);
        }
        let format = state.format.ok_or(PlatformError::FormatNotSet)?;

        let callback = match self.direction {
            Direction::Output => state
                .render
                .take()
                .map(StreamCallback::Render)
                .ok_or(PlatformError::MissingCallback("render"))?,
            Direction::Input => state
                .input
                .take()
                .map(StreamCallback::Input)
                .ok_or(PlatformError::MissingCallback("input"))?,
        };

        let request = StreamRequest {
            direction: self.direction,
            device: Some(self.device_name.clone()),
            format,
            callback,
            on_error: state.on_error.take(),
        };

        state.thread = Some(StreamThreadHandle::spawn(request)?);
        info!(
            "Initialized {} stream on '{}' ({} Hz, {} ch, {})",
            self.direction.name(),
            self.device_name,
            format.sample_rate,
            format.channels,
            format.sample_format
        );
        Ok(())
    }

    fn start(&self) -> Result<(), PlatformError> {
        let state = self.state.lock();
        let thread = state.thread.as_ref().ok_or(PlatformError::NotInitialized)?;
        if thread.is_running() {
            return Ok(());
        }
        thread.start()
    }

    fn stop(&self) -> Result<(), PlatformError> {
        let state = self.state.lock();
        let thread = state.thread.as_ref().ok_or(PlatformError::NotInitialized)?;
        if !thread.is_running() {
            return Ok(());
        }
        thread.stop()
    }

    fn uninitialize(&self) -> Result<(), PlatformError> {
        let thread = self.state.lock().thread.take();
        if let Some(mut thread) = thread {
            thread.shutdown()?;
            debug!("Uninitialized {} stream", self.direction.name());
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state
            .lock()
            .thread
            .as_ref()
            .is_some_and(|t| t.is_running())
    }

    fn hardware_sample_rate(&self) -> Result<u32, PlatformError> {
        let device = device::find_device(self.direction, Some(&self.device_name))?;
        device::default_sample_rate(&device, self.direction)
    }
}

impl Drop for CpalUnit {
    fn drop(&mut self) {
        if let Err(e) = self.uninitialize() {
            debug!(
                "Uninitialize on drop failed for {} stream: {}",
                self.direction.name(),
                e
            );
        }
    }
}
