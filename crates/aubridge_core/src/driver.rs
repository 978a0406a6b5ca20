//! Audio Drivers
//!
//! An [`AudioDriver`] carries what every bridge needs from its environment:
//! the hardware component handle, the session coordinator and the bridge
//! configuration. Bridges are allocated through the [`PlaybackDriver`] and
//! [`CaptureDriver`] capabilities so a host can hold several drivers side by
//! side (see [`crate::DriverRegistry`]).

use std::sync::Arc;

use aubridge_platform::HardwareComponent;

use crate::config::{BridgeConfig, StreamParameters};
use crate::error::BridgeResult;
use crate::handler::{CaptureErrorHandler, ReadHandler, WriteHandler};
use crate::interruption::InterruptionCoordinator;
use crate::lifecycle::BridgeState;
use crate::player::PlaybackBridge;
use crate::recorder::CaptureBridge;

/// Handle to an allocated output stream
pub trait PlaybackStream: Send {
    fn params(&self) -> &StreamParameters;
    fn hardware_rate(&self) -> u32;
    fn state(&self) -> BridgeState;
    fn clear_handler(&self);
    fn set_handler(&self, handler: WriteHandler);
    /// Tear down now instead of on drop (idempotent)
    fn stop(&mut self);
}

/// Handle to an allocated input stream
pub trait CaptureStream: Send {
    fn params(&self) -> &StreamParameters;
    fn hardware_rate(&self) -> u32;
    fn state(&self) -> BridgeState;
    fn clear_handler(&self);
    fn set_handler(&self, handler: ReadHandler);
    /// Tear down now instead of on drop (idempotent)
    fn stop(&mut self);
}

/// Allocates output streams
pub trait PlaybackDriver: Send + Sync {
    fn alloc(
        &self,
        params: &StreamParameters,
        device: Option<&str>,
        handler: WriteHandler,
    ) -> BridgeResult<Box<dyn PlaybackStream>>;
}

/// Allocates input streams
pub trait CaptureDriver: Send + Sync {
    fn alloc(
        &self,
        params: &StreamParameters,
        device: Option<&str>,
        handler: ReadHandler,
        on_error: Option<CaptureErrorHandler>,
    ) -> BridgeResult<Box<dyn CaptureStream>>;
}

/// Hardware component, session and configuration shared by a driver's bridges
#[derive(Clone)]
pub struct AudioDriver {
    component: Arc<dyn HardwareComponent>,
    coordinator: InterruptionCoordinator,
    config: BridgeConfig,
}

impl AudioDriver {
    pub fn new(component: Arc<dyn HardwareComponent>) -> Self {
        Self {
            component,
            coordinator: InterruptionCoordinator::new(),
            config: BridgeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a session coordinator with other drivers
    pub fn with_coordinator(mut self, coordinator: InterruptionCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn component(&self) -> &Arc<dyn HardwareComponent> {
        &self.component
    }

    pub fn coordinator(&self) -> &InterruptionCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Nominal rate of the default input device
    pub fn hardware_input_rate(&self) -> BridgeResult<u32> {
        Ok(self.component.default_input_sample_rate()?)
    }

    /// Nominal rate of the default output device
    pub fn hardware_output_rate(&self) -> BridgeResult<u32> {
        Ok(self.component.default_output_sample_rate()?)
    }
}

impl PlaybackDriver for AudioDriver {
    fn alloc(
        &self,
        params: &StreamParameters,
        device: Option<&str>,
        handler: WriteHandler,
    ) -> BridgeResult<Box<dyn PlaybackStream>> {
        Ok(Box::new(PlaybackBridge::new(self, params, device, handler)?))
    }
}

impl CaptureDriver for AudioDriver {
    fn alloc(
        &self,
        params: &StreamParameters,
        device: Option<&str>,
        handler: ReadHandler,
        on_error: Option<CaptureErrorHandler>,
    ) -> BridgeResult<Box<dyn CaptureStream>> {
        Ok(Box::new(CaptureBridge::new(
            self, params, device, handler, on_error,
        )?))
    }
}

impl PlaybackStream for PlaybackBridge {
    fn params(&self) -> &StreamParameters {
        PlaybackBridge::params(self)
    }

    fn hardware_rate(&self) -> u32 {
        PlaybackBridge::hardware_rate(self)
    }

    fn state(&self) -> BridgeState {
        PlaybackBridge::state(self)
    }

    fn clear_handler(&self) {
        PlaybackBridge::clear_handler(self)
    }

    fn set_handler(&self, handler: WriteHandler) {
        PlaybackBridge::set_handler(self, handler)
    }

    fn stop(&mut self) {
        PlaybackBridge::stop(self)
    }
}

impl CaptureStream for CaptureBridge {
    fn params(&self) -> &StreamParameters {
        CaptureBridge::params(self)
    }

    fn hardware_rate(&self) -> u32 {
        CaptureBridge::hardware_rate(self)
    }

    fn state(&self) -> BridgeState {
        CaptureBridge::state(self)
    }

    fn clear_handler(&self) {
        CaptureBridge::clear_handler(self)
    }

    fn set_handler(&self, handler: ReadHandler) {
        CaptureBridge::set_handler(self, handler)
    }

    fn stop(&mut self) {
        CaptureBridge::stop(self)
    }
}
