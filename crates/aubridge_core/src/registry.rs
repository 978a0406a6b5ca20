//! Driver Registry
//!
//! Hosts look drivers up by name ("aubridge", "manual", ...) and allocate
//! streams through them. [`DriverRegistry::init`] is the module entry point:
//! it registers one [`AudioDriver`] for both directions; [`DriverRegistry::close`]
//! unregisters everything.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StreamParameters;
use crate::driver::{AudioDriver, CaptureDriver, CaptureStream, PlaybackDriver, PlaybackStream};
use crate::error::{BridgeError, BridgeResult};
use crate::handler::{CaptureErrorHandler, ReadHandler, WriteHandler};

/// Name the bridge driver registers under
pub const DEFAULT_DRIVER_NAME: &str = "aubridge";

/// Named playback and capture drivers
#[derive(Default)]
pub struct DriverRegistry {
    players: Vec<(String, Arc<dyn PlaybackDriver>)>,
    sources: Vec<(String, Arc<dyn CaptureDriver>)>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` for playback and capture under `name`
    pub fn init(name: &str, driver: AudioDriver) -> Self {
        info!("Using audio component '{}'", driver.component().name());

        let driver = Arc::new(driver);
        let mut registry = Self::new();
        registry.register_player(name, Arc::clone(&driver) as Arc<dyn PlaybackDriver>);
        registry.register_source(name, driver as Arc<dyn CaptureDriver>);
        registry
    }

    pub fn register_player(&mut self, name: &str, driver: Arc<dyn PlaybackDriver>) {
        if let Some(slot) = self.players.iter_mut().find(|(n, _)| n == name) {
            warn!("Replacing playback driver '{}'", name);
            slot.1 = driver;
        } else {
            self.players.push((name.to_string(), driver));
        }
    }

    pub fn register_source(&mut self, name: &str, driver: Arc<dyn CaptureDriver>) {
        if let Some(slot) = self.sources.iter_mut().find(|(n, _)| n == name) {
            warn!("Replacing capture driver '{}'", name);
            slot.1 = driver;
        } else {
            self.sources.push((name.to_string(), driver));
        }
    }

    pub fn find_player(&self, name: &str) -> BridgeResult<Arc<dyn PlaybackDriver>> {
        self.players
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| Arc::clone(d))
            .ok_or_else(|| BridgeError::DriverNotFound(name.to_string()))
    }

    pub fn find_source(&self, name: &str) -> BridgeResult<Arc<dyn CaptureDriver>> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| Arc::clone(d))
            .ok_or_else(|| BridgeError::DriverNotFound(name.to_string()))
    }

    pub fn alloc_player(
        &self,
        name: &str,
        params: &StreamParameters,
        device: Option<&str>,
        handler: WriteHandler,
    ) -> BridgeResult<Box<dyn PlaybackStream>> {
        self.find_player(name)?.alloc(params, device, handler)
    }

    pub fn alloc_source(
        &self,
        name: &str,
        params: &StreamParameters,
        device: Option<&str>,
        handler: ReadHandler,
        on_error: Option<CaptureErrorHandler>,
    ) -> BridgeResult<Box<dyn CaptureStream>> {
        self.find_source(name)?
            .alloc(params, device, handler, on_error)
    }

    pub fn player_names(&self) -> Vec<&str> {
        self.players.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Unregister every driver; streams already allocated keep running
    pub fn close(&mut self) {
        self.players.clear();
        self.sources.clear();
    }
}
