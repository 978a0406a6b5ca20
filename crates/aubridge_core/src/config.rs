//! Stream Parameters and Bridge Configuration
//!
//! # Storage Locations
//! [`BridgeConfig::load`] reads `bridge.json` from the platform config dir:
//! - Linux: `~/.config/aubridge/bridge.json`
//! - Windows: `%APPDATA%\aubridge\bridge.json`
//! - macOS: `~/Library/Application Support/aubridge/bridge.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use aubridge_dsp::{ConverterConfig, SampleFormat, StreamFormat};

use crate::error::{BridgeError, BridgeResult};

/// Application-side stream parameters, fixed for the stream's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParameters {
    /// Sample rate in Hz (e.g., 8000, 16000, 48000)
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    pub format: SampleFormat,

    /// Packet time in milliseconds; one period is this long
    pub ptime_ms: u32,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::S16,
            ptime_ms: 20,
        }
    }
}

impl StreamParameters {
    pub fn new(sample_rate: u32, channels: u16, format: SampleFormat, ptime_ms: u32) -> Self {
        Self {
            sample_rate,
            channels,
            format,
            ptime_ms,
        }
    }

    /// Size of one sample in bytes
    pub fn sample_size(&self) -> usize {
        self.format.sample_size()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.sample_size() * self.channels as usize
    }

    /// Frames in one period (48000 Hz, 20 ms → 960)
    pub fn period_frames(&self) -> usize {
        self.period_frames_at(self.sample_rate)
    }

    /// Frames in one period of this packet time at another rate
    pub fn period_frames_at(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.ptime_ms as u64 / 1000) as usize
    }

    /// Interleaved samples in one period (frames × channels)
    pub fn period_samples(&self) -> usize {
        self.period_frames() * self.channels as usize
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.channels as usize, self.format)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.ptime_ms == 0 || self.ptime_ms > 1000 {
            return Err(format!("Invalid packet time: {} ms", self.ptime_ms));
        }
        Ok(())
    }
}

/// How the playback bridge picks the hardware-side sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackRate {
    /// Ask the output unit for its nominal rate
    Queried,
    /// Always convert to this rate (e.g., 44100)
    Fixed(u32),
}

/// Bridge-wide tuning shared by every stream a driver allocates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub converter: ConverterConfig,

    #[serde(default = "default_playback_rate")]
    pub playback_rate: PlaybackRate,

    /// Scratch capacity in hardware periods (absorbs oversized callbacks)
    #[serde(default = "default_period_headroom")]
    pub period_headroom: usize,
}

fn default_playback_rate() -> PlaybackRate {
    PlaybackRate::Queried
}

fn default_period_headroom() -> usize {
    4
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            converter: ConverterConfig::default(),
            playback_rate: default_playback_rate(),
            period_headroom: default_period_headroom(),
        }
    }
}

impl BridgeConfig {
    /// Shorter sinc filter and less scratch headroom
    pub fn low_latency() -> Self {
        Self {
            converter: ConverterConfig::low_latency(),
            playback_rate: PlaybackRate::Queried,
            period_headroom: 2,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.period_headroom == 0 || self.period_headroom > 16 {
            return Err(format!("Invalid period headroom: {}", self.period_headroom));
        }
        if let PlaybackRate::Fixed(rate) = self.playback_rate {
            if !(8000..=192000).contains(&rate) {
                return Err(format!("Invalid fixed playback rate: {}", rate));
            }
        }
        if self.converter.sinc_len == 0 || self.converter.oversampling_factor == 0 {
            return Err("Converter sinc length and oversampling must be positive".into());
        }
        if self.converter.max_ratio_relative < 1.0 {
            return Err(format!(
                "Converter max ratio must be >= 1.0, got {}",
                self.converter.max_ratio_relative
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate().map_err(BridgeError::Config)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Load from the platform config dir, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        info!("Bridge config loaded from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        error!("Failed to load bridge config: {}", e);
                    }
                }
            }
        }

        info!("Using default bridge config");
        Self::default()
    }

    /// Platform-specific configuration file path
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "aubridge", "aubridge")
            .map(|proj| proj.config_dir().join("bridge.json"))
    }
}
