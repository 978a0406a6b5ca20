//! Audio Device Lookup
//!
//! cpal does not expose stable device IDs, so devices are addressed by name.
//! Lookups accept any case-insensitive substring of the device name; `None`
//! or an empty string selects the host default.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use aubridge_dsp::SampleFormat;

use crate::error::PlatformError;
use crate::traits::{Direction, HardwareFormat};

/// Description of one audio device as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,

    /// Common rates inside at least one supported range (may be empty if
    /// querying failed)
    pub sample_rates: Vec<u32>,

    pub max_channels: u16,
}

/// Enumerate the host's devices for `direction`
pub fn enumerate(direction: Direction) -> Result<Vec<DeviceInfo>, PlatformError> {
    let host = cpal::default_host();
    let default_name = default_device(&host, direction).and_then(|d| d.name().ok());

    let devices = match direction {
        Direction::Output => host.output_devices(),
        Direction::Input => host.input_devices(),
    }
    .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;

    let mut infos = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else { continue };
        let (sample_rates, max_channels) = supported_summary(&device, direction);
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            direction,
            sample_rates,
            max_channels,
        });
    }

    Ok(infos)
}

fn default_device(host: &cpal::Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
}

/// Case-insensitive substring match; an empty pattern matches everything
pub(crate) fn name_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Resolve a device by (partial) name, or the default when `name` is empty
pub(crate) fn find_device(
    direction: Direction,
    name: Option<&str>,
) -> Result<cpal::Device, PlatformError> {
    let host = cpal::default_host();

    match name.filter(|n| !n.is_empty()) {
        None => default_device(&host, direction)
            .ok_or_else(|| PlatformError::DeviceNotFound(format!("default {}", direction.name()))),
        Some(pattern) => {
            let devices = match direction {
                Direction::Output => host.output_devices(),
                Direction::Input => host.input_devices(),
            }
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;

            let mut found = None;
            for device in devices {
                if device.name().is_ok_and(|n| name_matches(&n, pattern)) {
                    found = Some(device);
                    break;
                }
            }
            found.ok_or_else(|| PlatformError::DeviceNotFound(pattern.to_string()))
        }
    }
}

/// Nominal rate of the device's default configuration
pub(crate) fn default_sample_rate(
    device: &cpal::Device,
    direction: Direction,
) -> Result<u32, PlatformError> {
    let config = match direction {
        Direction::Output => device.default_output_config(),
        Direction::Input => device.default_input_config(),
    }
    .map_err(|e| PlatformError::QueryFailed(e.to_string()))?;

    Ok(config.sample_rate().0)
}

pub(crate) fn to_cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::S16 => cpal::SampleFormat::I16,
        SampleFormat::F32 => cpal::SampleFormat::F32,
    }
}

/// Whether any supported range covers `format` exactly
pub(crate) fn supports_format(
    device: &cpal::Device,
    direction: Direction,
    format: &HardwareFormat,
) -> Result<bool, PlatformError> {
    let wanted = to_cpal_format(format.sample_format);
    let check = |range: cpal::SupportedStreamConfigRange| {
        range.channels() == format.channels
            && range.sample_format() == wanted
            && range.min_sample_rate().0 <= format.sample_rate
            && format.sample_rate <= range.max_sample_rate().0
    };

    let supported = match direction {
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?
            .any(check),
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| PlatformError::QueryFailed(e.to_string()))?
            .any(check),
    };

    Ok(supported)
}

fn supported_summary(device: &cpal::Device, direction: Direction) -> (Vec<u32>, u16) {
    match direction {
        Direction::Output => match device.supported_output_configs() {
            Ok(configs) => extract_config_info(configs),
            Err(_) => (vec![], 2),
        },
        Direction::Input => match device.supported_input_configs() {
            Ok(configs) => extract_config_info(configs),
            Err(_) => (vec![], 2),
        },
    }
}

fn extract_config_info(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
) -> (Vec<u32>, u16) {
    const COMMON_RATES: [u32; 7] = [8000, 16000, 22050, 44100, 48000, 96000, 192000];

    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;

    for config in configs {
        max_channels = max_channels.max(config.channels());

        let min = config.min_sample_rate().0;
        let max = config.max_sample_rate().0;
        for &rate in &COMMON_RATES {
            if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                sample_rates.push(rate);
            }
        }
    }

    sample_rates.sort_unstable();
    (sample_rates, max_channels)
}
