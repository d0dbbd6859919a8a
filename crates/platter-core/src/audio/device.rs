//! Audio device enumeration
//!
//! Lists output devices and their capabilities across ALL available
//! audio hosts (ALSA, JACK, PulseAudio, etc.), and resolves a
//! configured [`DeviceId`] back to a concrete cpal device.
//!
//! Enumerating every host matters on Linux: a sound server typically
//! presents one device while ALSA presents each hardware card.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Sample rates probed against each device's supported ranges.
/// WAV files in the wild commonly use the lower rates as well.
const PROBE_RATES: [u32; 7] = [8000, 16000, 22050, 44100, 48000, 96000, 192000];

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    // Debug representation gives the variant name
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about an audio output device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum output channels
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // e.g. "[ALSA] hw:0,0 (2 ch, 44100/48000 Hz) [default]"
        let rates = self
            .sample_rates
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("/");
        write!(
            f,
            "[{}] {} ({} ch, {} Hz)",
            self.host, self.name, self.max_channels, rates
        )?;
        if self.is_default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

/// Probe one device's capabilities; None if it cannot be queried
fn probe_device(device: &cpal::Device, host: &str, default_name: &Option<String>) -> Option<AudioDevice> {
    let name = device.name().ok()?;
    let configs: Vec<_> = device.supported_output_configs().ok()?.collect();
    if configs.is_empty() {
        return None;
    }

    let mut sample_rates: Vec<u32> = Vec::new();
    let mut max_channels: u16 = 0;
    for config in &configs {
        max_channels = max_channels.max(config.channels());
        for rate in PROBE_RATES {
            if rate >= config.min_sample_rate().0
                && rate <= config.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
    }
    sample_rates.sort();

    Some(AudioDevice {
        id: DeviceId::with_host(&name, host),
        is_default: default_name.as_ref() == Some(&name),
        name,
        host: host.to_string(),
        sample_rates,
        max_channels,
    })
}

/// Get all available audio output devices from ALL hosts.
///
/// Hosts or devices that fail to initialize are skipped, not fatal;
/// an empty result is [`AudioError::NoDevices`].
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_label = host_name(host_id);
        let default_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        all_devices.extend(
            devices_iter.filter_map(|device| probe_device(&device, &host_label, &default_name)),
        );
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    // Default devices first, then by host, then by name
    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} audio devices from {} hosts",
        all_devices.len(),
        cpal::available_hosts().len()
    );

    Ok(all_devices)
}

/// Find a device by its ID.
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts by name.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(ref host_name) = id.host {
        if let Some(host) = get_host_by_name(host_name) {
            return host
                .output_devices()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?
                .find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
        }
    }

    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(mut devices) = host.output_devices() {
                if let Some(device) =
                    devices.find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                {
                    return Ok(device);
                }
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Get the default output device from the platform's default host
pub fn get_cpal_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}
